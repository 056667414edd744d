//! Service layer for the notice mailer.
//!
//! This module contains the listing-page logic for:
//! - Page URL planning (`PaginationPlanner`)
//! - Article extraction (`ArticleExtractor`)

mod articles;
mod pagination;

pub use articles::{ArticleExtractor, ArticleSet, Extraction};
pub use pagination::{PageParam, PaginationPlanner};
