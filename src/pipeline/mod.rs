//! Pipeline entry points for notice polling.
//!
//! - `run_source`: Fetch, diff, notify and record one source
//! - `run_all`: Run every configured source in order

pub mod detect;
pub mod run;
#[cfg(test)]
pub(crate) mod testing;

pub use detect::{SourceOutcome, order_newest_first, run_source};
pub use run::{ensure_sources, run_all};
