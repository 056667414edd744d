// src/notify/email.rs

//! SMTP digest notifier.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::{Digest, Notifier};
use crate::error::{AppError, Result};
use crate::models::{Article, MailConfig};

/// Asia/Seoul has no DST.
const KST_OFFSET_HOURS: i64 = 9;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    /// Build the transport from `mail` settings.
    ///
    /// Port 587 upgrades with STARTTLS, 465 connects over TLS, anything else
    /// is plain SMTP.
    pub fn new(mail: &MailConfig) -> Result<Self> {
        let host = mail
            .smtp_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AppError::config("mail.smtp_host is not set"))?;
        let from = mail
            .from
            .as_deref()
            .ok_or_else(|| AppError::config("mail.from is not set"))?;
        let from: Mailbox = from
            .parse()
            .map_err(|e| AppError::config(format!("invalid sender {from:?}: {e}")))?;

        let builder = match mail.smtp_port {
            587 => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(AppError::notification)?,
            465 => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(AppError::notification)?,
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        }
        .port(mail.smtp_port)
        .timeout(Some(Duration::from_secs(mail.timeout_secs)));

        let builder = match (&mail.smtp_user, &mail.smtp_pass) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.clone(), pass.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    fn message(&self, digest: &Digest) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(
                &digest.subject_prefix,
                digest.articles.len(),
                kst_now(),
            ));
        for recipient in &digest.recipients {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|e| AppError::notification(format!("invalid recipient {recipient:?}: {e}")))?;
            builder = builder.to(mailbox);
        }

        builder
            .header(ContentType::TEXT_HTML)
            .body(render_html(&digest.subject_prefix, &digest.articles))
            .map_err(AppError::notification)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, digest: &Digest) -> Result<()> {
        if digest.recipients.is_empty() {
            log::warn!(
                "{} No recipients configured, digest of {} article(s) not sent",
                digest.subject_prefix,
                digest.articles.len()
            );
            return Ok(());
        }

        let message = self.message(digest)?;
        self.mailer
            .send(message)
            .await
            .map_err(AppError::notification)?;

        log::info!(
            "{} Sent {} article(s) to {} recipient(s)",
            digest.subject_prefix,
            digest.articles.len(),
            digest.recipients.len()
        );
        Ok(())
    }
}

fn kst_now() -> NaiveDateTime {
    Utc::now().naive_utc() + chrono::Duration::hours(KST_OFFSET_HOURS)
}

/// Mail subject, e.g. `[학사공지 알림] 2024-03-05 09:30 기준 신규 2건`.
pub fn subject(prefix: &str, count: usize, at: NaiveDateTime) -> String {
    format!("{prefix} {} 기준 신규 {count}건", at.format("%Y-%m-%d %H:%M"))
}

/// HTML digest body.
pub fn render_html(prefix: &str, articles: &[Article]) -> String {
    let rows: String = articles.iter().map(render_row).collect();

    format!(
        r#"<div style="font-family:system-ui,Segoe UI,Apple SD Gothic Neo,sans-serif;">
  <h2 style="margin:0 0 12px 0;">{prefix} 신규 {count}건</h2>
  <table width="100%" cellpadding="0" cellspacing="0" style="border-collapse:collapse;">
{rows}  </table>
  <div style="color:#999;font-size:11px;margin-top:12px;">
    본 메일은 자동 발송되었습니다. (Asia/Seoul)
  </div>
</div>
"#,
        prefix = html_escape::encode_text(prefix),
        count = articles.len(),
    )
}

fn render_row(article: &Article) -> String {
    let href = html_escape::encode_double_quoted_attribute(&article.href);
    format!(
        r#"    <tr>
      <td style="padding:8px 12px;border-bottom:1px solid #eee;">
        <div style="font-weight:600; font-size:14px; margin-bottom:4px;">
          <a href="{href}" target="_blank" style="color:#1a73e8;text-decoration:none;">{title}</a>
        </div>
        <div style="font-size:12px;color:#555;">{date}</div>
      </td>
      <td style="padding:8px 12px;border-bottom:1px solid #eee; text-align:right;">
        <a href="{href}" target="_blank" style="display:inline-block;padding:6px 10px;border:1px solid #1a73e8;border-radius:6px;text-decoration:none;">바로가기</a>
      </td>
    </tr>
"#,
        title = html_escape::encode_text(&article.title),
        date = html_escape::encode_text(&article.date),
    )
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn article(id: &str, title: &str, date: &str) -> Article {
        Article {
            article_id: id.to_string(),
            title: title.to_string(),
            href: format!("https://csai.jbnu.ac.kr/bbs/csai/4929/{id}/artclView.do?a=1&b=2"),
            date: date.to_string(),
        }
    }

    fn mail_config() -> MailConfig {
        MailConfig {
            smtp_host: Some("localhost".to_string()),
            smtp_port: 2525,
            from: Some("bot@example.com".to_string()),
            ..MailConfig::default()
        }
    }

    #[test]
    fn test_subject_format() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(9, 7, 30)
            .unwrap();

        assert_eq!(
            subject("[학사공지 알림]", 2, at),
            "[학사공지 알림] 2024-03-05 09:07 기준 신규 2건"
        );
    }

    #[test]
    fn test_render_escapes_title_and_date() {
        let html = render_html(
            "[학사공지 알림]",
            &[article("7", "<b>수강</b> & 변경", "2024.03.05")],
        );

        assert!(html.contains("[학사공지 알림] 신규 1건"));
        assert!(html.contains("&lt;b&gt;수강&lt;/b&gt; &amp; 변경"));
        assert!(html.contains("2024.03.05"));
        assert!(html.contains("artclView.do?a=1&amp;b=2"));
        assert!(html.contains("바로가기"));
        assert!(html.contains("본 메일은 자동 발송되었습니다. (Asia/Seoul)"));
    }

    #[test]
    fn test_render_keeps_article_order() {
        let html = render_html(
            "[p]",
            &[article("200", "second", ""), article("102", "first", "")],
        );

        let second = html.find("second").unwrap();
        let first = html.find("first").unwrap();
        assert!(second < first);
        assert_eq!(html.matches("<tr>").count(), 2);
    }

    #[test]
    fn test_new_requires_host_and_sender() {
        let mut config = mail_config();
        config.smtp_host = None;
        assert!(EmailNotifier::new(&config).is_err());

        let mut config = mail_config();
        config.from = Some("not an address".to_string());
        assert!(EmailNotifier::new(&config).is_err());

        assert!(EmailNotifier::new(&mail_config()).is_ok());
    }

    #[test]
    fn test_message_rejects_bad_recipient() {
        let notifier = EmailNotifier::new(&mail_config()).unwrap();
        let digest = Digest {
            subject_prefix: "[p]".to_string(),
            recipients: vec!["nobody".to_string()],
            articles: vec![article("1", "t", "")],
        };

        assert!(matches!(
            notifier.message(&digest),
            Err(AppError::Notification(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_recipients_is_success() {
        let notifier = EmailNotifier::new(&mail_config()).unwrap();
        let digest = Digest {
            subject_prefix: "[p]".to_string(),
            recipients: Vec::new(),
            articles: vec![article("1", "t", "")],
        };

        assert!(notifier.notify(&digest).await.is_ok());
    }
}
