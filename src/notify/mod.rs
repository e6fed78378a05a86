//! Remote recording endpoint and operator mail
//!
//! Both collaborators are async and only ever called from tasks spawned by
//! [`NotificationPool`]; the capture loop never awaits them.

mod http;
mod mail;
mod pool;

pub use http::HttpNotifier;
pub use mail::{build_message, SmtpMailer};
pub use pool::NotificationPool;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::config::MailConfig;
use crate::errors::{Result, SentryError};

/// Remote recorder control
#[async_trait]
pub trait RecordingNotifier: Send + Sync {
    /// Ask the remote side to start recording; returns the session locator.
    async fn notify_start(&self) -> Result<String>;

    /// Ask the remote side to stop recording; returns its acknowledgement.
    async fn notify_stop(&self) -> Result<String>;
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<()>;
}

/// File attached to a mail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    /// Name shown to the recipient
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mail {
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub sent_at: DateTime<Local>,
    pub body: String,
    pub attachment: Option<MailAttachment>,
}

impl Mail {
    /// Operator alert built from the mail settings
    pub fn alert(
        config: &MailConfig,
        body: String,
        still: Option<PathBuf>,
        sent_at: DateTime<Local>,
    ) -> Self {
        Self {
            subject: config.subject.clone(),
            from: config.from.clone(),
            to: config.to.clone(),
            cc: config.cc.clone(),
            sent_at,
            body,
            attachment: still.map(|path| MailAttachment {
                name: config.attachment_name.clone(),
                path,
            }),
        }
    }
}

/// Playback URL for a session locator.
///
/// The first `prefix_len` characters of the raw locator are a fixed prefix
/// and are dropped; trailing whitespace such as the body's newline is ignored.
pub fn playback_url(history_prefix: &str, locator: &str, prefix_len: usize) -> Result<String> {
    let locator = locator.trim_end();
    if locator.chars().count() < prefix_len {
        return Err(SentryError::Notification(format!(
            "Session locator {:?} shorter than its {}-character prefix",
            locator, prefix_len
        )));
    }
    let session: String = locator.chars().skip(prefix_len).collect();
    Ok(format!("{}{}", history_prefix, session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_url_strips_prefix() {
        let url = playback_url(
            "http://cam.local/history",
            "rtmp://live/2026-10-18-0830\n",
            11,
        )
        .unwrap();
        assert_eq!(url, "http://cam.local/history/2026-10-18-0830");
    }

    #[test]
    fn test_leading_whitespace_counts_toward_prefix() {
        // Prefix is positional on the raw body, so a leading space shifts it
        let url = playback_url("h", " rtmp://live/cam-7.flv", 11).unwrap();
        assert_eq!(url, "he/cam-7.flv");
    }

    #[test]
    fn test_playback_url_exact_prefix_is_empty_session() {
        assert_eq!(playback_url("p/", "abc", 3).unwrap(), "p/");
    }

    #[test]
    fn test_short_locator_rejected() {
        let err = playback_url("p/", "short", 11).unwrap_err();
        assert!(matches!(err, SentryError::Notification(_)));
    }

    #[test]
    fn test_alert_carries_still() {
        let config = MailConfig {
            to: vec!["ops@example.com".to_string()],
            ..MailConfig::default()
        };
        let mail = Mail::alert(&config, "url".into(), Some("/tmp/s.jpg".into()), Local::now());
        assert_eq!(mail.subject, "Face detected");
        assert_eq!(mail.to, vec!["ops@example.com".to_string()]);
        let attachment = mail.attachment.unwrap();
        assert_eq!(attachment.path, PathBuf::from("/tmp/s.jpg"));
        assert_eq!(attachment.name, config.attachment_name);
    }
}
