//! SMTP mail via lettre

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Mail, MailSender};
use crate::config::MailConfig;
use crate::errors::{Result, SentryError};

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| SentryError::Notification(format!("Invalid address {:?}: {}", address, e)))
}

/// Assemble the MIME message; `attachment` is the already-read still image.
pub fn build_message(mail: &Mail, attachment: Option<Vec<u8>>) -> Result<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&mail.from)?)
        .subject(mail.subject.clone())
        .date(SystemTime::from(mail.sent_at));
    for to in &mail.to {
        builder = builder.to(mailbox(to)?);
    }
    for cc in &mail.cc {
        builder = builder.cc(mailbox(cc)?);
    }

    let mut body = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
    if let (Some(bytes), Some(meta)) = (attachment, mail.attachment.as_ref()) {
        let content_type = ContentType::parse("image/jpeg")
            .map_err(|e| SentryError::Notification(format!("Bad content type: {}", e)))?;
        body = body.singlepart(Attachment::new(meta.name.clone()).body(bytes, content_type));
    }

    builder
        .multipart(body)
        .map_err(|e| SentryError::Notification(format!("Failed to build mail: {}", e)))
}

/// Implicit-TLS SMTP relay with login credentials
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| {
                SentryError::Configuration(format!(
                    "Invalid SMTP relay {}: {}",
                    config.smtp_host, e
                ))
            })?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        Ok(Self { transport })
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, mail: Mail) -> Result<()> {
        let attachment = match &mail.attachment {
            Some(meta) => match tokio::fs::read(&meta.path).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    log::warn!(
                        "Still {} unreadable, mailing without it: {}",
                        meta.path.display(),
                        e
                    );
                    None
                }
            },
            None => None,
        };

        let message = build_message(&mail, attachment)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| SentryError::Notification(format!("SMTP delivery failed: {}", e)))?;
        log::info!("Mail {:?} sent to {}", mail.subject, mail.to.join(", "));
        Ok(())
    }
}
