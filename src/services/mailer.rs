//! Outbound mail transports.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MailConfig;

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Delivers a single message. Implementations must not retry on their own.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// SMTP delivery over STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let from = parse_mailbox(&format!("{} <{}>", config.from_name, config.from_address))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)));

        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let to = parse_mailbox(&mail.to)?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                mail.body_text.clone(),
                mail.body_html.clone(),
            ))
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        debug!(to = %mail.to, subject = %mail.subject, "Mail delivered");
        Ok(())
    }
}

/// Development transport: writes the message to the log instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        parse_mailbox(&mail.to)?;
        info!(
            to = %mail.to,
            subject = %mail.subject,
            "Mail delivery disabled, message follows:\n{}",
            mail.body_text
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Picks the transport matching the configuration.
pub fn from_config(config: &MailConfig) -> Result<std::sync::Arc<dyn MailSender>, MailError> {
    if config.enabled {
        info!(host = %config.smtp_host, port = config.smtp_port, "SMTP mail delivery enabled");
        Ok(std::sync::Arc::new(SmtpMailer::new(config)?))
    } else {
        info!("Mail delivery disabled, messages will be logged");
        Ok(std::sync::Arc::new(LogMailer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail_to(to: &str) -> OutgoingMail {
        OutgoingMail {
            to: to.to_string(),
            subject: "Hello".to_string(),
            body_html: "<p>Hi</p>".to_string(),
            body_text: "Hi".to_string(),
        }
    }

    #[tokio::test]
    async fn log_mailer_accepts_valid_address() {
        assert!(LogMailer.send(&mail_to("a@b.com")).await.is_ok());
    }

    #[tokio::test]
    async fn log_mailer_rejects_invalid_address() {
        let err = LogMailer.send(&mail_to("not an address")).await.unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn smtp_mailer_builds_from_config() {
        let config = MailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".to_string(),
            smtp_username: "mailer".to_string(),
            smtp_password: "secret".to_string(),
            ..MailConfig::default()
        };
        assert!(SmtpMailer::new(&config).is_ok());
    }

    #[tokio::test]
    async fn smtp_mailer_rejects_bad_from_address() {
        let config = MailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".to_string(),
            from_address: "nope".to_string(),
            ..MailConfig::default()
        };
        assert!(matches!(
            SmtpMailer::new(&config),
            Err(MailError::InvalidAddress { .. })
        ));
    }
}
