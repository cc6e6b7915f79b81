//! Outbound transactional mail
//!
//! Bodies are plain text built with `format!`; there is no template engine.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, from: &str) -> Result<Self, MailError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(email.to.parse()?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)?;

        self.transport.send(message).await?;
        Ok(())
    }
}

/// Used when SMTP isn't configured: the mail is logged instead of sent
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "SMTP disabled, mail not sent");
        tracing::debug!(body = %email.body);
        Ok(())
    }
}

pub fn verification_email(to: &str, frontend_url: &str, token: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Verify your email".to_string(),
        body: format!(
            "Welcome to Wall of Love!\n\nConfirm your address by opening:\n{frontend_url}/verify-email?token={token}\n\nThe link expires in 48 hours."
        ),
    }
}

pub fn password_reset_email(to: &str, frontend_url: &str, token: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Reset your password".to_string(),
        body: format!(
            "Someone asked to reset the password for this account.\n\nChoose a new one here:\n{frontend_url}/reset-password?token={token}\n\nThe link expires in 60 minutes. If this wasn't you, ignore this mail."
        ),
    }
}

pub fn invitation_email(
    to: &str,
    frontend_url: &str,
    inviter: &str,
    wall_title: &str,
    role: &str,
    token: &str,
) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("{inviter} invited you to \"{wall_title}\""),
        body: format!(
            "{inviter} invited you to collaborate on the wall \"{wall_title}\" as {role}.\n\nAccept the invitation:\n{frontend_url}/invitations/accept?token={token}\n\nThe invitation expires in 7 days."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_carry_token() {
        let mail = verification_email("a@example.com", "https://app.example", "tok");
        assert_eq!(mail.to, "a@example.com");
        assert!(mail.body.contains("https://app.example/verify-email?token=tok"));

        let mail = invitation_email("b@example.com", "https://app.example", "Ann", "Fans", "editor", "inv");
        assert!(mail.subject.contains("Fans"));
        assert!(mail.body.contains("/invitations/accept?token=inv"));
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        let mail = password_reset_email("a@example.com", "http://localhost", "t");
        assert!(LogMailer.send(mail).await.is_ok());
    }
}
