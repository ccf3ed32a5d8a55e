//! SMTP mailer — async lettre transport with conversation threading.
//!
//! Message-IDs are generated locally so the engine can record them before
//! the provider ever echoes anything back; follow-ups carry In-Reply-To and
//! References headers pointing at the thread root.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as LettreAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};

use jobclaw_core::error::{JobClawError, Result};
use jobclaw_core::traits::Mailer;
use jobclaw_core::types::{MailAccount, OutgoingEmail, SendReceipt, ThreadMessage};

use crate::threads;

/// SMTP + IMAP mailer for a user-connected mailbox.
pub struct SmtpMailer;

impl SmtpMailer {
    pub fn new() -> Self {
        Self
    }

    fn generate_message_id(account: &MailAccount) -> String {
        let domain = account
            .email
            .split('@')
            .nth(1)
            .unwrap_or("jobclaw.local");
        format!("<{}@{}>", uuid::Uuid::new_v4(), domain)
    }
}

impl Default for SmtpMailer {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify an SMTP failure for the retry wrapper. 4xx responses (rate
/// limits, mailbox busy) and connection-level failures (reset, timeout,
/// DNS) are transient; permanent rejections and local client errors are
/// not.
fn classify_smtp_error(e: lettre::transport::smtp::Error) -> JobClawError {
    let transient =
        e.is_transient() || e.is_timeout() || (!e.is_permanent() && !e.is_client() && !e.is_tls());
    JobClawError::Transport {
        message: format!("SMTP send: {e}"),
        transient,
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, account: &MailAccount, email: &OutgoingEmail) -> Result<SendReceipt> {
        let from_name = account.display_name.as_deref().unwrap_or(&account.email);
        let from_mailbox: Mailbox = format!("{from_name} <{}>", account.email)
            .parse()
            .map_err(|e| JobClawError::transport_permanent(format!("Invalid from: {e}")))?;
        let to_mailbox: Mailbox = email
            .to
            .parse()
            .map_err(|e| JobClawError::transport_permanent(format!("Invalid to: {e}")))?;

        let message_id = Self::generate_message_id(account);

        let mut builder = LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(&email.subject)
            .message_id(Some(message_id.clone()));

        if let Some(reply_id) = &email.in_reply_to {
            builder = builder.in_reply_to(reply_id.clone());
        }
        if let Some(thread_id) = &email.thread_id {
            builder = builder.references(thread_id.clone());
        }

        let message = if email.attachments.is_empty() {
            builder
                .header(ContentType::TEXT_PLAIN)
                .body(email.body.clone())
                .map_err(|e| JobClawError::transport_permanent(format!("Build email: {e}")))?
        } else {
            let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(email.body.clone()));
            for att in &email.attachments {
                let content_type = ContentType::parse(&att.content_type)
                    .or_else(|_| ContentType::parse("application/octet-stream"))
                    .unwrap_or(ContentType::TEXT_PLAIN);
                multipart = multipart.singlepart(
                    LettreAttachment::new(att.filename.clone())
                        .body(att.bytes.clone(), content_type),
                );
            }
            builder
                .multipart(multipart)
                .map_err(|e| JobClawError::transport_permanent(format!("Build email: {e}")))?
        };

        let creds = Credentials::new(account.email.clone(), account.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&account.smtp_host)
            .map_err(|e| JobClawError::transport_permanent(format!("SMTP relay: {e}")))?
            .port(account.smtp_port)
            .credentials(creds)
            .build();

        transport.send(message).await.map_err(classify_smtp_error)?;

        tracing::info!("📤 Email sent to {} ({})", email.to, message_id);

        // An initial send roots a new conversation under its own id.
        let thread_id = email
            .thread_id
            .clone()
            .unwrap_or_else(|| message_id.clone());
        Ok(SendReceipt {
            message_id,
            thread_id,
        })
    }

    async fn list_thread_messages(
        &self,
        account: &MailAccount,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>> {
        threads::fetch_thread(account, thread_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> MailAccount {
        MailAccount {
            user_id: "u1".into(),
            email: "me@example.com".into(),
            display_name: Some("Me".into()),
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            imap_host: "imap.example.com".into(),
            imap_port: 993,
            password: "secret".into(),
            mailbox: "INBOX".into(),
        }
    }

    #[test]
    fn test_message_id_uses_sender_domain() {
        let id = SmtpMailer::generate_message_id(&account());
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.com>"));
    }
}
