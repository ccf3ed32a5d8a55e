//! Collaborator traits consumed by the outreach engine.
//!
//! The engine only ever talks to these interfaces; concrete implementations
//! live in jobclaw-mailer and jobclaw-composer. Tests substitute mocks.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    ComposeRequest, ContactStatus, EmailDraft, MailAccount, OutgoingEmail, ReferenceDates,
    SendReceipt, ThreadMessage,
};

/// Outbound transport + thread reader for one user's mailbox.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one message. Errors are classified transient/permanent via
    /// `JobClawError::Transport`; the caller decides whether to retry.
    async fn send(&self, account: &MailAccount, email: &OutgoingEmail) -> Result<SendReceipt>;

    /// Fetch the messages of exactly one conversation thread, oldest first.
    /// Never scans a general inbox.
    async fn list_thread_messages(
        &self,
        account: &MailAccount,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>>;
}

/// Email content generation. A failure here is fatal for the attempt —
/// the engine never substitutes a generic fallback message.
#[async_trait]
pub trait Composer: Send + Sync {
    async fn generate(&self, request: &ComposeRequest) -> Result<EmailDraft>;
}

/// Best-effort notification of contact status changes to an external
/// system. Callers log and swallow errors; this hook can never roll back
/// a committed transition.
#[async_trait]
pub trait StatusSync: Send + Sync {
    async fn notify(
        &self,
        user_id: &str,
        contact_id: &str,
        status: ContactStatus,
        reference_dates: &ReferenceDates,
    ) -> Result<()>;
}
