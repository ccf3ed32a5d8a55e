//! Reply detector — scans known conversation threads for genuine inbound
//! replies, on its own cadence, independent of the send cycle.
//!
//! Only the thread's own messages are fetched, never a general inbox, so
//! unrelated correspondence can never be mistaken for a campaign reply.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use jobclaw_core::error::Result;
use jobclaw_core::types::{ContactStatus, ThreadMessage, User};
use jobclaw_store::OutreachThread;

use crate::gate;
use crate::orchestrator::EngineContext;

/// Drives one reply-check cycle across all users with automation running.
pub struct ReplyDetector {
    ctx: Arc<EngineContext>,
}

impl ReplyDetector {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Run one reply-check cycle. Failures are isolated per user and per
    /// thread.
    pub async fn run_cycle(&self, stop: &AtomicBool) {
        let users = match self.ctx.db.list_running_users() {
            Ok(users) => users,
            Err(e) => {
                tracing::error!("Reply cycle could not list users: {e}");
                return;
            }
        };

        tracing::debug!("📥 Reply cycle: checking {} user(s)", users.len());
        for user in users {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.process_user(&user, stop).await {
                tracing::warn!("⚠️ Reply check failed for user {}: {e}", user.id);
            }
        }
    }

    async fn process_user(&self, user: &User, stop: &AtomicBool) -> Result<()> {
        let db = &self.ctx.db;
        let Some(account) = db.get_mail_account(&user.id)? else {
            return Ok(());
        };

        let threads = db.open_threads(&user.id)?;
        for thread in threads {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            let messages = match self
                .ctx
                .mailer
                .list_thread_messages(&account, &thread.thread_id)
                .await
            {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!("⚠️ Could not fetch thread {}: {e}", thread.thread_id);
                    continue;
                }
            };

            if first_reply(&messages, thread.first_sent_at).is_some()
                && let Err(e) = self.confirm_reply(user, &thread).await
            {
                tracing::warn!("⚠️ Could not record reply for contact {}: {e}", thread.contact_id);
            }
        }
        Ok(())
    }

    /// Record a confirmed reply: terminal `replied` status via the claim
    /// primitive, reply counter, activity log, best-effort sync.
    async fn confirm_reply(&self, user: &User, thread: &OutreachThread) -> Result<()> {
        let db = &self.ctx.db;
        let Some(contact) = db.get_contact(&thread.contact_id)? else {
            return Ok(());
        };
        if contact.status.is_terminal() {
            // Already replied (or otherwise closed) — nothing to do.
            return Ok(());
        }
        if contact.status.is_locked() {
            // A send is in flight; the next reply cycle will see the
            // committed row.
            return Ok(());
        }
        if !db.claim_contact(&contact.id, contact.status, ContactStatus::Replied)? {
            tracing::debug!("Contact {} mutated during reply check, skipping", contact.id);
            return Ok(());
        }

        tracing::info!("💬 Reply detected from {} (thread {})", contact.email, thread.thread_id);

        let day = match db.get_settings(&user.id)? {
            Some(settings) => {
                gate::user_day_key(Utc::now(), &gate::resolve_timezone(&settings.timezone))
            }
            None => gate::user_day_key(Utc::now(), &chrono_tz::UTC),
        };
        let mut usage = db.get_usage(&user.id, &day)?;
        usage.replies_received += 1;
        db.put_usage(&usage)?;

        db.log_activity(&user.id, &format!("Reply received from {}", contact.email))?;

        let fresh = db.get_contact(&contact.id)?.unwrap_or(contact);
        if let Err(e) = self
            .ctx
            .sync
            .notify(&user.id, &fresh.id, ContactStatus::Replied, &(&fresh).into())
            .await
        {
            tracing::warn!("⚠️ Status sync failed for contact {}: {e}", fresh.id);
        }
        Ok(())
    }
}

/// The first genuine reply in a thread: messages are scanned in
/// chronological order, the account owner's own messages are skipped, and
/// the timestamp must be strictly after the thread's recorded send time —
/// mail that predates the outreach is not a reply to it.
pub(crate) fn first_reply(
    messages: &[ThreadMessage],
    sent_at: DateTime<Utc>,
) -> Option<&ThreadMessage> {
    messages
        .iter()
        .filter(|m| !m.outbound)
        .find(|m| m.timestamp > sent_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: &str, offset_hours: i64, outbound: bool, base: DateTime<Utc>) -> ThreadMessage {
        ThreadMessage {
            sender_email: sender.into(),
            timestamp: base + chrono::Duration::hours(offset_hours),
            outbound,
        }
    }

    #[test]
    fn test_reply_after_send_detected() {
        let sent_at = Utc::now();
        let messages = vec![
            msg("me@example.com", 0, true, sent_at),
            msg("jordan@acme.com", 1, false, sent_at),
        ];
        let reply = first_reply(&messages, sent_at).unwrap();
        assert_eq!(reply.sender_email, "jordan@acme.com");
    }

    #[test]
    fn test_inbound_predating_send_ignored() {
        let sent_at = Utc::now();
        let messages = vec![
            msg("jordan@acme.com", -1, false, sent_at),
            msg("me@example.com", 0, true, sent_at),
        ];
        assert!(first_reply(&messages, sent_at).is_none());
    }

    #[test]
    fn test_own_messages_never_count_as_replies() {
        let sent_at = Utc::now();
        let messages = vec![
            msg("me@example.com", 0, true, sent_at),
            msg("me@example.com", 2, true, sent_at),
        ];
        assert!(first_reply(&messages, sent_at).is_none());
    }

    #[test]
    fn test_exact_send_timestamp_is_not_strictly_after() {
        let sent_at = Utc::now();
        let messages = vec![msg("jordan@acme.com", 0, false, sent_at)];
        assert!(first_reply(&messages, sent_at).is_none());
    }

    #[test]
    fn test_earliest_qualifying_reply_wins() {
        let sent_at = Utc::now();
        let messages = vec![
            msg("jordan@acme.com", -2, false, sent_at),
            msg("me@example.com", 0, true, sent_at),
            msg("jordan@acme.com", 3, false, sent_at),
            msg("jordan@acme.com", 5, false, sent_at),
        ];
        let reply = first_reply(&messages, sent_at).unwrap();
        assert_eq!(reply.timestamp, sent_at + chrono::Duration::hours(3));
    }
}
