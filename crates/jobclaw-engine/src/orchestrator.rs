//! Send orchestrator — composes content, sends through the transport with
//! retry, and commits contact state only after the transport confirms.
//!
//! The "send, then record" ordering is deliberate: a crash between
//! transmission and commit risks one duplicate email, which is preferable
//! to marking a message as sent when it never left the transport layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;

use jobclaw_core::error::{JobClawError, Result};
use jobclaw_core::traits::{Composer, Mailer, StatusSync};
use jobclaw_core::types::{
    Attachment, CampaignSettings, ComposeRequest, Contact, ContactStatus, EmailSend, MailAccount,
    OutgoingEmail, SendReceipt, SendStatus, User,
};
use jobclaw_mailer::retry;
use jobclaw_store::OutreachDb;

use crate::{gate, state};

/// Shared handles for everything the engine touches.
pub struct EngineContext {
    pub db: Arc<OutreachDb>,
    pub mailer: Arc<dyn Mailer>,
    pub composer: Arc<dyn Composer>,
    pub sync: Arc<dyn StatusSync>,
    pub http: reqwest::Client,
    /// Pause after each successful send — a deliberate deliverability
    /// throttle, not an incidental delay.
    pub inter_send_delay: Duration,
}

/// Drives one full send cycle across all eligible users.
pub struct SendOrchestrator {
    ctx: Arc<EngineContext>,
}

impl SendOrchestrator {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Run one send cycle. User failures are isolated: one user's error
    /// never aborts another user's batch. `stop` is checked between
    /// contacts so shutdown lets in-flight work finish its current step.
    pub async fn run_cycle(&self, stop: &AtomicBool) {
        let users = match self.ctx.db.list_running_users() {
            Ok(users) => users,
            Err(e) => {
                tracing::error!("Send cycle could not list users: {e}");
                return;
            }
        };

        tracing::debug!("📬 Send cycle: {} user(s) with automation running", users.len());
        for user in users {
            if stop.load(Ordering::SeqCst) {
                tracing::info!("Send cycle stopping early (shutdown requested)");
                break;
            }
            if let Err(e) = self.process_user(&user, stop).await {
                tracing::warn!("⚠️ Send cycle failed for user {}: {e}", user.id);
            }
        }
    }

    /// Gate, then walk the user's pending contacts in priority order until
    /// quota runs out.
    async fn process_user(&self, user: &User, stop: &AtomicBool) -> Result<()> {
        let db = &self.ctx.db;
        let Some(settings) = db.get_settings(&user.id)? else {
            tracing::debug!("User {} has no campaign settings, skipping", user.id);
            return Ok(());
        };
        let account = db.get_mail_account(&user.id)?;

        let now = Utc::now();
        let tz = gate::resolve_timezone(&settings.timezone);
        let day = gate::user_day_key(now, &tz);
        let usage = db.get_usage(&user.id, &day)?;

        let remaining = match gate::evaluate(user, &settings, account.is_some(), &usage, now) {
            gate::GateDecision::Run { remaining_quota } => remaining_quota,
            gate::GateDecision::Skip(reason) => {
                tracing::debug!("Skipping user {}: {}", user.id, reason.as_str());
                return Ok(());
            }
        };
        let Some(account) = account else {
            return Ok(());
        };

        let contacts = db.contacts_pending(&user.id)?;
        let mut processed = 0u32;
        let mut followups = 0u32;

        for contact in contacts {
            if processed >= remaining || stop.load(Ordering::SeqCst) {
                break;
            }

            match state::next_action(&contact, &settings, Utc::now()) {
                state::NextAction::SendInitial => {
                    if !db.claim_contact(&contact.id, ContactStatus::NotSent, ContactStatus::Sending)? {
                        tracing::debug!("Contact {} already claimed, skipping", contact.id);
                        continue;
                    }
                    if self
                        .send_one(user, &account, &settings, &contact, 0)
                        .await
                        .is_ok()
                    {
                        processed += 1;
                        tokio::time::sleep(self.ctx.inter_send_delay).await;
                    }
                }
                state::NextAction::SendFollowup(n) => {
                    if !db.claim_contact(&contact.id, contact.status, ContactStatus::SendingFollowup)? {
                        tracing::debug!("Contact {} already claimed, skipping", contact.id);
                        continue;
                    }
                    if self
                        .send_one(user, &account, &settings, &contact, n)
                        .await
                        .is_ok()
                    {
                        processed += 1;
                        followups += 1;
                        tokio::time::sleep(self.ctx.inter_send_delay).await;
                    }
                }
                state::NextAction::Exhausted => {
                    if db.claim_contact(&contact.id, contact.status, ContactStatus::Rejected)? {
                        tracing::info!("Contact {} exhausted its sequence, marked rejected", contact.id);
                        db.log_activity(
                            &user.id,
                            &format!("Sequence complete for {} — no reply, marked rejected", contact.email),
                        )?;
                    }
                }
                state::NextAction::IntegrityFault(msg) => {
                    tracing::warn!("🚨 Integrity fault on contact {}: {msg} — skipped", contact.id);
                    db.log_activity(
                        &user.id,
                        &format!("Integrity fault on {}: {msg}", contact.email),
                    )?;
                }
                state::NextAction::Wait
                | state::NextAction::Locked
                | state::NextAction::Terminal => {}
            }
        }

        if processed > 0 {
            // Re-read fresh before writing: the reply cycle may have bumped
            // counters while this loop slept between sends.
            let mut usage = db.get_usage(&user.id, &day)?;
            usage.emails_sent += processed;
            usage.followups_sent += followups;
            db.put_usage(&usage)?;
            tracing::info!(
                "📤 User {}: sent {} message(s) this cycle ({} follow-ups)",
                user.id,
                processed,
                followups
            );
        }

        Ok(())
    }

    /// Process one claimed contact. Any error parks the contact in the
    /// terminal failed status with an EmailSend error record; the caller
    /// neither counts nor throttles failed attempts.
    async fn send_one(
        &self,
        user: &User,
        account: &MailAccount,
        settings: &CampaignSettings,
        contact: &Contact,
        followup_number: u32,
    ) -> Result<()> {
        match self
            .attempt_send(user, account, settings, contact, followup_number)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("❌ Send failed for contact {}: {e}", contact.id);
                self.record_failure(user, contact, followup_number, &e);
                Err(e)
            }
        }
    }

    async fn attempt_send(
        &self,
        user: &User,
        account: &MailAccount,
        settings: &CampaignSettings,
        contact: &Contact,
        followup_number: u32,
    ) -> Result<()> {
        let db = &self.ctx.db;

        // Content generation. Fatal on failure — a generic fallback email
        // to a named contact is worse than none.
        let request = ComposeRequest {
            user_id: user.id.clone(),
            contact_id: contact.id.clone(),
            contact_name: contact.name.clone(),
            contact_email: contact.email.clone(),
            company: contact.company.clone(),
            role: contact.role.clone(),
            is_followup: followup_number > 0,
            followup_number,
            sender_name: user.name.clone(),
            attachment_url: settings.attachment_url.clone(),
        };
        let draft = self.ctx.composer.generate(&request).await?;

        // Follow-ups stay in the original conversation thread.
        let (thread_id, in_reply_to) = if followup_number > 0 {
            match db.latest_send_for_contact(&contact.id)? {
                Some(prev) => (prev.thread_id, prev.message_id),
                None => (None, None),
            }
        } else {
            (None, None)
        };

        // Attachment fetch is best-effort: send without it on failure.
        let attachments = match &settings.attachment_url {
            Some(url) => match fetch_attachment(&self.ctx.http, url).await {
                Ok(att) => vec![att],
                Err(e) => {
                    tracing::warn!("⚠️ Attachment fetch failed ({url}): {e} — sending without it");
                    vec![]
                }
            },
            None => vec![],
        };

        let email = OutgoingEmail {
            to: contact.email.clone(),
            subject: draft.subject,
            body: draft.body,
            thread_id,
            in_reply_to,
            attachments,
        };

        let mailer = &self.ctx.mailer;
        let receipt =
            retry::with_backoff("transport send", || mailer.send(account, &email)).await?;

        self.commit(user, contact, followup_number, &receipt).await
    }

    /// Commit a transport-confirmed send. Idempotent: if the contact is
    /// already in the target status the commit is a logged no-op — no date
    /// is rewritten and no duplicate EmailSend row appears.
    async fn commit(
        &self,
        user: &User,
        contact: &Contact,
        followup_number: u32,
        receipt: &SendReceipt,
    ) -> Result<()> {
        let db = &self.ctx.db;
        let target = match followup_number {
            0 => ContactStatus::Sent,
            1 => ContactStatus::Followup1,
            _ => ContactStatus::Followup2,
        };

        let current = db
            .get_contact(&contact.id)?
            .ok_or_else(|| JobClawError::Store(format!("Contact {} vanished mid-send", contact.id)))?;
        if current.status == target {
            tracing::info!("⏭️ Skip duplicate commit for contact {} (already {})", contact.id, target.as_str());
            return Ok(());
        }

        let now = Utc::now();
        db.commit_send_transition(&contact.id, target, followup_number, &now)?;
        db.insert_email_send(&EmailSend {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            contact_id: contact.id.clone(),
            status: SendStatus::Sent,
            followup_number,
            sent_at: now,
            message_id: Some(receipt.message_id.clone()),
            thread_id: Some(receipt.thread_id.clone()),
            error_message: None,
        })?;

        let label = match followup_number {
            0 => "initial email".to_string(),
            n => format!("follow-up #{n}"),
        };
        db.log_activity(&user.id, &format!("Sent {label} to {}", contact.email))?;

        // Best-effort external sync — logged, swallowed, never rolls back
        // the commit above.
        let fresh = db.get_contact(&contact.id)?.unwrap_or(current);
        if let Err(e) = self
            .ctx
            .sync
            .notify(&user.id, &contact.id, target, &(&fresh).into())
            .await
        {
            tracing::warn!("⚠️ Status sync failed for contact {}: {e}", contact.id);
        }

        Ok(())
    }

    /// Terminal failure bookkeeping: status, error record, activity log.
    fn record_failure(
        &self,
        user: &User,
        contact: &Contact,
        followup_number: u32,
        error: &JobClawError,
    ) {
        let db = &self.ctx.db;
        if let Err(e) = db.mark_contact_failed(&contact.id) {
            tracing::error!("Could not mark contact {} failed: {e}", contact.id);
        }
        if let Err(e) = db.insert_email_send(&EmailSend {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            contact_id: contact.id.clone(),
            status: SendStatus::Failed,
            followup_number,
            sent_at: Utc::now(),
            message_id: None,
            thread_id: None,
            error_message: Some(error.to_string()),
        }) {
            tracing::error!("Could not record failed send for {}: {e}", contact.id);
        }
        if let Err(e) = db.log_activity(
            &user.id,
            &format!("Send to {} failed: {error}", contact.email),
        ) {
            tracing::error!("Could not log failure for {}: {e}", contact.id);
        }
    }
}

/// Download the configured attachment (e.g. a resume PDF).
async fn fetch_attachment(client: &reqwest::Client, url: &str) -> Result<Attachment> {
    let resp = client
        .get(url)
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .map_err(|e| JobClawError::transport_transient(format!("Attachment fetch: {e}")))?;
    if !resp.status().is_success() {
        return Err(JobClawError::transport_permanent(format!(
            "Attachment fetch: HTTP {}",
            resp.status()
        )));
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let filename = url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("resume.pdf")
        .to_string();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| JobClawError::transport_transient(format!("Attachment body: {e}")))?
        .to_vec();

    Ok(Attachment {
        filename,
        content_type,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use jobclaw_core::types::PlanTier;

    fn quiet_stop() -> AtomicBool {
        AtomicBool::new(false)
    }

    async fn run_once(ctx: &Arc<EngineContext>) {
        SendOrchestrator::new(ctx.clone())
            .run_cycle(&quiet_stop())
            .await;
    }

    #[tokio::test]
    async fn test_quota_limits_sends_per_cycle() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 3);
        testing::seed_mail_account(&db);
        for i in 0..5 {
            testing::seed_contact(&db, &format!("c{i}"), ContactStatus::NotSent, None);
        }

        let (ctx, mailer, _, _) = testing::test_context(db.clone());
        run_once(&ctx).await;

        assert_eq!(mailer.sent_count(), 3);
        let statuses: Vec<ContactStatus> = (0..5)
            .map(|i| db.get_contact(&format!("c{i}")).unwrap().unwrap().status)
            .collect();
        assert_eq!(
            statuses.iter().filter(|s| **s == ContactStatus::Sent).count(),
            3
        );
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == ContactStatus::NotSent)
                .count(),
            2
        );

        let tz = gate::resolve_timezone("UTC");
        let day = gate::user_day_key(Utc::now(), &tz);
        let usage = db.get_usage("u1", &day).unwrap();
        assert_eq!(usage.emails_sent, 3);
        assert_eq!(usage.followups_sent, 0);
    }

    #[tokio::test]
    async fn test_followup_delay_enforced() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 10);
        testing::seed_mail_account(&db);
        // Only one day since the first email — delays are [2, 4].
        testing::seed_contact(
            &db,
            "early",
            ContactStatus::Sent,
            Some(Utc::now() - chrono::Duration::days(1)),
        );

        let (ctx, mailer, _, _) = testing::test_context(db.clone());
        run_once(&ctx).await;
        assert_eq!(mailer.sent_count(), 0);
        assert_eq!(
            db.get_contact("early").unwrap().unwrap().status,
            ContactStatus::Sent
        );
    }

    #[tokio::test]
    async fn test_followup_sends_and_preserves_first_date() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 10);
        testing::seed_mail_account(&db);
        let first = Utc::now() - chrono::Duration::days(5);
        testing::seed_contact(&db, "due", ContactStatus::Sent, Some(first));
        // Threading context from the original send.
        db.insert_email_send(&EmailSend {
            id: "s0".into(),
            user_id: "u1".into(),
            contact_id: "due".into(),
            status: SendStatus::Sent,
            followup_number: 0,
            sent_at: first,
            message_id: Some("<root@mock>".into()),
            thread_id: Some("<root@mock>".into()),
            error_message: None,
        })
        .unwrap();

        let (ctx, mailer, _, _) = testing::test_context(db.clone());
        run_once(&ctx).await;

        assert_eq!(mailer.sent_count(), 1);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].thread_id.as_deref(), Some("<root@mock>"));
        assert_eq!(sent[0].in_reply_to.as_deref(), Some("<root@mock>"));
        drop(sent);

        let contact = db.get_contact("due").unwrap().unwrap();
        assert_eq!(contact.status, ContactStatus::Followup1);
        assert_eq!(contact.first_email_date.unwrap(), first);
        assert!(contact.followup1_date.is_some());
        assert_eq!(contact.followups_sent, 1);

        let day = gate::user_day_key(Utc::now(), &gate::resolve_timezone("UTC"));
        let usage = db.get_usage("u1", &day).unwrap();
        assert_eq!(usage.emails_sent, 1);
        assert_eq!(usage.followups_sent, 1);
    }

    #[tokio::test]
    async fn test_terminal_contacts_never_touched() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 10);
        testing::seed_mail_account(&db);
        for (i, status) in [
            ContactStatus::Replied,
            ContactStatus::Bounced,
            ContactStatus::Rejected,
            ContactStatus::Stopped,
            ContactStatus::ManualBreak,
            ContactStatus::Failed,
        ]
        .into_iter()
        .enumerate()
        {
            testing::seed_contact(&db, &format!("t{i}"), status, Some(Utc::now()));
        }

        let (ctx, mailer, _, _) = testing::test_context(db.clone());
        run_once(&ctx).await;

        assert_eq!(mailer.sent_count(), 0);
        for i in 0..6 {
            assert!(db.sends_for_contact(&format!("t{i}")).unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_composer_failure_is_fatal_for_contact() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 10);
        testing::seed_mail_account(&db);
        testing::seed_contact(&db, "c1", ContactStatus::NotSent, None);

        let (ctx, mailer, composer, _) = testing::test_context(db.clone());
        composer.fail.store(true, Ordering::SeqCst);
        run_once(&ctx).await;

        assert_eq!(mailer.sent_count(), 0);
        let contact = db.get_contact("c1").unwrap().unwrap();
        assert_eq!(contact.status, ContactStatus::Failed);
        let sends = db.sends_for_contact("c1").unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].status, SendStatus::Failed);
        assert!(sends[0].error_message.as_deref().unwrap().contains("mock composer"));

        // Failed attempts never count against quota.
        let day = gate::user_day_key(Utc::now(), &gate::resolve_timezone("UTC"));
        assert_eq!(db.get_usage("u1", &day).unwrap().emails_sent, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_isolated_per_contact() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 10);
        testing::seed_mail_account(&db);
        testing::seed_contact(&db, "a", ContactStatus::NotSent, None);
        testing::seed_contact(&db, "b", ContactStatus::NotSent, None);

        let (ctx, mailer, _, _) = testing::test_context(db.clone());
        mailer.push_failure(JobClawError::transport_permanent("550 no such user"));
        run_once(&ctx).await;

        // One contact failed, the other still went out.
        assert_eq!(mailer.sent_count(), 1);
        let statuses: Vec<ContactStatus> = ["a", "b"]
            .iter()
            .map(|id| db.get_contact(id).unwrap().unwrap().status)
            .collect();
        assert!(statuses.contains(&ContactStatus::Failed));
        assert!(statuses.contains(&ContactStatus::Sent));

        let day = gate::user_day_key(Utc::now(), &gate::resolve_timezone("UTC"));
        assert_eq!(db.get_usage("u1", &day).unwrap().emails_sent, 1);
    }

    #[tokio::test]
    async fn test_claimed_contact_skipped() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 10);
        testing::seed_mail_account(&db);
        // Another execution already holds the lock.
        testing::seed_contact(&db, "c1", ContactStatus::Sending, None);

        let (ctx, mailer, _, _) = testing::test_context(db.clone());
        run_once(&ctx).await;

        assert_eq!(mailer.sent_count(), 0);
        assert_eq!(
            db.get_contact("c1").unwrap().unwrap().status,
            ContactStatus::Sending
        );
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        let user = testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 10);
        testing::seed_mail_account(&db);
        let contact = testing::seed_contact(&db, "c1", ContactStatus::Sending, None);

        let (ctx, _, _, _) = testing::test_context(db.clone());
        let orchestrator = SendOrchestrator::new(ctx);
        let receipt = SendReceipt {
            message_id: "<m1@mock>".into(),
            thread_id: "<m1@mock>".into(),
        };

        orchestrator.commit(&user, &contact, 0, &receipt).await.unwrap();
        let after_first = db.get_contact("c1").unwrap().unwrap();
        let recorded_date = after_first.first_email_date.unwrap();

        // Second commit for the same target status is a no-op.
        orchestrator.commit(&user, &contact, 0, &receipt).await.unwrap();
        let after_second = db.get_contact("c1").unwrap().unwrap();
        assert_eq!(after_second.first_email_date.unwrap(), recorded_date);
        assert_eq!(db.sends_for_contact("c1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_reference_date_fails_loudly_not_silently() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 10);
        testing::seed_mail_account(&db);
        // In 'sent' with no first_email_date: a data-integrity fault.
        testing::seed_contact(&db, "broken", ContactStatus::Sent, None);

        let (ctx, mailer, _, _) = testing::test_context(db.clone());
        run_once(&ctx).await;

        assert_eq!(mailer.sent_count(), 0);
        // Skipped, not repaired, not failed: the row is untouched.
        let contact = db.get_contact("broken").unwrap().unwrap();
        assert_eq!(contact.status, ContactStatus::Sent);
        assert!(contact.first_email_date.is_none());
        // And the fault is on the audit trail.
        let activity = db.recent_activity("u1", 10).unwrap();
        assert!(activity.iter().any(|m| m.contains("Integrity fault")));
    }

    #[tokio::test]
    async fn test_exhausted_sequence_moves_to_rejected() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 10);
        testing::seed_mail_account(&db);
        testing::seed_contact(&db, "done", ContactStatus::Followup2, Some(Utc::now()));

        let (ctx, mailer, _, _) = testing::test_context(db.clone());
        run_once(&ctx).await;

        assert_eq!(mailer.sent_count(), 0);
        assert_eq!(
            db.get_contact("done").unwrap().unwrap().status,
            ContactStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_sync_failure_never_rolls_back_commit() {
        let db = Arc::new(OutreachDb::open_in_memory().unwrap());
        testing::seed_user(&db, PlanTier::Pro);
        testing::seed_settings(&db, 10);
        testing::seed_mail_account(&db);
        testing::seed_contact(&db, "c1", ContactStatus::NotSent, None);

        let (ctx, mailer, _, sync) = testing::test_context(db.clone());
        sync.fail.store(true, Ordering::SeqCst);
        run_once(&ctx).await;

        assert_eq!(mailer.sent_count(), 1);
        let contact = db.get_contact("c1").unwrap().unwrap();
        assert_eq!(contact.status, ContactStatus::Sent);
        assert_eq!(db.sends_for_contact("c1").unwrap().len(), 1);
    }
}
