//! Mock collaborators and seed helpers shared by the engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use jobclaw_core::error::{JobClawError, Result};
use jobclaw_core::traits::{Composer, Mailer, StatusSync};
use jobclaw_core::types::{
    AutomationStatus, CampaignSettings, ComposeRequest, Contact, ContactStatus, EmailDraft,
    MailAccount, OutgoingEmail, PlanTier, ReferenceDates, SendReceipt, ThreadMessage, User,
};
use jobclaw_store::OutreachDb;

use crate::orchestrator::EngineContext;

/// Records sends; fails with queued errors first, if any.
pub struct MockMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    failures: Mutex<VecDeque<JobClawError>>,
    threads: Mutex<HashMap<String, Vec<ThreadMessage>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            threads: Mutex::new(HashMap::new()),
        }
    }

    pub fn push_failure(&self, error: JobClawError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn set_thread(&self, thread_id: &str, messages: Vec<ThreadMessage>) {
        self.threads
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), messages);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, _account: &MailAccount, email: &OutgoingEmail) -> Result<SendReceipt> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(email.clone());
        let message_id = format!("<msg-{}@mock>", sent.len());
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
        _account: &MailAccount,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>> {
        Ok(self
            .threads
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Returns a fixed draft, or fails when told to.
pub struct MockComposer {
    pub fail: AtomicBool,
}

impl MockComposer {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Composer for MockComposer {
    async fn generate(&self, request: &ComposeRequest) -> Result<EmailDraft> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(JobClawError::Composer("mock composer failure".into()));
        }
        Ok(EmailDraft {
            subject: format!("Hello {}", request.contact_name),
            body: format!("Hi {},\n\nReaching out.\n", request.contact_name),
        })
    }
}

/// Records notifications; fails when told to.
pub struct MockSync {
    pub notifications: Mutex<Vec<(String, ContactStatus)>>,
    pub fail: AtomicBool,
}

impl MockSync {
    pub fn new() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StatusSync for MockSync {
    async fn notify(
        &self,
        _user_id: &str,
        contact_id: &str,
        status: ContactStatus,
        _reference_dates: &ReferenceDates,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(JobClawError::Sync("mock sync failure".into()));
        }
        self.notifications
            .lock()
            .unwrap()
            .push((contact_id.to_string(), status));
        Ok(())
    }
}

/// Engine context with all collaborators mocked and no inter-send delay.
pub fn test_context(
    db: Arc<OutreachDb>,
) -> (
    Arc<EngineContext>,
    Arc<MockMailer>,
    Arc<MockComposer>,
    Arc<MockSync>,
) {
    let mailer = Arc::new(MockMailer::new());
    let composer = Arc::new(MockComposer::new());
    let sync = Arc::new(MockSync::new());
    let ctx = Arc::new(EngineContext {
        db,
        mailer: mailer.clone(),
        composer: composer.clone(),
        sync: sync.clone(),
        http: reqwest::Client::new(),
        inter_send_delay: Duration::ZERO,
    });
    (ctx, mailer, composer, sync)
}

// ── Seed helpers ────────────────────────────────────

pub fn seed_user(db: &OutreachDb, plan: PlanTier) -> User {
    let user = User {
        id: "u1".into(),
        email: "sam@example.com".into(),
        name: "Sam".into(),
        plan,
        created_at: Utc::now() - chrono::Duration::days(1),
    };
    db.upsert_user(&user).unwrap();
    user
}

pub fn seed_settings(db: &OutreachDb, daily_limit: u32) -> CampaignSettings {
    let settings = CampaignSettings {
        user_id: "u1".into(),
        daily_limit,
        followup_count: 2,
        followup_delays: vec![2, 4],
        automation_status: AutomationStatus::Running,
        start_time: "00:00".into(),
        timezone: "UTC".into(),
        attachment_url: None,
    };
    db.save_settings(&settings).unwrap();
    settings
}

pub fn seed_mail_account(db: &OutreachDb) -> MailAccount {
    let account = MailAccount {
        user_id: "u1".into(),
        email: "sam@example.com".into(),
        display_name: Some("Sam".into()),
        smtp_host: "smtp.example.com".into(),
        smtp_port: 587,
        imap_host: "imap.example.com".into(),
        imap_port: 993,
        password: "secret".into(),
        mailbox: "INBOX".into(),
    };
    db.save_mail_account(&account).unwrap();
    account
}

pub fn seed_contact(
    db: &OutreachDb,
    id: &str,
    status: ContactStatus,
    first_email_date: Option<DateTime<Utc>>,
) -> Contact {
    let contact = Contact {
        id: id.to_string(),
        user_id: "u1".into(),
        email: format!("{id}@acme.com"),
        name: format!("Contact {id}"),
        company: Some("Acme".into()),
        role: Some("Engineer".into()),
        status,
        first_email_date,
        followup1_date: None,
        followup2_date: None,
        last_sent_at: None,
        followups_sent: 0,
        created_at: Utc::now(),
    };
    db.insert_contact(&contact).unwrap();
    contact
}
