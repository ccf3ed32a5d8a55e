//! Domain types — users, campaigns, contacts, send records, usage counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JobClawError, Result};

/// Default follow-up delays in days: first follow-up after 2 days,
/// second after 4 more.
pub const DEFAULT_FOLLOWUP_DELAYS: [u32; 2] = [2, 4];

// ── Users & plans ────────────────────────────────────

/// Account plan tier. Drives the enforced daily cap and trial expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Trial,
    Starter,
    Pro,
}

impl PlanTier {
    /// Plan-enforced daily send cap. The effective cap for a user is the
    /// smaller of this and their configured daily limit.
    pub fn daily_cap(&self) -> u32 {
        match self {
            PlanTier::Trial => 15,
            PlanTier::Starter => 50,
            PlanTier::Pro => 200,
        }
    }

    /// Days after account creation before a trial stops sending entirely.
    /// Paid tiers never expire.
    pub fn trial_days(&self) -> Option<i64> {
        match self {
            PlanTier::Trial => Some(14),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Trial => "trial",
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "starter" => PlanTier::Starter,
            "pro" => PlanTier::Pro,
            _ => PlanTier::Trial,
        }
    }
}

/// A JobClaw user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub plan: PlanTier,
    pub created_at: DateTime<Utc>,
}

// ── Campaign settings ────────────────────────────────────

/// Whether the automation runs for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationStatus {
    Running,
    Paused,
    Stopped,
}

impl AutomationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationStatus::Running => "running",
            AutomationStatus::Paused => "paused",
            AutomationStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => AutomationStatus::Running,
            "paused" => AutomationStatus::Paused,
            _ => AutomationStatus::Stopped,
        }
    }
}

/// Per-user outreach campaign configuration. Written by the dashboard,
/// read-only from the engine's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSettings {
    pub user_id: String,
    pub daily_limit: u32,
    pub followup_count: u32,
    /// Ordered follow-up delays in whole days, already parsed.
    pub followup_delays: Vec<u32>,
    pub automation_status: AutomationStatus,
    /// Local daily start time, "HH:MM".
    pub start_time: String,
    /// IANA timezone name, e.g. "America/New_York".
    pub timezone: String,
    /// Optional resume/attachment URL fetched at send time.
    pub attachment_url: Option<String>,
}

impl CampaignSettings {
    /// Delay in days required before follow-up number `n` (1-based).
    /// Falls back to the defaults when the configured list is short.
    pub fn delay_for_followup(&self, n: u32) -> u32 {
        let idx = n.saturating_sub(1) as usize;
        self.followup_delays
            .get(idx)
            .copied()
            .unwrap_or_else(|| DEFAULT_FOLLOWUP_DELAYS.get(idx).copied().unwrap_or(2))
    }
}

/// Parse a stored follow-up delay list into a typed sequence.
///
/// Dashboard clients have historically written this field three ways: a JSON
/// array (`[2,4]`), a JSON string containing an array (`"[2,4]"`), or a bare
/// comma list (`2,4`). Parse once here; the untyped form never escapes this
/// boundary. Unparseable input falls back to the documented default.
pub fn parse_delay_list(raw: &str) -> Vec<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return DEFAULT_FOLLOWUP_DELAYS.to_vec();
    }

    // JSON array, possibly double-encoded as a JSON string.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        match value {
            serde_json::Value::Array(items) => {
                let parsed: Vec<u32> = items
                    .iter()
                    .filter_map(|v| v.as_u64().map(|n| n as u32))
                    .collect();
                if !parsed.is_empty() {
                    return parsed;
                }
            }
            serde_json::Value::String(inner) => {
                // One level of stray encoding — recurse once on the payload.
                if inner != raw {
                    return parse_delay_list(&inner);
                }
            }
            _ => {}
        }
    }

    // Bare comma list.
    let parsed: Vec<u32> = raw
        .split(',')
        .filter_map(|p| p.trim().parse::<u32>().ok())
        .collect();
    if !parsed.is_empty() {
        return parsed;
    }

    tracing::warn!("Unparseable follow-up delay list {raw:?}, using defaults");
    DEFAULT_FOLLOWUP_DELAYS.to_vec()
}

// ── Mail accounts ────────────────────────────────────

/// A user's connected mailbox. Presence of this record is what "connected
/// outbound transport" means to the eligibility gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailAccount {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub imap_host: String,
    pub imap_port: u16,
    pub password: String,
    pub mailbox: String,
}

// ── Contacts ────────────────────────────────────

/// Lifecycle status of a tracked contact.
///
/// `Sending` and `SendingFollowup` are lock statuses: they mark a contact as
/// claimed by an in-flight cycle. A crash mid-send leaves the contact parked
/// there until an operator resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    NotSent,
    Sending,
    Sent,
    SendingFollowup,
    Followup1,
    Followup2,
    Replied,
    Bounced,
    Rejected,
    Stopped,
    ManualBreak,
    Failed,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::NotSent => "not_sent",
            ContactStatus::Sending => "sending",
            ContactStatus::Sent => "sent",
            ContactStatus::SendingFollowup => "sending_followup",
            ContactStatus::Followup1 => "followup_1",
            ContactStatus::Followup2 => "followup_2",
            ContactStatus::Replied => "replied",
            ContactStatus::Bounced => "bounced",
            ContactStatus::Rejected => "rejected",
            ContactStatus::Stopped => "stopped",
            ContactStatus::ManualBreak => "manual_break",
            ContactStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "not_sent" => ContactStatus::NotSent,
            "sending" => ContactStatus::Sending,
            "sent" => ContactStatus::Sent,
            "sending_followup" => ContactStatus::SendingFollowup,
            "followup_1" => ContactStatus::Followup1,
            "followup_2" => ContactStatus::Followup2,
            "replied" => ContactStatus::Replied,
            "bounced" => ContactStatus::Bounced,
            "rejected" => ContactStatus::Rejected,
            "stopped" => ContactStatus::Stopped,
            "manual_break" => ContactStatus::ManualBreak,
            "failed" => ContactStatus::Failed,
            other => {
                return Err(JobClawError::Store(format!(
                    "Unknown contact status: {other}"
                )));
            }
        })
    }

    /// Terminal statuses never mutate again through automation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContactStatus::Replied
                | ContactStatus::Bounced
                | ContactStatus::Rejected
                | ContactStatus::Stopped
                | ContactStatus::ManualBreak
                | ContactStatus::Failed
        )
    }

    /// Lock statuses held by an in-flight send.
    pub fn is_locked(&self) -> bool {
        matches!(self, ContactStatus::Sending | ContactStatus::SendingFollowup)
    }
}

/// A tracked outreach recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub status: ContactStatus,
    pub first_email_date: Option<DateTime<Utc>>,
    pub followup1_date: Option<DateTime<Utc>>,
    pub followup2_date: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub followups_sent: u32,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of the three stage timestamps, passed to the status-sync hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceDates {
    pub first_email_date: Option<DateTime<Utc>>,
    pub followup1_date: Option<DateTime<Utc>>,
    pub followup2_date: Option<DateTime<Utc>>,
}

impl From<&Contact> for ReferenceDates {
    fn from(c: &Contact) -> Self {
        Self {
            first_email_date: c.first_email_date,
            followup1_date: c.followup1_date,
            followup2_date: c.followup2_date,
        }
    }
}

// ── Email sends ────────────────────────────────────

/// Delivery status of one outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Queued,
    Sent,
    Delivered,
    Opened,
    Replied,
    Bounced,
    Failed,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Queued => "queued",
            SendStatus::Sent => "sent",
            SendStatus::Delivered => "delivered",
            SendStatus::Opened => "opened",
            SendStatus::Replied => "replied",
            SendStatus::Bounced => "bounced",
            SendStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => SendStatus::Queued,
            "sent" => SendStatus::Sent,
            "delivered" => SendStatus::Delivered,
            "opened" => SendStatus::Opened,
            "replied" => SendStatus::Replied,
            "bounced" => SendStatus::Bounced,
            _ => SendStatus::Failed,
        }
    }
}

/// One outbound email attempt, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSend {
    pub id: String,
    pub user_id: String,
    pub contact_id: String,
    pub status: SendStatus,
    /// 0 = initial message, 1 = first follow-up, 2 = second.
    pub followup_number: u32,
    pub sent_at: DateTime<Utc>,
    pub message_id: Option<String>,
    pub thread_id: Option<String>,
    pub error_message: Option<String>,
}

// ── Daily usage ────────────────────────────────────

/// Per-user counters for one local day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyUsage {
    pub user_id: String,
    /// Local day key, "YYYY-MM-DD" in the user's configured timezone.
    pub day: String,
    pub emails_sent: u32,
    pub followups_sent: u32,
    pub replies_received: u32,
}

// ── Activity log ────────────────────────────────────

/// Free-text audit trail entry for engine actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: i64,
    pub user_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// ── Mailer I/O ────────────────────────────────────

/// An attachment resolved at send time.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Fully composed outbound message handed to the mailer.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Root Message-ID of the conversation, set for follow-ups.
    pub thread_id: Option<String>,
    /// Message-ID of the immediately preceding message, for In-Reply-To.
    pub in_reply_to: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Transport confirmation for one send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: String,
    pub thread_id: String,
}

/// One message inside a conversation thread, as seen over IMAP.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub sender_email: String,
    pub timestamp: DateTime<Utc>,
    /// True when the account owner sent it.
    pub outbound: bool,
}

// ── Composer I/O ────────────────────────────────────

/// Everything the composer needs to draft one message.
#[derive(Debug, Clone, Serialize)]
pub struct ComposeRequest {
    pub user_id: String,
    pub contact_id: String,
    pub contact_name: String,
    pub contact_email: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub is_followup: bool,
    /// 0 = initial message, 1 or 2 for follow-ups.
    pub followup_number: u32,
    pub sender_name: String,
    pub attachment_url: Option<String>,
}

/// Generated subject and body.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}
