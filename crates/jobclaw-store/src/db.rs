//! Outreach database — SQLite schema and operations for the engine.
//!
//! All engine-side contact status mutation goes through `claim_contact`
//! (a conditional update) or `commit_send_transition`; there is no plain
//! read-then-write status path here.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

use jobclaw_core::error::{JobClawError, Result};
use jobclaw_core::types::{
    AutomationStatus, CampaignSettings, Contact, ContactStatus, DailyUsage, EmailSend,
    MailAccount, PlanTier, SendStatus, User, parse_delay_list,
};

/// Outreach database — shared by the engine and the surrounding process.
pub struct OutreachDb {
    conn: Mutex<Connection>,
}

/// One known conversation thread for reply detection: the contact, the root
/// thread id, and the timestamp of the user's own first outbound message.
#[derive(Debug, Clone)]
pub struct OutreachThread {
    pub contact_id: String,
    pub contact_email: String,
    pub thread_id: String,
    pub first_sent_at: DateTime<Utc>,
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn parse_ts_opt(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(&s)).transpose()
}

/// Shared SELECT column list for contact queries — single source of truth.
const CONTACT_SELECT: &str = "SELECT id,user_id,email,name,company,role,status,first_email_date,followup1_date,followup2_date,last_sent_at,followups_sent,created_at FROM contacts";

/// Map a database row to a Contact struct.
fn row_to_contact(row: &rusqlite::Row) -> rusqlite::Result<Contact> {
    let status: String = row.get(6)?;
    Ok(Contact {
        id: row.get(0)?,
        user_id: row.get(1)?,
        email: row.get(2)?,
        name: row.get(3)?,
        company: row.get(4)?,
        role: row.get(5)?,
        status: ContactStatus::parse(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::other(e.to_string())),
            )
        })?,
        first_email_date: parse_ts_opt(row.get(7)?)?,
        followup1_date: parse_ts_opt(row.get(8)?)?,
        followup2_date: parse_ts_opt(row.get(9)?)?,
        last_sent_at: parse_ts_opt(row.get(10)?)?,
        followups_sent: row.get(11)?,
        created_at: parse_ts(&row.get::<_, String>(12)?)?,
    })
}

fn row_to_send(row: &rusqlite::Row) -> rusqlite::Result<EmailSend> {
    let status: String = row.get(3)?;
    Ok(EmailSend {
        id: row.get(0)?,
        user_id: row.get(1)?,
        contact_id: row.get(2)?,
        status: SendStatus::parse(&status),
        followup_number: row.get(4)?,
        sent_at: parse_ts(&row.get::<_, String>(5)?)?,
        message_id: row.get(6)?,
        thread_id: row.get(7)?,
        error_message: row.get(8)?,
    })
}

impl OutreachDb {
    /// Open or create the outreach database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| JobClawError::Store(format!("DB open error: {e}")))?;

        // WAL mode allows concurrent readers/writers and prevents
        // "database is locked" errors during overlapping cycles.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| JobClawError::Store(format!("DB pragma error: {e}")))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| JobClawError::Store(format!("DB open error: {e}")))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| JobClawError::Store(format!("Lock: {e}")))
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                plan TEXT NOT NULL DEFAULT 'trial',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS campaign_settings (
                user_id TEXT PRIMARY KEY,
                daily_limit INTEGER NOT NULL DEFAULT 20,
                followup_count INTEGER NOT NULL DEFAULT 2,
                followup_delays TEXT NOT NULL DEFAULT '[2,4]',
                automation_status TEXT NOT NULL DEFAULT 'stopped',
                start_time TEXT NOT NULL DEFAULT '09:00',
                timezone TEXT NOT NULL DEFAULT 'UTC',
                attachment_url TEXT
            );

            CREATE TABLE IF NOT EXISTS mail_accounts (
                user_id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                display_name TEXT,
                smtp_host TEXT NOT NULL,
                smtp_port INTEGER NOT NULL DEFAULT 587,
                imap_host TEXT NOT NULL,
                imap_port INTEGER NOT NULL DEFAULT 993,
                password TEXT NOT NULL,
                mailbox TEXT NOT NULL DEFAULT 'INBOX'
            );

            CREATE TABLE IF NOT EXISTS contacts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                email TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                company TEXT,
                role TEXT,
                status TEXT NOT NULL DEFAULT 'not_sent',
                first_email_date TEXT,
                followup1_date TEXT,
                followup2_date TEXT,
                last_sent_at TEXT,
                followups_sent INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE(user_id, email)
            );
            CREATE INDEX IF NOT EXISTS idx_contacts_user_status
                ON contacts(user_id, status);

            CREATE TABLE IF NOT EXISTS email_sends (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                contact_id TEXT NOT NULL,
                status TEXT NOT NULL,
                followup_number INTEGER NOT NULL DEFAULT 0,
                sent_at TEXT NOT NULL,
                message_id TEXT,
                thread_id TEXT,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_sends_contact
                ON email_sends(contact_id, sent_at);

            CREATE TABLE IF NOT EXISTS daily_usage (
                user_id TEXT NOT NULL,
                day TEXT NOT NULL,
                emails_sent INTEGER NOT NULL DEFAULT 0,
                followups_sent INTEGER NOT NULL DEFAULT 0,
                replies_received INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, day)
            );

            CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
        ",
        )
        .map_err(|e| JobClawError::Store(format!("Migration error: {e}")))?;
        Ok(())
    }

    // ── Users ────────────────────────────────────

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, email, name, plan, created_at) VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(id) DO UPDATE SET email=?2, name=?3, plan=?4",
            params![
                user.id,
                user.email,
                user.name,
                user.plan.as_str(),
                ts(&user.created_at)
            ],
        )
        .map_err(|e| JobClawError::Store(format!("Upsert user: {e}")))?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id,email,name,plan,created_at FROM users WHERE id=?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    plan: PlanTier::parse(&row.get::<_, String>(3)?),
                    created_at: parse_ts(&row.get::<_, String>(4)?)?,
                })
            },
        )
        .optional()
        .map_err(|e| JobClawError::Store(format!("Get user: {e}")))
    }

    /// Users whose campaign automation is currently running.
    pub fn list_running_users(&self) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT u.id,u.email,u.name,u.plan,u.created_at FROM users u
                 JOIN campaign_settings s ON s.user_id = u.id
                 WHERE s.automation_status='running' ORDER BY u.id",
            )
            .map_err(|e| JobClawError::Store(format!("Prepare: {e}")))?;
        let users = stmt
            .query_map([], |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    plan: PlanTier::parse(&row.get::<_, String>(3)?),
                    created_at: parse_ts(&row.get::<_, String>(4)?)?,
                })
            })
            .map_err(|e| JobClawError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(users)
    }

    // ── Campaign settings ────────────────────────────────────

    pub fn save_settings(&self, settings: &CampaignSettings) -> Result<()> {
        let conn = self.lock()?;
        let delays = serde_json::to_string(&settings.followup_delays)
            .unwrap_or_else(|_| "[2,4]".to_string());
        conn.execute(
            "INSERT INTO campaign_settings
               (user_id, daily_limit, followup_count, followup_delays, automation_status, start_time, timezone, attachment_url)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(user_id) DO UPDATE SET
               daily_limit=?2, followup_count=?3, followup_delays=?4,
               automation_status=?5, start_time=?6, timezone=?7, attachment_url=?8",
            params![
                settings.user_id,
                settings.daily_limit,
                settings.followup_count,
                delays,
                settings.automation_status.as_str(),
                settings.start_time,
                settings.timezone,
                settings.attachment_url
            ],
        )
        .map_err(|e| JobClawError::Store(format!("Save settings: {e}")))?;
        Ok(())
    }

    /// Settings lookup. The stored delay list may be a JSON array, a
    /// double-encoded string, or a bare comma list — it is parsed into a
    /// typed sequence here and the raw form never leaves this method.
    pub fn get_settings(&self, user_id: &str) -> Result<Option<CampaignSettings>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT user_id, daily_limit, followup_count, followup_delays, automation_status, start_time, timezone, attachment_url
             FROM campaign_settings WHERE user_id=?1",
            params![user_id],
            |row| {
                let raw_delays: String = row.get(3)?;
                let status: String = row.get(4)?;
                Ok(CampaignSettings {
                    user_id: row.get(0)?,
                    daily_limit: row.get(1)?,
                    followup_count: row.get(2)?,
                    followup_delays: parse_delay_list(&raw_delays),
                    automation_status: AutomationStatus::parse(&status),
                    start_time: row.get(5)?,
                    timezone: row.get(6)?,
                    attachment_url: row.get(7)?,
                })
            },
        )
        .optional()
        .map_err(|e| JobClawError::Store(format!("Get settings: {e}")))
    }

    // ── Mail accounts ────────────────────────────────────

    pub fn save_mail_account(&self, account: &MailAccount) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO mail_accounts
               (user_id, email, display_name, smtp_host, smtp_port, imap_host, imap_port, password, mailbox)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
             ON CONFLICT(user_id) DO UPDATE SET
               email=?2, display_name=?3, smtp_host=?4, smtp_port=?5,
               imap_host=?6, imap_port=?7, password=?8, mailbox=?9",
            params![
                account.user_id,
                account.email,
                account.display_name,
                account.smtp_host,
                account.smtp_port,
                account.imap_host,
                account.imap_port,
                account.password,
                account.mailbox
            ],
        )
        .map_err(|e| JobClawError::Store(format!("Save mail account: {e}")))?;
        Ok(())
    }

    pub fn get_mail_account(&self, user_id: &str) -> Result<Option<MailAccount>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT user_id, email, display_name, smtp_host, smtp_port, imap_host, imap_port, password, mailbox
             FROM mail_accounts WHERE user_id=?1",
            params![user_id],
            |row| {
                Ok(MailAccount {
                    user_id: row.get(0)?,
                    email: row.get(1)?,
                    display_name: row.get(2)?,
                    smtp_host: row.get(3)?,
                    smtp_port: row.get(4)?,
                    imap_host: row.get(5)?,
                    imap_port: row.get(6)?,
                    password: row.get(7)?,
                    mailbox: row.get(8)?,
                })
            },
        )
        .optional()
        .map_err(|e| JobClawError::Store(format!("Get mail account: {e}")))
    }

    // ── Contacts ────────────────────────────────────

    pub fn insert_contact(&self, contact: &Contact) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO contacts
               (id, user_id, email, name, company, role, status, first_email_date, followup1_date, followup2_date, last_sent_at, followups_sent, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                contact.id,
                contact.user_id,
                contact.email,
                contact.name,
                contact.company,
                contact.role,
                contact.status.as_str(),
                contact.first_email_date.as_ref().map(ts),
                contact.followup1_date.as_ref().map(ts),
                contact.followup2_date.as_ref().map(ts),
                contact.last_sent_at.as_ref().map(ts),
                contact.followups_sent,
                ts(&contact.created_at)
            ],
        )
        .map_err(|e| JobClawError::Store(format!("Insert contact: {e}")))?;
        Ok(())
    }

    pub fn get_contact(&self, id: &str) -> Result<Option<Contact>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{CONTACT_SELECT} WHERE id=?1"),
            params![id],
            row_to_contact,
        )
        .optional()
        .map_err(|e| JobClawError::Store(format!("Get contact: {e}")))
    }

    /// Contacts a send cycle should consider, in processing priority order:
    /// contacts awaiting follow-up 2 first, then follow-up 1, then first
    /// sends. Follow-ups have waited longest and must not be starved by a
    /// backlog of first-touch sends when quota is tight.
    pub fn contacts_pending(&self, user_id: &str) -> Result<Vec<Contact>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{CONTACT_SELECT} WHERE user_id=?1 AND status IN ('followup_1','sent','not_sent')
                 ORDER BY CASE status
                     WHEN 'followup_1' THEN 0
                     WHEN 'sent' THEN 1
                     ELSE 2
                 END, created_at"
            ))
            .map_err(|e| JobClawError::Store(format!("Prepare: {e}")))?;
        let contacts = stmt
            .query_map(params![user_id], row_to_contact)
            .map_err(|e| JobClawError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(contacts)
    }

    /// Atomic claim: move a contact into a lock status only if its current
    /// status still matches what this cycle observed. Exactly one updated
    /// row means the claim succeeded; zero rows means another execution got
    /// there first and this cycle must skip the contact.
    pub fn claim_contact(
        &self,
        id: &str,
        expected: ContactStatus,
        lock: ContactStatus,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE contacts SET status=?1 WHERE id=?2 AND status=?3",
                params![lock.as_str(), id, expected.as_str()],
            )
            .map_err(|e| JobClawError::Store(format!("Claim contact: {e}")))?;
        Ok(changed == 1)
    }

    /// Commit a confirmed send: final status, last_sent_at, and exactly one
    /// stage date. COALESCE keeps an already-set date untouched, so each
    /// reference date is written at most once for the life of the row.
    pub fn commit_send_transition(
        &self,
        contact_id: &str,
        final_status: ContactStatus,
        followup_number: u32,
        now: &DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        let sql = match followup_number {
            0 => {
                "UPDATE contacts SET status=?1, last_sent_at=?2,
                     first_email_date=COALESCE(first_email_date, ?2)
                 WHERE id=?3"
            }
            1 => {
                "UPDATE contacts SET status=?1, last_sent_at=?2,
                     followup1_date=COALESCE(followup1_date, ?2),
                     followups_sent=followups_sent+1
                 WHERE id=?3"
            }
            2 => {
                "UPDATE contacts SET status=?1, last_sent_at=?2,
                     followup2_date=COALESCE(followup2_date, ?2),
                     followups_sent=followups_sent+1
                 WHERE id=?3"
            }
            n => {
                return Err(JobClawError::Store(format!(
                    "Unsupported follow-up number: {n}"
                )));
            }
        };
        conn.execute(sql, params![final_status.as_str(), ts(now), contact_id])
            .map_err(|e| JobClawError::Store(format!("Commit send: {e}")))?;
        Ok(())
    }

    /// Park a contact in the terminal failed status after an unrecoverable
    /// send attempt. Requires manual reset to resume.
    pub fn mark_contact_failed(&self, contact_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE contacts SET status='failed' WHERE id=?1",
            params![contact_id],
        )
        .map_err(|e| JobClawError::Store(format!("Mark failed: {e}")))?;
        Ok(())
    }

    // ── Email sends ────────────────────────────────────

    pub fn insert_email_send(&self, send: &EmailSend) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO email_sends
               (id, user_id, contact_id, status, followup_number, sent_at, message_id, thread_id, error_message)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                send.id,
                send.user_id,
                send.contact_id,
                send.status.as_str(),
                send.followup_number,
                ts(&send.sent_at),
                send.message_id,
                send.thread_id,
                send.error_message
            ],
        )
        .map_err(|e| JobClawError::Store(format!("Insert send: {e}")))?;
        Ok(())
    }

    /// The most recent confirmed send for a contact, used to thread
    /// follow-ups into the same conversation.
    pub fn latest_send_for_contact(&self, contact_id: &str) -> Result<Option<EmailSend>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id,user_id,contact_id,status,followup_number,sent_at,message_id,thread_id,error_message
             FROM email_sends WHERE contact_id=?1 AND status='sent'
             ORDER BY sent_at DESC LIMIT 1",
            params![contact_id],
            row_to_send,
        )
        .optional()
        .map_err(|e| JobClawError::Store(format!("Latest send: {e}")))
    }

    pub fn sends_for_contact(&self, contact_id: &str) -> Result<Vec<EmailSend>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id,user_id,contact_id,status,followup_number,sent_at,message_id,thread_id,error_message
                 FROM email_sends WHERE contact_id=?1 ORDER BY sent_at",
            )
            .map_err(|e| JobClawError::Store(format!("Prepare: {e}")))?;
        let sends = stmt
            .query_map(params![contact_id], row_to_send)
            .map_err(|e| JobClawError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(sends)
    }

    /// Known conversation threads for reply detection: per contact still in
    /// an awaiting-reply status, the thread id and the timestamp of the
    /// user's own first outbound message in that thread.
    pub fn open_threads(&self, user_id: &str) -> Result<Vec<OutreachThread>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.email, e.thread_id, MIN(e.sent_at)
                 FROM contacts c
                 JOIN email_sends e ON e.contact_id = c.id
                 WHERE c.user_id=?1
                   AND c.status IN ('sent','followup_1','followup_2')
                   AND e.status='sent' AND e.thread_id IS NOT NULL
                 GROUP BY c.id, e.thread_id",
            )
            .map_err(|e| JobClawError::Store(format!("Prepare: {e}")))?;
        let threads = stmt
            .query_map(params![user_id], |row| {
                Ok(OutreachThread {
                    contact_id: row.get(0)?,
                    contact_email: row.get(1)?,
                    thread_id: row.get(2)?,
                    first_sent_at: parse_ts(&row.get::<_, String>(3)?)?,
                })
            })
            .map_err(|e| JobClawError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(threads)
    }

    // ── Daily usage ────────────────────────────────────

    /// Usage counters for one user and day key, zeroed when absent.
    pub fn get_usage(&self, user_id: &str, day: &str) -> Result<DailyUsage> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT emails_sent, followups_sent, replies_received
                 FROM daily_usage WHERE user_id=?1 AND day=?2",
                params![user_id, day],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?, row.get::<_, u32>(2)?)),
            )
            .optional()
            .map_err(|e| JobClawError::Store(format!("Get usage: {e}")))?;
        let (emails_sent, followups_sent, replies_received) = row.unwrap_or((0, 0, 0));
        Ok(DailyUsage {
            user_id: user_id.to_string(),
            day: day.to_string(),
            emails_sent,
            followups_sent,
            replies_received,
        })
    }

    /// Write absolute usage counters. Callers re-read with `get_usage`
    /// immediately before calling this, per the read-then-write protocol.
    pub fn put_usage(&self, usage: &DailyUsage) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO daily_usage (user_id, day, emails_sent, followups_sent, replies_received)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(user_id, day) DO UPDATE SET
               emails_sent=?3, followups_sent=?4, replies_received=?5",
            params![
                usage.user_id,
                usage.day,
                usage.emails_sent,
                usage.followups_sent,
                usage.replies_received
            ],
        )
        .map_err(|e| JobClawError::Store(format!("Put usage: {e}")))?;
        Ok(())
    }

    // ── Activity log ────────────────────────────────────

    pub fn log_activity(&self, user_id: &str, message: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO activity_log (user_id, message, created_at) VALUES (?1,?2,?3)",
            params![user_id, message, ts(&Utc::now())],
        )
        .map_err(|e| JobClawError::Store(format!("Log activity: {e}")))?;
        Ok(())
    }

    pub fn recent_activity(&self, user_id: &str, limit: usize) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT message FROM activity_log WHERE user_id=?1
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| JobClawError::Store(format!("Prepare: {e}")))?;
        let entries = stmt
            .query_map(params![user_id, limit as i64], |row| row.get::<_, String>(0))
            .map_err(|e| JobClawError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }
}
