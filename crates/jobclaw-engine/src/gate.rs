//! Quota & eligibility gate — decides whether a user's send cycle runs at
//! all this tick, and how many sends remain.
//!
//! Day boundaries are computed in the user's configured timezone for both
//! the quota day key and the start-time window, so the two can never
//! disagree around local midnight.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use jobclaw_core::types::{AutomationStatus, CampaignSettings, DailyUsage, User};

/// Outcome of the eligibility check for one user on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Run { remaining_quota: u32 },
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotRunning,
    BeforeStartTime,
    NoMailAccount,
    TrialExpired,
    QuotaExhausted,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotRunning => "automation not running",
            SkipReason::BeforeStartTime => "before configured start time",
            SkipReason::NoMailAccount => "no connected mail account",
            SkipReason::TrialExpired => "trial period expired",
            SkipReason::QuotaExhausted => "daily quota exhausted",
        }
    }
}

/// Resolve an IANA timezone name, falling back to UTC on bad input.
pub fn resolve_timezone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        tracing::warn!("Unknown timezone {name:?}, falling back to UTC");
        chrono_tz::UTC
    })
}

/// Local day key ("YYYY-MM-DD") used for all daily-usage accounting.
pub fn user_day_key(now: DateTime<Utc>, tz: &Tz) -> String {
    now.with_timezone(tz).format("%Y-%m-%d").to_string()
}

/// Parse an "HH:MM" start time; malformed values open the window at
/// midnight rather than silently blocking all sends.
fn parse_start_time(raw: &str) -> NaiveTime {
    NaiveTime::parse_from_str(raw, "%H:%M").unwrap_or_else(|_| {
        tracing::warn!("Malformed start time {raw:?}, treating as 00:00");
        NaiveTime::MIN
    })
}

/// Whether local wall-clock time has reached the configured daily start.
pub fn past_start_time(now: DateTime<Utc>, tz: &Tz, start_time: &str) -> bool {
    now.with_timezone(tz).time() >= parse_start_time(start_time)
}

/// Evaluate the full gate for one user.
pub fn evaluate(
    user: &User,
    settings: &CampaignSettings,
    has_mail_account: bool,
    usage: &DailyUsage,
    now: DateTime<Utc>,
) -> GateDecision {
    if settings.automation_status != AutomationStatus::Running {
        return GateDecision::Skip(SkipReason::NotRunning);
    }

    let tz = resolve_timezone(&settings.timezone);
    if !past_start_time(now, &tz, &settings.start_time) {
        return GateDecision::Skip(SkipReason::BeforeStartTime);
    }

    if !has_mail_account {
        return GateDecision::Skip(SkipReason::NoMailAccount);
    }

    if let Some(trial_days) = user.plan.trial_days()
        && (now - user.created_at).num_days() >= trial_days
    {
        return GateDecision::Skip(SkipReason::TrialExpired);
    }

    let cap = settings.daily_limit.min(user.plan.daily_cap());
    let remaining = cap.saturating_sub(usage.emails_sent);
    if remaining == 0 {
        return GateDecision::Skip(SkipReason::QuotaExhausted);
    }

    GateDecision::Run {
        remaining_quota: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jobclaw_core::types::PlanTier;

    fn user(plan: PlanTier, created_days_ago: i64) -> User {
        User {
            id: "u1".into(),
            email: "sam@example.com".into(),
            name: "Sam".into(),
            plan,
            created_at: Utc::now() - chrono::Duration::days(created_days_ago),
        }
    }

    fn settings(limit: u32, start: &str, tz: &str) -> CampaignSettings {
        CampaignSettings {
            user_id: "u1".into(),
            daily_limit: limit,
            followup_count: 2,
            followup_delays: vec![2, 4],
            automation_status: AutomationStatus::Running,
            start_time: start.into(),
            timezone: tz.into(),
            attachment_url: None,
        }
    }

    fn usage(sent: u32) -> DailyUsage {
        DailyUsage {
            user_id: "u1".into(),
            day: "2026-08-07".into(),
            emails_sent: sent,
            ..Default::default()
        }
    }

    #[test]
    fn test_quota_math_uses_smaller_cap() {
        // Trial cap (15) beats a generous configured limit.
        let decision = evaluate(
            &user(PlanTier::Trial, 1),
            &settings(100, "00:00", "UTC"),
            true,
            &usage(10),
            Utc::now(),
        );
        assert_eq!(decision, GateDecision::Run { remaining_quota: 5 });

        // Configured limit beats the plan cap.
        let decision = evaluate(
            &user(PlanTier::Pro, 1),
            &settings(3, "00:00", "UTC"),
            true,
            &usage(1),
            Utc::now(),
        );
        assert_eq!(decision, GateDecision::Run { remaining_quota: 2 });
    }

    #[test]
    fn test_quota_exhausted_skips() {
        let decision = evaluate(
            &user(PlanTier::Pro, 1),
            &settings(3, "00:00", "UTC"),
            true,
            &usage(3),
            Utc::now(),
        );
        assert_eq!(decision, GateDecision::Skip(SkipReason::QuotaExhausted));
    }

    #[test]
    fn test_trial_expiry() {
        let decision = evaluate(
            &user(PlanTier::Trial, 20),
            &settings(10, "00:00", "UTC"),
            true,
            &usage(0),
            Utc::now(),
        );
        assert_eq!(decision, GateDecision::Skip(SkipReason::TrialExpired));

        // Paid plans never expire.
        let decision = evaluate(
            &user(PlanTier::Starter, 400),
            &settings(10, "00:00", "UTC"),
            true,
            &usage(0),
            Utc::now(),
        );
        assert!(matches!(decision, GateDecision::Run { .. }));
    }

    #[test]
    fn test_start_time_respects_timezone() {
        // 13:00 UTC is 09:00 in New York (EDT) — exactly at the window.
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 13, 0, 0).unwrap();
        let decision = evaluate(
            &user(PlanTier::Pro, 1),
            &settings(10, "09:00", "America/New_York"),
            true,
            &usage(0),
            now,
        );
        assert!(matches!(decision, GateDecision::Run { .. }));

        // One minute earlier is still before the local start.
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 12, 59, 0).unwrap();
        let decision = evaluate(
            &user(PlanTier::Pro, 1),
            &settings(10, "09:00", "America/New_York"),
            true,
            &usage(0),
            now,
        );
        assert_eq!(decision, GateDecision::Skip(SkipReason::BeforeStartTime));
    }

    #[test]
    fn test_day_key_follows_user_timezone() {
        // 03:00 UTC on Aug 7 is still Aug 6 evening in New York.
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 3, 0, 0).unwrap();
        let tz = resolve_timezone("America/New_York");
        assert_eq!(user_day_key(now, &tz), "2026-08-06");
        assert_eq!(user_day_key(now, &resolve_timezone("UTC")), "2026-08-07");
    }

    #[test]
    fn test_missing_mail_account_skips() {
        let decision = evaluate(
            &user(PlanTier::Pro, 1),
            &settings(10, "00:00", "UTC"),
            false,
            &usage(0),
            Utc::now(),
        );
        assert_eq!(decision, GateDecision::Skip(SkipReason::NoMailAccount));
    }
}
