//! Contact state machine — decides what, if anything, to send next.
//!
//! Follow-up delays are measured in whole elapsed days from the stage's own
//! reference date, never from generic activity timestamps. A stage whose
//! required reference date is missing is a data-integrity fault: the contact
//! is skipped loudly, never treated as due.

use chrono::{DateTime, Utc};

use jobclaw_core::types::{CampaignSettings, Contact, ContactStatus};

/// What the send cycle should do with one contact right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// First-touch message, no delay required.
    SendInitial,
    /// Follow-up number n (1-based), delay already satisfied.
    SendFollowup(u32),
    /// Sequence complete — transition straight to rejected.
    Exhausted,
    /// A follow-up is configured but its delay has not elapsed.
    Wait,
    /// Claimed by an in-flight send; leave alone.
    Locked,
    /// Terminal status; never touched again.
    Terminal,
    /// Required reference date missing — skip and log, never repair.
    IntegrityFault(&'static str),
}

fn days_elapsed(now: DateTime<Utc>, reference: DateTime<Utc>) -> i64 {
    (now - reference).num_days()
}

/// Evaluate one contact against the campaign configuration.
pub fn next_action(
    contact: &Contact,
    settings: &CampaignSettings,
    now: DateTime<Utc>,
) -> NextAction {
    if contact.status.is_terminal() {
        return NextAction::Terminal;
    }
    if contact.status.is_locked() {
        return NextAction::Locked;
    }

    match contact.status {
        ContactStatus::NotSent => NextAction::SendInitial,

        ContactStatus::Sent => {
            if settings.followup_count < 1 {
                return NextAction::Exhausted;
            }
            match contact.first_email_date {
                None => NextAction::IntegrityFault(
                    "contact is in 'sent' but has no first_email_date",
                ),
                Some(reference) => {
                    if days_elapsed(now, reference) >= settings.delay_for_followup(1) as i64 {
                        NextAction::SendFollowup(1)
                    } else {
                        NextAction::Wait
                    }
                }
            }
        }

        ContactStatus::Followup1 => {
            if settings.followup_count < 2 {
                return NextAction::Exhausted;
            }
            match contact.followup1_date {
                None => NextAction::IntegrityFault(
                    "contact is in 'followup_1' but has no followup1_date",
                ),
                Some(reference) => {
                    if days_elapsed(now, reference) >= settings.delay_for_followup(2) as i64 {
                        NextAction::SendFollowup(2)
                    } else {
                        NextAction::Wait
                    }
                }
            }
        }

        // Nothing is configured beyond the second follow-up.
        ContactStatus::Followup2 => NextAction::Exhausted,

        // is_terminal / is_locked handled above.
        _ => NextAction::Terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobclaw_core::types::AutomationStatus;

    fn settings(delays: Vec<u32>) -> CampaignSettings {
        CampaignSettings {
            user_id: "u1".into(),
            daily_limit: 20,
            followup_count: 2,
            followup_delays: delays,
            automation_status: AutomationStatus::Running,
            start_time: "09:00".into(),
            timezone: "UTC".into(),
            attachment_url: None,
        }
    }

    fn contact(status: ContactStatus) -> Contact {
        Contact {
            id: "c1".into(),
            user_id: "u1".into(),
            email: "jordan@acme.com".into(),
            name: "Jordan".into(),
            company: None,
            role: None,
            status,
            first_email_date: None,
            followup1_date: None,
            followup2_date: None,
            last_sent_at: None,
            followups_sent: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_not_sent_is_immediately_due() {
        let action = next_action(&contact(ContactStatus::NotSent), &settings(vec![2, 4]), Utc::now());
        assert_eq!(action, NextAction::SendInitial);
    }

    #[test]
    fn test_followup_delay_not_yet_elapsed() {
        let now = Utc::now();
        let mut c = contact(ContactStatus::Sent);
        c.first_email_date = Some(now - chrono::Duration::days(1));
        assert_eq!(next_action(&c, &settings(vec![2, 4]), now), NextAction::Wait);
    }

    #[test]
    fn test_followup_delay_elapsed() {
        let now = Utc::now();
        let mut c = contact(ContactStatus::Sent);
        c.first_email_date = Some(now - chrono::Duration::days(5));
        assert_eq!(
            next_action(&c, &settings(vec![2, 4]), now),
            NextAction::SendFollowup(1)
        );
    }

    #[test]
    fn test_followup_delay_boundary_is_inclusive() {
        let now = Utc::now();
        let mut c = contact(ContactStatus::Sent);
        c.first_email_date = Some(now - chrono::Duration::days(2));
        assert_eq!(
            next_action(&c, &settings(vec![2, 4]), now),
            NextAction::SendFollowup(1)
        );
        // 47 hours is one whole day, not two.
        c.first_email_date = Some(now - chrono::Duration::hours(47));
        assert_eq!(next_action(&c, &settings(vec![2, 4]), now), NextAction::Wait);
    }

    #[test]
    fn test_second_followup_measured_from_followup1_date_only() {
        let now = Utc::now();
        let mut c = contact(ContactStatus::Followup1);
        // The first-email date is long past, but the follow-up delay is
        // measured from followup1_date alone.
        c.first_email_date = Some(now - chrono::Duration::days(30));
        c.followup1_date = Some(now - chrono::Duration::days(1));
        assert_eq!(next_action(&c, &settings(vec![2, 4]), now), NextAction::Wait);

        c.followup1_date = Some(now - chrono::Duration::days(4));
        assert_eq!(
            next_action(&c, &settings(vec![2, 4]), now),
            NextAction::SendFollowup(2)
        );
    }

    #[test]
    fn test_missing_reference_date_is_integrity_fault() {
        let c = contact(ContactStatus::Sent);
        assert!(matches!(
            next_action(&c, &settings(vec![2, 4]), Utc::now()),
            NextAction::IntegrityFault(_)
        ));

        let c = contact(ContactStatus::Followup1);
        assert!(matches!(
            next_action(&c, &settings(vec![2, 4]), Utc::now()),
            NextAction::IntegrityFault(_)
        ));
    }

    #[test]
    fn test_sequence_exhaustion() {
        let mut c = contact(ContactStatus::Followup2);
        c.followup2_date = Some(Utc::now());
        assert_eq!(
            next_action(&c, &settings(vec![2, 4]), Utc::now()),
            NextAction::Exhausted
        );
    }

    #[test]
    fn test_terminal_statuses_never_act() {
        for status in [
            ContactStatus::Replied,
            ContactStatus::Bounced,
            ContactStatus::Rejected,
            ContactStatus::Stopped,
            ContactStatus::ManualBreak,
            ContactStatus::Failed,
        ] {
            assert_eq!(
                next_action(&contact(status), &settings(vec![2, 4]), Utc::now()),
                NextAction::Terminal
            );
        }
    }

    #[test]
    fn test_locked_contacts_left_alone() {
        for status in [ContactStatus::Sending, ContactStatus::SendingFollowup] {
            assert_eq!(
                next_action(&contact(status), &settings(vec![2, 4]), Utc::now()),
                NextAction::Locked
            );
        }
    }
}
