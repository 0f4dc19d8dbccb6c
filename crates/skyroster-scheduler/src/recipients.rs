//! Recipient resolver — expands a candidate alert into notification tasks
//! for every administrative user whose preferences allow it.

use serde::{Deserialize, Serialize};

use crate::queue::NotificationTask;
use crate::thresholds::CandidateAlert;

/// Per-user notification opt-ins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPrefs {
    #[serde(default = "default_true")]
    pub email_enabled: bool,
    #[serde(default = "default_true")]
    pub certification_alerts: bool,
    #[serde(default)]
    pub daily_digest: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            email_enabled: true,
            certification_alerts: true,
            daily_digest: false,
        }
    }
}

/// An administrative user who may receive alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub prefs: NotificationPrefs,
}

impl Recipient {
    fn wants_certification_alerts(&self) -> bool {
        self.prefs.email_enabled && self.prefs.certification_alerts
    }
}

/// Priority from urgency: fewer days remaining means a lower (more urgent)
/// priority number.
pub fn priority_for(days_remaining: i64) -> i32 {
    if days_remaining <= 7 {
        1
    } else if days_remaining <= 14 {
        2
    } else {
        3
    }
}

/// Build one task per opted-in recipient. Zero eligible recipients yields an
/// empty list, which is not an error.
pub fn resolve(candidate: &CandidateAlert, recipients: &[Recipient]) -> Vec<NotificationTask> {
    let priority = priority_for(candidate.days_remaining);
    let subject = format!(
        "{} expires in {} day{} for {}",
        candidate.check_code,
        candidate.days_remaining,
        if candidate.days_remaining == 1 { "" } else { "s" },
        candidate.pilot_name,
    );
    let template_data = serde_json::json!({
        "pilot_id": candidate.pilot_id,
        "pilot_name": candidate.pilot_name,
        "check_code": candidate.check_code,
        "category": candidate.category,
        "expiry_date": candidate.expiry_date.format("%Y-%m-%d").to_string(),
        "days_remaining": candidate.days_remaining,
    });

    recipients
        .iter()
        .filter(|r| r.wants_certification_alerts())
        .map(|r| {
            NotificationTask::new(
                &r.email,
                "certification_expiry",
                &subject,
                "certification-expiry",
                template_data.clone(),
                priority,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candidate(days_remaining: i64) -> CandidateAlert {
        CandidateAlert {
            pilot_id: "P1".into(),
            pilot_name: "A. Kila".into(),
            check_code: "PC".into(),
            category: "Flight Checks".into(),
            expiry_date: NaiveDate::from_ymd_opt(2025, 6, 8).unwrap(),
            days_remaining,
        }
    }

    fn recipient(email: &str, enabled: bool, cert_alerts: bool) -> Recipient {
        Recipient {
            email: email.into(),
            name: None,
            prefs: NotificationPrefs {
                email_enabled: enabled,
                certification_alerts: cert_alerts,
                daily_digest: false,
            },
        }
    }

    #[test]
    fn test_priority_bands() {
        assert_eq!(priority_for(1), 1);
        assert_eq!(priority_for(7), 1);
        assert_eq!(priority_for(8), 2);
        assert_eq!(priority_for(14), 2);
        assert_eq!(priority_for(30), 3);
    }

    #[test]
    fn test_opted_out_recipients_skipped() {
        let recipients = vec![
            recipient("on@x", true, true),
            recipient("channel-off@x", false, true),
            recipient("category-off@x", true, false),
        ];
        let tasks = resolve(&candidate(7), &recipients);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].recipient, "on@x");
    }

    #[test]
    fn test_no_recipients_is_empty_not_error() {
        let tasks = resolve(&candidate(7), &[]);
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_task_payload() {
        let recipients = vec![recipient("ops@x", true, true)];
        let tasks = resolve(&candidate(7), &recipients);
        let t = &tasks[0];
        assert_eq!(t.priority, 1);
        assert_eq!(t.notification_type, "certification_expiry");
        assert_eq!(t.subject, "PC expires in 7 days for A. Kila");
        assert_eq!(t.template_data["pilot_id"], "P1");
        assert_eq!(t.template_data["expiry_date"], "2025-06-08");
        assert_eq!(t.template_data["days_remaining"], 7);
    }
}
