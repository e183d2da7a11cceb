//! Alert escalation ladder and lifecycle transitions.
//!
//! Escalation moves priority exactly one rung up the ladder and never
//! down; lowering a priority is an administrative override outside this
//! module. Resolution and acknowledgement are idempotent.

use chrono::{DateTime, Utc};

use haven_core::types::{Alert, UserId};

/// Move the alert one step up the ladder. Returns false, with the alert
/// unchanged, when it is already at the top.
pub fn escalate(alert: &mut Alert) -> bool {
    match alert.priority.next_level() {
        Some(next) => {
            alert.priority = next;
            true
        }
        None => false,
    }
}

/// Mark the alert resolved. Resolving an already-resolved alert is a
/// no-op, not an error; the first resolution time is kept.
pub fn resolve(alert: &mut Alert, now: DateTime<Utc>) {
    if alert.resolved {
        return;
    }
    alert.resolved = true;
    alert.resolved_at = Some(now);
}

/// Record that a user has seen the alert. Idempotent; the first
/// acknowledger is kept.
pub fn acknowledge(alert: &mut Alert, user: UserId, now: DateTime<Utc>) {
    if alert.acknowledged {
        return;
    }
    alert.acknowledged = true;
    alert.acknowledged_by = Some(user);
    alert.acknowledged_at = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use haven_core::types::{AlertKind, AlertPriority, HomeId};

    fn alert(priority: AlertPriority) -> Alert {
        Alert::new(
            HomeId::new(),
            None,
            AlertKind::Intrusion,
            priority,
            "Motion after hours",
            "Motion detected in the garage",
            Some("garage".to_string()),
            Utc::now(),
        )
    }

    #[test]
    fn escalation_walks_one_step_at_a_time() {
        let mut a = alert(AlertPriority::Info);
        let expected = [
            AlertPriority::Low,
            AlertPriority::Medium,
            AlertPriority::High,
            AlertPriority::Critical,
            AlertPriority::Emergency,
        ];
        for level in expected {
            assert!(escalate(&mut a));
            assert_eq!(a.priority, level);
        }
    }

    #[test]
    fn escalation_stops_at_emergency() {
        let mut a = alert(AlertPriority::Info);
        for _ in 0..5 {
            assert!(escalate(&mut a));
        }
        assert_eq!(a.priority, AlertPriority::Emergency);

        // Sixth call is a no-op.
        assert!(!escalate(&mut a));
        assert_eq!(a.priority, AlertPriority::Emergency);
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut a = alert(AlertPriority::High);
        let first = Utc::now();
        resolve(&mut a, first);
        assert!(a.resolved);
        assert_eq!(a.resolved_at, Some(first));

        resolve(&mut a, first + Duration::minutes(3));
        assert_eq!(a.resolved_at, Some(first));
    }

    #[test]
    fn acknowledge_keeps_the_first_acknowledger() {
        let mut a = alert(AlertPriority::High);
        let first_user = UserId::new();
        let now = Utc::now();

        acknowledge(&mut a, first_user, now);
        acknowledge(&mut a, UserId::new(), now + Duration::minutes(1));

        assert!(a.acknowledged);
        assert_eq!(a.acknowledged_by, Some(first_user));
        assert_eq!(a.acknowledged_at, Some(now));
    }
}
