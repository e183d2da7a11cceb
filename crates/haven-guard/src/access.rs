//! Access grant validity and usage tracking.
//!
//! Grants are mutated only through the store's per-key atomic update,
//! so the usage counter never loses increments under concurrent calls.

use chrono::{DateTime, Utc};

use haven_core::types::AccessGrant;

/// Whether the grant admits use at `now`: it must be active and, when
/// an expiry is set, not past it.
pub fn is_valid(grant: &AccessGrant, now: DateTime<Utc>) -> bool {
    if !grant.active {
        return false;
    }
    if let Some(expires_at) = grant.expires_at {
        if now > expires_at {
            return false;
        }
    }
    true
}

/// Record one use: bump the counter and stamp last-used.
pub fn record_access(grant: &mut AccessGrant, now: DateTime<Utc>) {
    grant.access_count += 1;
    grant.last_used = Some(now);
}

/// Deactivate the grant. The record is kept for the audit trail.
pub fn revoke(grant: &mut AccessGrant) {
    grant.active = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use haven_core::types::{AccessLevel, DeviceId, HomeId, UserId};

    fn grant(now: DateTime<Utc>) -> AccessGrant {
        AccessGrant::new(HomeId::new(), UserId::new(), DeviceId::new(), AccessLevel::Family, now)
    }

    #[test]
    fn fresh_grant_is_valid() {
        let now = Utc::now();
        assert!(is_valid(&grant(now), now));
    }

    #[test]
    fn expired_grant_is_invalid_even_when_active() {
        let now = Utc::now();
        let mut g = grant(now);
        g.expires_at = Some(now - Duration::hours(1));
        assert!(g.active);
        assert!(!is_valid(&g, now));
    }

    #[test]
    fn inactive_grant_is_invalid_regardless_of_expiry() {
        let now = Utc::now();
        let mut g = grant(now);
        g.active = false;
        g.expires_at = Some(now + Duration::hours(1));
        assert!(!is_valid(&g, now));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let mut g = grant(now);
        g.expires_at = Some(now);
        assert!(is_valid(&g, now));
        assert!(!is_valid(&g, now + Duration::seconds(1)));
    }

    #[test]
    fn record_access_bumps_counter_and_timestamp() {
        let now = Utc::now();
        let mut g = grant(now);
        let later = now + Duration::minutes(5);

        record_access(&mut g, now);
        record_access(&mut g, later);

        assert_eq!(g.access_count, 2);
        assert_eq!(g.last_used, Some(later));
    }

    #[test]
    fn revoke_deactivates() {
        let now = Utc::now();
        let mut g = grant(now);
        revoke(&mut g);
        assert!(!g.active);
        assert!(!is_valid(&g, now));
    }
}
