//! Audit event records emitted by the decision core.
//!
//! Every allow/deny, escalation, revocation, and rate-limit trip is
//! reported as one of these records to an append-only audit sink. The
//! core emits them; it does not own their storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    AlertId, AlertPriority, DeviceId, GrantId, HomeId, PolicyId, PolicyKind, TokenId, TokenKind,
    UserId,
};

/// Unique identifier for an audit event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// A structured audit record: what was decided, about whom, and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    pub home: Option<HomeId>,
    pub timestamp: DateTime<Utc>,
    pub payload: AuditPayload,
}

impl AuditEvent {
    /// The clock is injected so decisions and their audit records carry
    /// the same timestamp.
    pub fn new(home: Option<HomeId>, payload: AuditPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            home,
            timestamp: now,
            payload,
        }
    }
}

/// The audit payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum AuditPayload {
    // ── Access decisions ──────────────────────────────────────
    /// The facade evaluated a device-operation request.
    AccessEvaluated {
        user: UserId,
        device: DeviceId,
        operation: String,
        allowed: bool,
        /// Which sub-check denied, when not allowed.
        reason: Option<String>,
    },
    /// A grant was created for a (home, user, device) triple.
    GrantCreated {
        grant: GrantId,
        user: UserId,
        device: DeviceId,
    },
    /// A grant was deactivated.
    GrantRevoked {
        grant: GrantId,
        user: UserId,
        device: DeviceId,
    },

    // ── Rate limiting ─────────────────────────────────────────
    /// A call pushed a window over its admission threshold.
    RateLimitTripped {
        user: UserId,
        operation: String,
        count: u32,
    },
    /// A window was explicitly reset.
    RateWindowReset { user: UserId, operation: String },

    // ── Alerts ────────────────────────────────────────────────
    AlertRaised {
        alert: AlertId,
        priority: AlertPriority,
        title: String,
    },
    AlertEscalated {
        alert: AlertId,
        from: AlertPriority,
        to: AlertPriority,
    },
    AlertResolved {
        alert: AlertId,
    },
    AlertAcknowledged {
        alert: AlertId,
        by: UserId,
    },

    // ── Tokens ────────────────────────────────────────────────
    TokenIssued {
        token: TokenId,
        user: UserId,
        kind: TokenKind,
    },
    TokenUsed {
        token: TokenId,
        source_ip: Option<String>,
    },
    TokenRevoked {
        token: TokenId,
    },

    // ── Policies ──────────────────────────────────────────────
    PolicyRegistered {
        policy: PolicyId,
        name: String,
        kind: PolicyKind,
    },
    PolicyEvaluated {
        policy: PolicyId,
        rule: String,
        allowed: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_roundtrip() {
        let event = AuditEvent::new(
            Some(HomeId::new()),
            AuditPayload::AccessEvaluated {
                user: UserId::new(),
                device: DeviceId::new(),
                operation: "unlock_door".to_string(),
                allowed: false,
                reason: Some("rate_limited".to_string()),
            },
            Utc::now(),
        );

        let json = serde_json::to_string(&event).unwrap();
        let back: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
    }

    #[test]
    fn event_payload_tags() {
        let payload = AuditPayload::RateLimitTripped {
            user: UserId::new(),
            operation: "arm_system".to_string(),
            count: 5,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"event_type\":\"RateLimitTripped\""));
    }
}
