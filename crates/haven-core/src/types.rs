//! Core domain types for the Haven security platform.
//!
//! These types represent the entities the decision core operates on,
//! shared across all Haven services. They are plain serde values; the
//! decision logic that mutates them lives in haven-guard.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ───────────────────────────────────────────────────

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// A home the security system protects. Every grant, alert, and policy belongs to one.
    HomeId
);
id_newtype!(
    /// A user account (resident, guest, or service provider).
    UserId
);
id_newtype!(
    /// A security device (camera, sensor, lock, alarm panel).
    DeviceId
);
id_newtype!(
    /// A named security policy.
    PolicyId
);
id_newtype!(
    /// An access-control grant record.
    GrantId
);
id_newtype!(
    /// A detected security alert.
    AlertId
);
id_newtype!(
    /// A bearer credential record.
    TokenId
);

// ── Enums ─────────────────────────────────────────────────────────

/// Access level attached to a grant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Admin,
    Owner,
    Family,
    Guest,
    Service,
    Emergency,
}

/// Category of a security policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Password,
    Access,
    DataRetention,
    Encryption,
    Network,
    Device,
    Audit,
    Compliance,
}

/// Category of a bearer token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Api,
    Refresh,
    Session,
    Device,
    Emergency,
}

/// What condition an alert reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Fire,
    Gas,
    Intrusion,
    Temperature,
    Motion,
    Door,
    Water,
    System,
    Breach,
    Tamper,
}

/// Alert severity ladder. Declaration order is the escalation order:
/// `Info < Low < Medium < High < Critical < Emergency`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Info,
    Low,
    Medium,
    High,
    Critical,
    Emergency,
}

impl AlertPriority {
    /// The next rung up the ladder, or `None` at the top.
    pub fn next_level(self) -> Option<Self> {
        match self {
            Self::Info => Some(Self::Low),
            Self::Low => Some(Self::Medium),
            Self::Medium => Some(Self::High),
            Self::High => Some(Self::Critical),
            Self::Critical => Some(Self::Emergency),
            Self::Emergency => None,
        }
    }
}

impl std::fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

// ── Policies ──────────────────────────────────────────────────────

/// A named, typed set of security rules.
///
/// A policy is an immutable snapshot: evaluation never mutates it, and
/// changing its rules means replacing the whole rule map and saving a
/// new value, so in-flight evaluations are never pulled out from under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub home: HomeId,
    pub name: String,
    pub kind: PolicyKind,
    /// Rule name to rule definition. Evaluating a name absent from this
    /// map allows by default (see haven-guard's evaluator fail mode).
    pub rules: BTreeMap<String, Rule>,
    pub active: bool,
    pub enforced: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    pub fn new(
        home: HomeId,
        name: impl Into<String>,
        kind: PolicyKind,
        rules: BTreeMap<String, Rule>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PolicyId::new(),
            home,
            name: name.into(),
            kind,
            rules,
            active: true,
            enforced: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One evaluable check inside a policy, tagged by kind at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    /// Every condition must hold (logical AND).
    #[serde(rename = "condition")]
    ConditionList {
        #[serde(default)]
        conditions: Vec<Condition>,
    },
    /// A numeric context field must be at or below the threshold.
    Threshold {
        #[serde(default)]
        field: Option<String>,
        #[serde(default)]
        threshold: f64,
    },
    /// A context field must be a member of the allowed list.
    #[serde(rename = "list")]
    AllowedList {
        #[serde(default)]
        field: Option<String>,
        #[serde(default)]
        allowed_values: Vec<serde_json::Value>,
    },
    /// A rule kind this version does not understand. Evaluates per the
    /// configured fail mode rather than failing to parse.
    #[serde(other)]
    Unknown,
}

/// A single condition inside a [`Rule::ConditionList`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub field: String,
    #[serde(default, rename = "operator")]
    pub op: ConditionOp,
    #[serde(default = "default_condition_value")]
    pub value: serde_json::Value,
}

fn default_condition_value() -> serde_json::Value {
    serde_json::Value::String(String::new())
}

/// Comparison operator for a condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ConditionOp {
    #[default]
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    In,
    /// An operator this version does not understand; never holds.
    Unknown,
}

impl From<String> for ConditionOp {
    fn from(s: String) -> Self {
        match s.as_str() {
            "equals" => Self::Equals,
            "not_equals" => Self::NotEquals,
            "contains" => Self::Contains,
            "greater_than" => Self::GreaterThan,
            "less_than" => Self::LessThan,
            "in" => Self::In,
            _ => Self::Unknown,
        }
    }
}

// ── Access grants ─────────────────────────────────────────────────

/// One user's permission to operate one device in one home.
///
/// Unique per `(home, user, device)`. Never physically deleted; revoking
/// clears `active` and the record stays for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    pub id: GrantId,
    pub home: HomeId,
    pub user: UserId,
    pub device: DeviceId,
    pub level: AccessLevel,
    pub active: bool,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    /// Monotonically non-decreasing usage counter.
    pub access_count: u64,
    /// Opaque to the decision core; interpreted by callers
    /// (time-of-day windows, per-operation caps, and the like).
    pub restrictions: serde_json::Value,
}

impl AccessGrant {
    pub fn new(
        home: HomeId,
        user: UserId,
        device: DeviceId,
        level: AccessLevel,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: GrantId::new(),
            home,
            user,
            device,
            level,
            active: true,
            granted_at: now,
            expires_at: None,
            last_used: None,
            access_count: 0,
            restrictions: serde_json::json!({}),
        }
    }
}

// ── Rate windows ──────────────────────────────────────────────────

/// A counting window for one `(user, operation)` pair.
///
/// Created lazily on first use and never deleted. The counter and the
/// sticky `limited` flag reset only through an explicit window reset;
/// `window_end` is advisory, set by operators, and surfaced to callers
/// as a retry-after hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateWindow {
    pub user: UserId,
    pub operation: String,
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    pub limited: bool,
}

impl RateWindow {
    pub fn new(user: UserId, operation: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user,
            operation: operation.into(),
            count: 0,
            window_start: now,
            window_end: None,
            limited: false,
        }
    }
}

// ── Alerts ────────────────────────────────────────────────────────

/// A detected security condition with severity.
///
/// Priority only moves up the ladder through escalation; resolution is
/// terminal for the active state but the record persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub home: HomeId,
    pub device: Option<DeviceId>,
    pub kind: AlertKind,
    pub priority: AlertPriority,
    pub title: String,
    pub message: String,
    pub location: Option<String>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<UserId>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        home: HomeId,
        device: Option<DeviceId>,
        kind: AlertKind,
        priority: AlertPriority,
        title: impl Into<String>,
        message: impl Into<String>,
        location: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            home,
            device,
            kind,
            priority,
            title: title.into(),
            message: message.into(),
            location,
            resolved: false,
            resolved_at: None,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            created_at: now,
        }
    }
}

// ── Security tokens ───────────────────────────────────────────────

/// A bearer credential.
///
/// The `value` is an opaque random string, globally unique, compared
/// only for exact equality. Once revoked, `active` never returns to true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityToken {
    pub id: TokenId,
    pub user: UserId,
    pub kind: TokenKind,
    pub value: String,
    /// Sealed payload envelope, if one was attached. The encryption key
    /// is returned to the caller at sealing time and never stored here.
    pub encrypted_data: Option<String>,
    pub active: bool,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_fingerprint: Option<String>,
}
