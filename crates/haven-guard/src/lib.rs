//! haven-guard: The security decision core for the Haven platform.
//!
//! Composes the policy rule evaluator, access-control tracker, rate
//! limiter, alert escalation ladder, and token lifecycle manager behind
//! the [`SecurityGate`] facade that request handlers call. The gate
//! owns no I/O of its own: persistence goes through a [`DecisionStore`],
//! audit records go to an [`audit::AuditSink`], and notifications go to
//! an [`audit::Notifier`], the latter two best-effort.
//!
//! Denial is a value, not an error: every decision operation returns
//! which sub-check denied so the caller can attach it to its own audit
//! context.

pub mod access;
pub mod alert;
pub mod audit;
pub mod config;
pub mod error;
pub mod policy;
pub mod ratelimit;
pub mod store;
pub mod token;
pub mod verify;

pub use config::GuardConfig;
pub use error::{GuardError, Result};
pub use policy::{Context, FailMode};
pub use ratelimit::Verdict;
pub use store::{DecisionStore, GrantKey, MemoryStore, WindowKey};
pub use token::{PayloadKey, TokenMetadata};

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::Value;

use haven_core::events::{AuditEvent, AuditPayload};
use haven_core::types::{
    AccessGrant, Alert, AlertId, AlertPriority, DeviceId, HomeId, Policy, PolicyId, PolicyKind,
    RateWindow, SecurityToken, TokenId, TokenKind, UserId,
};

use crate::audit::{AuditSink, NoopNotifier, Notifier, TracingAuditSink};

/// A device-operation request to be evaluated as one unit of work.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub home: HomeId,
    pub user: UserId,
    pub device: DeviceId,
    /// Doubles as the rate-limit operation name and the policy rule
    /// name looked up in the home's access policies.
    pub operation: String,
    /// Caller-supplied evaluation context. The gate injects `user`,
    /// `device`, `operation`, and `access_level` over it; those keys
    /// cannot be spoofed from outside.
    pub context: Context,
}

impl AccessRequest {
    pub fn new(home: HomeId, user: UserId, device: DeviceId, operation: impl Into<String>) -> Self {
        Self {
            home,
            user,
            device,
            operation: operation.into(),
            context: Context::new(),
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

/// Outcome of [`SecurityGate::evaluate_access`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum AccessDecision {
    Allowed {
        /// The grant's usage counter after this access was recorded.
        access_count: u64,
    },
    Denied {
        reason: DenialReason,
    },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed { .. })
    }
}

/// Which sub-check denied an access request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    NoGrant,
    GrantInactive,
    GrantExpired,
    RateLimited {
        reset_at: Option<DateTime<Utc>>,
    },
    PolicyRule {
        policy: String,
        rule: String,
    },
}

impl DenialReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoGrant => "no_grant",
            Self::GrantInactive => "grant_inactive",
            Self::GrantExpired => "grant_expired",
            Self::RateLimited { .. } => "rate_limited",
            Self::PolicyRule { .. } => "policy_rule",
        }
    }
}

/// The security decision facade.
///
/// Checks run in a fixed order and short-circuit on the first denial:
/// grant validity, then rate admission, then policy rules. The rate
/// counter moves even when a later policy check denies; an attempt is
/// an attempt.
pub struct SecurityGate<S: DecisionStore> {
    store: S,
    config: GuardConfig,
    audit: Box<dyn AuditSink>,
    notifier: Box<dyn Notifier>,
}

impl<S: DecisionStore> SecurityGate<S> {
    /// Create a gate with default configuration, a tracing audit sink,
    /// and no notification delivery.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: GuardConfig::default(),
            audit: Box::new(TracingAuditSink),
            notifier: Box::new(NoopNotifier),
        }
    }

    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_audit_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Box::new(sink);
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Access decisions ──────────────────────────────────────

    /// Can this user run this operation on this device right now?
    pub fn evaluate_access(
        &self,
        request: &AccessRequest,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision> {
        let decision = self.evaluate_access_inner(request, now)?;

        let reason = match &decision {
            AccessDecision::Allowed { .. } => None,
            AccessDecision::Denied { reason } => Some(reason.label().to_string()),
        };
        self.emit(AuditEvent::new(
            Some(request.home),
            AuditPayload::AccessEvaluated {
                user: request.user,
                device: request.device,
                operation: request.operation.clone(),
                allowed: decision.is_allowed(),
                reason,
            },
            now,
        ));

        Ok(decision)
    }

    fn evaluate_access_inner(
        &self,
        request: &AccessRequest,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision> {
        let key = (request.home, request.user, request.device);

        let Some(grant) = self.store.grant(&key)? else {
            return Ok(AccessDecision::Denied {
                reason: DenialReason::NoGrant,
            });
        };
        if !grant.active {
            return Ok(AccessDecision::Denied {
                reason: DenialReason::GrantInactive,
            });
        }
        if !access::is_valid(&grant, now) {
            return Ok(AccessDecision::Denied {
                reason: DenialReason::GrantExpired,
            });
        }

        if let Verdict::Limited { reset_at } = self.admit(request.user, &request.operation, now)? {
            return Ok(AccessDecision::Denied {
                reason: DenialReason::RateLimited { reset_at },
            });
        }

        let policies: Vec<Policy> = self
            .store
            .policies_for_home(&request.home)?
            .into_iter()
            .filter(|p| p.kind == PolicyKind::Access)
            .collect();
        let mut context = request.context.clone();
        context.insert("user".to_string(), Value::String(request.user.to_string()));
        context.insert(
            "device".to_string(),
            Value::String(request.device.to_string()),
        );
        context.insert(
            "operation".to_string(),
            Value::String(request.operation.clone()),
        );
        context.insert(
            "access_level".to_string(),
            serde_json::to_value(grant.level)
                .map_err(|e| GuardError::Validation(e.to_string()))?,
        );
        if let Some(denial) = policy::first_denial(
            &policies,
            &request.operation,
            &context,
            self.config.fail_mode,
        )? {
            return Ok(AccessDecision::Denied {
                reason: DenialReason::PolicyRule {
                    policy: denial.policy_name,
                    rule: denial.rule,
                },
            });
        }

        let updated = self
            .store
            .update_grant(&key, &mut |g| access::record_access(g, now))?;
        Ok(AccessDecision::Allowed {
            access_count: updated.access_count,
        })
    }

    // ── Rate limiting ─────────────────────────────────────────

    /// Count one call against the user's window for this operation and
    /// report whether it is admitted.
    pub fn check_rate(
        &self,
        user: UserId,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<Verdict> {
        self.admit(user, operation, now)
    }

    /// Reopen a limited window. Meant for an external sweeper or an
    /// explicit administrative action; windows never expire on their own.
    pub fn reset_rate_window(
        &self,
        user: UserId,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<RateWindow> {
        let key = (user, operation.to_string());
        let seed = RateWindow::new(user, operation, now);
        let window = self
            .store
            .update_window(&key, seed, &mut |w| ratelimit::reset(w, now))?;
        self.emit(AuditEvent::new(
            None,
            AuditPayload::RateWindowReset {
                user,
                operation: operation.to_string(),
            },
            now,
        ));
        Ok(window)
    }

    fn admit(&self, user: UserId, operation: &str, now: DateTime<Utc>) -> Result<Verdict> {
        let key = (user, operation.to_string());
        let seed = RateWindow::new(user, operation, now);
        let mut tripped = false;
        let window = self.store.update_window(&key, seed, &mut |w| {
            let was_limited = w.limited;
            let _ = ratelimit::admit(w, &self.config.rate_limit);
            tripped = !was_limited && w.limited;
        })?;

        if tripped {
            tracing::warn!(user = %user, operation, count = window.count, "rate limit tripped");
            self.emit(AuditEvent::new(
                None,
                AuditPayload::RateLimitTripped {
                    user,
                    operation: operation.to_string(),
                    count: window.count,
                },
                now,
            ));
        }

        Ok(ratelimit::verdict(&window, &self.config.rate_limit))
    }

    // ── Access grants ─────────────────────────────────────────

    /// Persist a new grant. Fails with a conflict when the
    /// (home, user, device) triple already has one.
    pub fn grant_access(&self, grant: AccessGrant, now: DateTime<Utc>) -> Result<AccessGrant> {
        self.store.insert_grant(&grant)?;
        self.emit(AuditEvent::new(
            Some(grant.home),
            AuditPayload::GrantCreated {
                grant: grant.id,
                user: grant.user,
                device: grant.device,
            },
            now,
        ));
        Ok(grant)
    }

    /// Deactivate a grant; the record persists for the audit trail.
    pub fn revoke_grant(&self, key: &GrantKey, now: DateTime<Utc>) -> Result<AccessGrant> {
        let updated = self.store.update_grant(key, &mut access::revoke)?;
        self.emit(AuditEvent::new(
            Some(updated.home),
            AuditPayload::GrantRevoked {
                grant: updated.id,
                user: updated.user,
                device: updated.device,
            },
            now,
        ));
        Ok(updated)
    }

    // ── Alerts ────────────────────────────────────────────────

    /// Record a detected alert. Critical and emergency alerts are
    /// pushed to the notifier, best-effort.
    pub fn raise_alert(&self, alert: Alert, now: DateTime<Utc>) -> Result<Alert> {
        self.store.save_alert(&alert)?;
        self.emit(AuditEvent::new(
            Some(alert.home),
            AuditPayload::AlertRaised {
                alert: alert.id,
                priority: alert.priority,
                title: alert.title.clone(),
            },
            now,
        ));
        if alert.priority >= AlertPriority::Critical {
            self.push_notification(&alert);
        }
        Ok(alert)
    }

    /// Escalate one step up the ladder. Returns the updated alert and
    /// whether anything changed (false at emergency).
    pub fn escalate_alert(&self, id: &AlertId, now: DateTime<Utc>) -> Result<(Alert, bool)> {
        let mut escalated = false;
        let mut previous = None;
        let updated = self.store.update_alert(id, &mut |a| {
            previous = Some(a.priority);
            escalated = alert::escalate(a);
        })?;

        if escalated {
            self.emit(AuditEvent::new(
                Some(updated.home),
                AuditPayload::AlertEscalated {
                    alert: *id,
                    from: previous.unwrap_or(updated.priority),
                    to: updated.priority,
                },
                now,
            ));
            if updated.priority >= AlertPriority::Critical {
                self.push_notification(&updated);
            }
        }
        Ok((updated, escalated))
    }

    /// Mark resolved. Idempotent: a second call changes nothing and
    /// emits nothing.
    pub fn resolve_alert(&self, id: &AlertId, now: DateTime<Utc>) -> Result<Alert> {
        let mut was_resolved = false;
        let updated = self.store.update_alert(id, &mut |a| {
            was_resolved = a.resolved;
            alert::resolve(a, now);
        })?;
        if !was_resolved {
            self.emit(AuditEvent::new(
                Some(updated.home),
                AuditPayload::AlertResolved { alert: *id },
                now,
            ));
        }
        Ok(updated)
    }

    /// Record that a user has seen the alert. Idempotent.
    pub fn acknowledge_alert(
        &self,
        id: &AlertId,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<Alert> {
        let mut was_acknowledged = false;
        let updated = self.store.update_alert(id, &mut |a| {
            was_acknowledged = a.acknowledged;
            alert::acknowledge(a, user, now);
        })?;
        if !was_acknowledged {
            self.emit(AuditEvent::new(
                Some(updated.home),
                AuditPayload::AlertAcknowledged { alert: *id, by: user },
                now,
            ));
        }
        Ok(updated)
    }

    // ── Tokens ────────────────────────────────────────────────

    pub fn issue_token(
        &self,
        user: UserId,
        kind: TokenKind,
        metadata: TokenMetadata,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<SecurityToken> {
        let token = token::issue(user, kind, metadata, expires_at, now);
        self.store.insert_token(&token)?;
        self.emit(AuditEvent::new(
            None,
            AuditPayload::TokenIssued {
                token: token.id,
                user,
                kind,
            },
            now,
        ));
        Ok(token)
    }

    /// Whether a presented bearer value maps to a currently valid
    /// token. Unknown values are simply invalid, not an error.
    pub fn validate_token(&self, value: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .store
            .token_by_value(value)?
            .map(|t| token::is_valid(&t, now))
            .unwrap_or(false))
    }

    pub fn record_token_usage(
        &self,
        id: &TokenId,
        now: DateTime<Utc>,
        source_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<SecurityToken> {
        let updated = self.store.update_token(id, &mut |t| {
            token::record_usage(t, now, source_ip.clone(), user_agent.clone());
        })?;
        self.emit(AuditEvent::new(
            None,
            AuditPayload::TokenUsed {
                token: *id,
                source_ip: updated.source_ip.clone(),
            },
            now,
        ));
        Ok(updated)
    }

    pub fn revoke_token(&self, id: &TokenId, now: DateTime<Utc>) -> Result<SecurityToken> {
        let updated = self.store.update_token(id, &mut token::revoke)?;
        self.emit(AuditEvent::new(
            None,
            AuditPayload::TokenRevoked { token: *id },
            now,
        ));
        Ok(updated)
    }

    /// Seal a payload onto a stored token under a fresh key, which is
    /// returned to the caller and kept nowhere else.
    pub fn seal_token_payload(&self, id: &TokenId, payload: &Value) -> Result<PayloadKey> {
        let (stored, key) = token::seal(payload, &mut OsRng)?;
        self.store
            .update_token(id, &mut |t| t.encrypted_data = Some(stored.clone()))?;
        Ok(key)
    }

    /// Open a token's sealed payload with the caller-held key.
    pub fn open_token_payload(&self, id: &TokenId, key: &PayloadKey) -> Result<Value> {
        let stored = self.store.token(id)?.ok_or_else(|| GuardError::NotFound {
            entity: "token",
            id: id.to_string(),
        })?;
        token::decrypt_payload(&stored, key)
    }

    // ── Policies ──────────────────────────────────────────────

    /// Save a policy snapshot. Replacing an existing id swaps the whole
    /// rule map; in-flight evaluations keep the snapshot they loaded.
    pub fn register_policy(&self, policy: Policy, now: DateTime<Utc>) -> Result<()> {
        self.store.save_policy(&policy)?;
        self.emit(AuditEvent::new(
            Some(policy.home),
            AuditPayload::PolicyRegistered {
                policy: policy.id,
                name: policy.name.clone(),
                kind: policy.kind,
            },
            now,
        ));
        Ok(())
    }

    /// Evaluate one named rule of one policy directly.
    pub fn evaluate_policy(
        &self,
        id: &PolicyId,
        rule_name: &str,
        context: &Context,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let policy = self.store.policy(id)?.ok_or_else(|| GuardError::NotFound {
            entity: "policy",
            id: id.to_string(),
        })?;
        let allowed = policy::evaluate_rule(&policy, rule_name, context, self.config.fail_mode)?;
        self.emit(AuditEvent::new(
            Some(policy.home),
            AuditPayload::PolicyEvaluated {
                policy: *id,
                rule: rule_name.to_string(),
                allowed,
            },
            now,
        ));
        Ok(allowed)
    }

    // ── Collaborators ─────────────────────────────────────────

    fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event) {
            tracing::warn!(error = %e, "audit sink rejected event");
        }
    }

    fn push_notification(&self, alert: &Alert) {
        let subject = format!("Security alert: {}", alert.title);
        if let Err(e) = self.notifier.notify(&alert.home, &subject, &alert.message) {
            tracing::warn!(alert = %alert.id, error = %e, "notification delivery failed");
        }
    }
}
