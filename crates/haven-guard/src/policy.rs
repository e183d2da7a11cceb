//! Policy rule evaluation.
//!
//! `evaluate_rule` is a pure function over an immutable policy snapshot
//! and a context mapping: no side effects, no I/O, and deterministic for
//! identical inputs, so every allow/deny is reproducible from the audit
//! trail.
//!
//! Lookups that miss (unknown rule name, unknown rule kind) resolve per
//! the configured [`FailMode`]. The default is fail-open, which callers
//! should treat as a security-relevant setting, not a convenience.

use serde::Deserialize;
use serde_json::Value;

use haven_core::types::{Condition, ConditionOp, Policy, PolicyId, Rule};

use crate::error::{GuardError, Result};

/// The context mapping a rule is evaluated against.
pub type Context = serde_json::Map<String, Value>;

/// What an unknown rule name or rule kind evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Missing rules allow.
    #[default]
    Open,
    /// Missing rules deny.
    Closed,
}

impl FailMode {
    fn default_verdict(self) -> bool {
        matches!(self, FailMode::Open)
    }
}

/// Evaluate one named rule of a policy against a context.
///
/// Returns `Ok(true)` when the policy holds. A non-numeric value fed to
/// a numeric comparison is a `Validation` error, never a panic.
pub fn evaluate_rule(
    policy: &Policy,
    rule_name: &str,
    context: &Context,
    fail_mode: FailMode,
) -> Result<bool> {
    let Some(rule) = policy.rules.get(rule_name) else {
        return Ok(fail_mode.default_verdict());
    };

    match rule {
        Rule::ConditionList { conditions } => {
            for condition in conditions {
                if !evaluate_condition(condition, context)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Rule::Threshold { field, threshold } => {
            // An unspecified field falls back to the literal key "0",
            // which real contexts never contain, so the value coerces
            // to zero. Kept for compatibility with existing policies.
            let key = field.as_deref().unwrap_or("0");
            let value = match context.get(key) {
                Some(v) => coerce_number(v)?,
                None => 0.0,
            };
            Ok(value <= *threshold)
        }
        Rule::AllowedList {
            field,
            allowed_values,
        } => {
            let key = field.as_deref().unwrap_or("");
            let current = context.get(key).cloned().unwrap_or(Value::Null);
            Ok(allowed_values.contains(&current))
        }
        Rule::Unknown => Ok(fail_mode.default_verdict()),
    }
}

/// A policy rule that denied an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDenial {
    pub policy: PolicyId,
    pub policy_name: String,
    pub rule: String,
}

/// Evaluate a rule name across a set of policies, skipping inactive and
/// unenforced ones, and report the first policy that denies.
pub fn first_denial(
    policies: &[Policy],
    rule_name: &str,
    context: &Context,
    fail_mode: FailMode,
) -> Result<Option<RuleDenial>> {
    for policy in policies {
        if !policy.active || !policy.enforced {
            continue;
        }
        if !evaluate_rule(policy, rule_name, context, fail_mode)? {
            return Ok(Some(RuleDenial {
                policy: policy.id,
                policy_name: policy.name.clone(),
                rule: rule_name.to_string(),
            }));
        }
    }
    Ok(None)
}

fn evaluate_condition(condition: &Condition, context: &Context) -> Result<bool> {
    // A field absent from the context fails the condition; it does not
    // fall through to the rule-level fail mode.
    let Some(current) = context.get(&condition.field) else {
        return Ok(false);
    };

    match condition.op {
        ConditionOp::Equals => Ok(current == &condition.value),
        ConditionOp::NotEquals => Ok(current != &condition.value),
        ConditionOp::Contains => {
            let needle = text_form(&condition.value).to_lowercase();
            let haystack = text_form(current).to_lowercase();
            Ok(haystack.contains(&needle))
        }
        ConditionOp::GreaterThan => Ok(coerce_number(current)? > coerce_number(&condition.value)?),
        ConditionOp::LessThan => Ok(coerce_number(current)? < coerce_number(&condition.value)?),
        ConditionOp::In => match &condition.value {
            Value::Array(members) => Ok(members.contains(current)),
            _ => Ok(false),
        },
        ConditionOp::Unknown => Ok(false),
    }
}

/// String form of a scalar for substring matching. Strings are used
/// as-is; other values use their JSON rendering.
fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric coercion for threshold and ordering comparisons: JSON
/// numbers, numeric strings, and booleans coerce; anything else is a
/// validation failure.
fn coerce_number(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| GuardError::Validation(format!("number out of range: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| GuardError::Validation(format!("not a number: {s:?}"))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(GuardError::Validation(format!(
            "cannot compare {other} numerically"
        ))),
    }
}
