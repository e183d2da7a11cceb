//! Storage seam — trait + in-memory implementation.
//!
//! The decision core never talks to a database directly; it goes
//! through [`DecisionStore`], whose update methods are the atomic
//! "load, mutate, save" primitive the hot paths need (grant usage,
//! window admission, token usage and revocation). Implementations must
//! serialize updates per key while letting different keys proceed
//! independently.
//!
//! [`MemoryStore`] is the in-process reference implementation: an outer
//! map lock held just long enough to resolve the per-entity cell, and a
//! per-cell mutex for the mutation itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use haven_core::types::{
    AccessGrant, Alert, AlertId, DeviceId, HomeId, Policy, PolicyId, RateWindow, SecurityToken,
    TokenId, UserId,
};

use crate::error::{GuardError, Result};

/// Natural identity of an access grant.
pub type GrantKey = (HomeId, UserId, DeviceId);

/// Natural identity of a rate window.
pub type WindowKey = (UserId, String);

/// Persistence collaborator for the decision core.
///
/// External implementations map these calls onto their database and
/// report failures as [`GuardError::Store`].
pub trait DecisionStore: Send + Sync {
    // ── Policies (read-mostly, replaced whole) ────────────────
    fn policy(&self, id: &PolicyId) -> Result<Option<Policy>>;
    fn save_policy(&self, policy: &Policy) -> Result<()>;
    fn policies_for_home(&self, home: &HomeId) -> Result<Vec<Policy>>;

    // ── Access grants ─────────────────────────────────────────
    fn grant(&self, key: &GrantKey) -> Result<Option<AccessGrant>>;
    /// Fails with [`GuardError::DuplicateGrant`] when the triple
    /// already has a grant, active or not.
    fn insert_grant(&self, grant: &AccessGrant) -> Result<()>;
    /// Atomically mutate an existing grant; returns the post-mutation
    /// snapshot.
    fn update_grant(
        &self,
        key: &GrantKey,
        mutate: &mut dyn FnMut(&mut AccessGrant),
    ) -> Result<AccessGrant>;

    // ── Rate windows (created lazily from the seed) ───────────
    fn window(&self, key: &WindowKey) -> Result<Option<RateWindow>>;
    /// Atomically mutate the window, creating it from `seed` when the
    /// key has never been seen; returns the post-mutation snapshot.
    fn update_window(
        &self,
        key: &WindowKey,
        seed: RateWindow,
        mutate: &mut dyn FnMut(&mut RateWindow),
    ) -> Result<RateWindow>;

    // ── Alerts ────────────────────────────────────────────────
    fn alert(&self, id: &AlertId) -> Result<Option<Alert>>;
    fn save_alert(&self, alert: &Alert) -> Result<()>;
    fn update_alert(&self, id: &AlertId, mutate: &mut dyn FnMut(&mut Alert)) -> Result<Alert>;

    // ── Tokens ────────────────────────────────────────────────
    fn token(&self, id: &TokenId) -> Result<Option<SecurityToken>>;
    fn token_by_value(&self, value: &str) -> Result<Option<SecurityToken>>;
    /// Fails with [`GuardError::TokenCollision`] when the opaque value
    /// is already taken.
    fn insert_token(&self, token: &SecurityToken) -> Result<()>;
    fn update_token(
        &self,
        id: &TokenId,
        mutate: &mut dyn FnMut(&mut SecurityToken),
    ) -> Result<SecurityToken>;
}

const POISONED: &str = "store lock poisoned";

type Cell<T> = Arc<Mutex<T>>;

/// In-memory store. Never fails; useful for tests, simulations, and
/// single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    policies: RwLock<HashMap<PolicyId, Policy>>,
    grants: RwLock<HashMap<GrantKey, Cell<AccessGrant>>>,
    windows: RwLock<HashMap<WindowKey, Cell<RateWindow>>>,
    alerts: RwLock<HashMap<AlertId, Cell<Alert>>>,
    tokens: RwLock<HashMap<TokenId, Cell<SecurityToken>>>,
    // Lock ordering: token_values before tokens.
    token_values: RwLock<HashMap<String, TokenId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell_of<K, V>(map: &RwLock<HashMap<K, Cell<V>>>, key: &K) -> Option<Cell<V>>
    where
        K: std::hash::Hash + Eq,
    {
        map.read().expect(POISONED).get(key).cloned()
    }
}

fn grant_key_label(key: &GrantKey) -> String {
    format!("{}/{}/{}", key.0, key.1, key.2)
}

impl DecisionStore for MemoryStore {
    fn policy(&self, id: &PolicyId) -> Result<Option<Policy>> {
        Ok(self.policies.read().expect(POISONED).get(id).cloned())
    }

    fn save_policy(&self, policy: &Policy) -> Result<()> {
        self.policies
            .write()
            .expect(POISONED)
            .insert(policy.id, policy.clone());
        Ok(())
    }

    fn policies_for_home(&self, home: &HomeId) -> Result<Vec<Policy>> {
        let mut matching: Vec<Policy> = self
            .policies
            .read()
            .expect(POISONED)
            .values()
            .filter(|p| p.home == *home)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }

    fn grant(&self, key: &GrantKey) -> Result<Option<AccessGrant>> {
        Ok(Self::cell_of(&self.grants, key).map(|cell| cell.lock().expect(POISONED).clone()))
    }

    fn insert_grant(&self, grant: &AccessGrant) -> Result<()> {
        let key = (grant.home, grant.user, grant.device);
        let mut grants = self.grants.write().expect(POISONED);
        if grants.contains_key(&key) {
            return Err(GuardError::DuplicateGrant);
        }
        grants.insert(key, Arc::new(Mutex::new(grant.clone())));
        Ok(())
    }

    fn update_grant(
        &self,
        key: &GrantKey,
        mutate: &mut dyn FnMut(&mut AccessGrant),
    ) -> Result<AccessGrant> {
        let cell = Self::cell_of(&self.grants, key).ok_or_else(|| GuardError::NotFound {
            entity: "access grant",
            id: grant_key_label(key),
        })?;
        let mut grant = cell.lock().expect(POISONED);
        mutate(&mut grant);
        Ok(grant.clone())
    }

    fn window(&self, key: &WindowKey) -> Result<Option<RateWindow>> {
        Ok(Self::cell_of(&self.windows, key).map(|cell| cell.lock().expect(POISONED).clone()))
    }

    fn update_window(
        &self,
        key: &WindowKey,
        seed: RateWindow,
        mutate: &mut dyn FnMut(&mut RateWindow),
    ) -> Result<RateWindow> {
        let cell = match Self::cell_of(&self.windows, key) {
            Some(cell) => cell,
            None => self
                .windows
                .write()
                .expect(POISONED)
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(seed)))
                .clone(),
        };
        let mut window = cell.lock().expect(POISONED);
        mutate(&mut window);
        Ok(window.clone())
    }

    fn alert(&self, id: &AlertId) -> Result<Option<Alert>> {
        Ok(Self::cell_of(&self.alerts, id).map(|cell| cell.lock().expect(POISONED).clone()))
    }

    fn save_alert(&self, alert: &Alert) -> Result<()> {
        self.alerts
            .write()
            .expect(POISONED)
            .insert(alert.id, Arc::new(Mutex::new(alert.clone())));
        Ok(())
    }

    fn update_alert(&self, id: &AlertId, mutate: &mut dyn FnMut(&mut Alert)) -> Result<Alert> {
        let cell = Self::cell_of(&self.alerts, id).ok_or_else(|| GuardError::NotFound {
            entity: "alert",
            id: id.to_string(),
        })?;
        let mut alert = cell.lock().expect(POISONED);
        mutate(&mut alert);
        Ok(alert.clone())
    }

    fn token(&self, id: &TokenId) -> Result<Option<SecurityToken>> {
        Ok(Self::cell_of(&self.tokens, id).map(|cell| cell.lock().expect(POISONED).clone()))
    }

    fn token_by_value(&self, value: &str) -> Result<Option<SecurityToken>> {
        let id = match self.token_values.read().expect(POISONED).get(value) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.token(&id)
    }

    fn insert_token(&self, token: &SecurityToken) -> Result<()> {
        let mut values = self.token_values.write().expect(POISONED);
        if values.contains_key(&token.value) {
            return Err(GuardError::TokenCollision);
        }
        values.insert(token.value.clone(), token.id);
        self.tokens
            .write()
            .expect(POISONED)
            .insert(token.id, Arc::new(Mutex::new(token.clone())));
        Ok(())
    }

    fn update_token(
        &self,
        id: &TokenId,
        mutate: &mut dyn FnMut(&mut SecurityToken),
    ) -> Result<SecurityToken> {
        let cell = Self::cell_of(&self.tokens, id).ok_or_else(|| GuardError::NotFound {
            entity: "token",
            id: id.to_string(),
        })?;
        let mut token = cell.lock().expect(POISONED);
        mutate(&mut token);
        Ok(token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use haven_core::types::{AccessLevel, TokenKind};

    use crate::token::{issue, TokenMetadata};

    #[test]
    fn duplicate_grant_is_a_conflict() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let grant =
            AccessGrant::new(HomeId::new(), UserId::new(), DeviceId::new(), AccessLevel::Guest, now);

        store.insert_grant(&grant).unwrap();

        let mut again = grant.clone();
        again.id = haven_core::types::GrantId::new();
        assert!(matches!(
            store.insert_grant(&again).unwrap_err(),
            GuardError::DuplicateGrant
        ));
    }

    #[test]
    fn update_missing_grant_is_not_found() {
        let store = MemoryStore::new();
        let key = (HomeId::new(), UserId::new(), DeviceId::new());
        let err = store.update_grant(&key, &mut |_| {}).unwrap_err();
        assert!(matches!(err, GuardError::NotFound { entity: "access grant", .. }));
    }

    #[test]
    fn window_is_created_lazily_from_the_seed() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = UserId::new();
        let key = (user, "unlock_door".to_string());

        assert!(store.window(&key).unwrap().is_none());

        let seed = RateWindow::new(user, "unlock_door", now);
        let snapshot = store
            .update_window(&key, seed, &mut |w| w.count += 1)
            .unwrap();
        assert_eq!(snapshot.count, 1);

        // Second update reuses the existing window, not a new seed.
        let seed = RateWindow::new(user, "unlock_door", now);
        let snapshot = store
            .update_window(&key, seed, &mut |w| w.count += 1)
            .unwrap();
        assert_eq!(snapshot.count, 2);
    }

    #[test]
    fn token_value_collision_is_rejected() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let token = issue(UserId::new(), TokenKind::Api, TokenMetadata::default(), None, now);

        store.insert_token(&token).unwrap();

        let mut clash = issue(UserId::new(), TokenKind::Api, TokenMetadata::default(), None, now);
        clash.value = token.value.clone();
        assert!(matches!(
            store.insert_token(&clash).unwrap_err(),
            GuardError::TokenCollision
        ));
    }

    #[test]
    fn token_lookup_by_value() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let token = issue(UserId::new(), TokenKind::Session, TokenMetadata::default(), None, now);
        store.insert_token(&token).unwrap();

        let found = store.token_by_value(&token.value).unwrap().unwrap();
        assert_eq!(found.id, token.id);
        assert!(store.token_by_value("no-such-value").unwrap().is_none());
    }

    #[test]
    fn policies_listed_per_home_in_creation_order() {
        let store = MemoryStore::new();
        let home = HomeId::new();
        let now = Utc::now();

        let first = Policy::new(
            home,
            "a",
            haven_core::types::PolicyKind::Access,
            Default::default(),
            now,
        );
        let second = Policy::new(
            home,
            "b",
            haven_core::types::PolicyKind::Access,
            Default::default(),
            now + chrono::Duration::seconds(1),
        );
        let elsewhere = Policy::new(
            HomeId::new(),
            "c",
            haven_core::types::PolicyKind::Access,
            Default::default(),
            now,
        );

        store.save_policy(&second).unwrap();
        store.save_policy(&first).unwrap();
        store.save_policy(&elsewhere).unwrap();

        let listed = store.policies_for_home(&home).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }
}
