//! Bearer token lifecycle: issuance, payload sealing, validity, usage,
//! and revocation.
//!
//! Token values come from a CSPRNG with 384 bits of entropy, encoded to
//! the url-safe base64 alphabet, so collisions are cryptographically
//! negligible (the store still enforces uniqueness on insert).
//!
//! Payload sealing generates a fresh AES-256-GCM key per call and hands
//! it back to the caller without persisting it anywhere. That is the
//! contract, not an oversight: the caller owns key custody, and a lost
//! key makes the sealed payload permanently unrecoverable.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::{Zeroize, ZeroizeOnDrop};

use haven_core::types::{SecurityToken, TokenId, TokenKind, UserId};

use crate::error::{GuardError, Result};

/// Entropy behind each token value. 48 bytes encode to 64 characters.
pub const TOKEN_VALUE_BYTES: usize = 48;

/// Request metadata captured at issuance and on each use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_fingerprint: Option<String>,
}

/// A one-shot symmetric key returned by payload sealing.
///
/// Never persisted by this crate; zeroized on drop. Callers that need
/// custody can export the raw bytes and re-import them later.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PayloadKey([u8; 32]);

impl PayloadKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for PayloadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PayloadKey(..)")
    }
}

/// The stored envelope: nonce and ciphertext, base64-encoded.
#[derive(Serialize, Deserialize)]
struct SealedEnvelope {
    nonce: String,
    ciphertext: String,
}

/// Issue a new token for a user, active and unexpiring unless the
/// caller supplies an expiry. Uses the process CSPRNG.
pub fn issue(
    user: UserId,
    kind: TokenKind,
    metadata: TokenMetadata,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SecurityToken {
    issue_with_rng(&mut OsRng, user, kind, metadata, expires_at, now)
}

/// Issue with an injected RNG.
pub fn issue_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
    user: UserId,
    kind: TokenKind,
    metadata: TokenMetadata,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SecurityToken {
    let mut raw = [0u8; TOKEN_VALUE_BYTES];
    rng.fill_bytes(&mut raw);

    SecurityToken {
        id: TokenId::new(),
        user,
        kind,
        value: URL_SAFE_NO_PAD.encode(raw),
        encrypted_data: None,
        active: true,
        issued_at: now,
        expires_at,
        last_used: None,
        source_ip: metadata.source_ip,
        user_agent: metadata.user_agent,
        device_fingerprint: metadata.device_fingerprint,
    }
}

/// Seal a payload under a fresh key. Returns the stored envelope string
/// and the key; the caller keeps the key.
pub(crate) fn seal<R: RngCore + CryptoRng>(
    plaintext: &Value,
    rng: &mut R,
) -> Result<(String, PayloadKey)> {
    let mut key_bytes = [0u8; 32];
    rng.fill_bytes(&mut key_bytes);
    let mut nonce_bytes = [0u8; 12];
    rng.fill_bytes(&mut nonce_bytes);

    let key: Key<Aes256Gcm> = key_bytes.into();
    let cipher = Aes256Gcm::new(&key);
    let serialized =
        serde_json::to_vec(plaintext).map_err(|e| GuardError::Validation(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), serialized.as_slice())
        .map_err(|_| GuardError::Crypto)?;

    let envelope = SealedEnvelope {
        nonce: STANDARD.encode(nonce_bytes),
        ciphertext: STANDARD.encode(ciphertext),
    };
    let stored =
        serde_json::to_string(&envelope).map_err(|e| GuardError::Validation(e.to_string()))?;

    Ok((stored, PayloadKey(key_bytes)))
}

/// Encrypt a payload onto the token and return the fresh key.
pub fn encrypt_payload<R: RngCore + CryptoRng>(
    token: &mut SecurityToken,
    plaintext: &Value,
    rng: &mut R,
) -> Result<PayloadKey> {
    let (stored, key) = seal(plaintext, rng)?;
    token.encrypted_data = Some(stored);
    Ok(key)
}

/// Decrypt the token's sealed payload.
///
/// Every failure path (no payload, malformed envelope, wrong key,
/// tampered ciphertext) returns the same uniform error; the cause is
/// logged at debug level only, so the caller cannot be used as an
/// oracle for which part was wrong.
pub fn decrypt_payload(token: &SecurityToken, key: &PayloadKey) -> Result<Value> {
    let stored = token
        .encrypted_data
        .as_deref()
        .ok_or_else(|| crypto_failure(token.id, "no sealed payload"))?;

    let envelope: SealedEnvelope =
        serde_json::from_str(stored).map_err(|_| crypto_failure(token.id, "malformed envelope"))?;
    let nonce_bytes = STANDARD
        .decode(&envelope.nonce)
        .map_err(|_| crypto_failure(token.id, "malformed nonce"))?;
    let ciphertext = STANDARD
        .decode(&envelope.ciphertext)
        .map_err(|_| crypto_failure(token.id, "malformed ciphertext"))?;
    if nonce_bytes.len() != 12 {
        return Err(crypto_failure(token.id, "bad nonce length"));
    }

    let gcm_key: Key<Aes256Gcm> = (*key.as_bytes()).into();
    let cipher = Aes256Gcm::new(&gcm_key);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|_| crypto_failure(token.id, "authentication failed"))?;

    serde_json::from_slice(&plaintext).map_err(|_| crypto_failure(token.id, "unparseable payload"))
}

fn crypto_failure(token: TokenId, cause: &str) -> GuardError {
    tracing::debug!(token = %token, cause, "payload decryption failed");
    GuardError::Crypto
}

/// Whether the token admits use at `now`: active and, when an expiry is
/// set, not past it. Same shape as grant validity.
pub fn is_valid(token: &SecurityToken, now: DateTime<Utc>) -> bool {
    if !token.active {
        return false;
    }
    if let Some(expires_at) = token.expires_at {
        if now > expires_at {
            return false;
        }
    }
    true
}

/// Record one presentation: last-used and source metadata. No counter
/// semantics; counting belongs to the rate limiter.
pub fn record_usage(
    token: &mut SecurityToken,
    now: DateTime<Utc>,
    source_ip: Option<String>,
    user_agent: Option<String>,
) {
    token.last_used = Some(now);
    token.source_ip = source_ip;
    token.user_agent = user_agent;
}

/// Deactivate the token permanently. There is no un-revoke.
pub fn revoke(token: &mut SecurityToken) {
    token.active = false;
}
