//! Credentials for the service directory.
//!
//! Two independent mechanisms live here:
//!
//! - **Registration tokens**: a provider proves it knows the shared secret by
//!   submitting `HMAC-SHA256(secret, service name, address)` as its `s2sKey`.
//!   The token is bound to the exact name/address pair, so it cannot be
//!   replayed to register a different address.
//! - **Admin API key**: the overview and node-status endpoints can require an
//!   `X-API-Key` header.
//!
//! Both comparisons are constant-time, and neither the secret nor the
//! expected token is ever logged or echoed back.

use crate::protocol::RegistrationDescriptor;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The directory-wide secret registration tokens are keyed with.
#[derive(Clone)]
pub struct SharedSecret(String);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    fn mac(&self, service: &str, address: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.0.as_bytes()).ok()?;
        // Length prefix keeps ("ab", "c") and ("a", "bc") apart
        mac.update(&(service.len() as u64).to_be_bytes());
        mac.update(service.as_bytes());
        mac.update(address.as_bytes());
        Some(mac)
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(*****)")
    }
}

/// Computes the registration token for a service name and provider address.
///
/// Deterministic: the same inputs always give the same lowercase hex string.
///
/// # Arguments
/// * `secret` - The directory's shared secret
/// * `service` - Service name the provider registers under
/// * `address` - Provider base URL, exactly as it will be registered
///
/// # Returns
/// The token to put in the descriptor's `s2sKey`
///
/// # Example
/// ```
/// use s2s_common::auth::{sign, validate, SharedSecret};
/// use s2s_common::RegistrationDescriptor;
///
/// let secret = SharedSecret::new("shared-secret");
/// let token = sign(&secret, "exec", "http://10.0.0.5:9000");
/// let desc = RegistrationDescriptor::new("exec", "http://10.0.0.5:9000", "", token);
/// assert!(validate(&desc, &secret));
/// ```
pub fn sign(secret: &SharedSecret, service: &str, address: &str) -> String {
    match secret.mac(service, address) {
        Some(mac) => hex::encode(mac.finalize().into_bytes()),
        None => String::new(),
    }
}

/// Recomputes the token for `desc` and compares it against `desc.s2s_key`.
///
/// # Returns
/// `true` only if the submitted key is valid hex and matches, compared in
/// constant time. An empty key never validates.
pub fn validate(desc: &RegistrationDescriptor, secret: &SharedSecret) -> bool {
    let Ok(submitted) = hex::decode(desc.s2s_key.trim()) else {
        return false;
    };
    match secret.mac(&desc.name, &desc.url) {
        Some(mac) => mac.verify_slice(&submitted).is_ok(),
        None => false,
    }
}

/// Authentication configuration for the admin surface.
///
/// Disabled by default; when an API key is set, admin requests must carry it
/// in the `X-API-Key` header.
///
/// ```
/// use s2s_common::auth::AuthConfig;
///
/// let auth = AuthConfig::with_api_key("secret-key");
/// assert!(auth.requires_auth());
/// assert!(auth.validate_api_key("secret-key"));
/// assert!(!AuthConfig::disabled().requires_auth());
/// ```
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    api_key: Option<String>,
}

impl AuthConfig {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { api_key: None }
    }

    pub fn requires_auth(&self) -> bool {
        self.api_key.is_some()
    }

    /// Always `true` when authentication is disabled.
    pub fn validate_api_key(&self, provided_key: &str) -> bool {
        match &self.api_key {
            Some(expected_key) => constant_time_eq(expected_key, provided_key),
            None => true,
        }
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.api_key {
            Some(_) => write!(f, "ApiKey(*****)"),
            None => write!(f, "Disabled"),
        }
    }
}

/// Compares two strings without short-circuiting on the first mismatch.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}
