//! Flag and environment handling shared by the subcommands.

use anyhow::{anyhow, Result};
use s2s_common::auth::SharedSecret;
use s2s_directory::ProbeConfig;
use std::time::Duration;

/// Environment variable holding the registration secret.
pub const SECRET_ENV: &str = "S2S_SECRET";

/// Environment variable holding the admin API key.
pub const ADMIN_KEY_ENV: &str = "S2S_ADMIN_KEY";

/// Flag wins over environment; empty values count as unset.
pub fn flag_or_env(flag: Option<String>, env: Option<String>) -> Option<String> {
    flag.filter(|v| !v.is_empty())
        .or_else(|| env.filter(|v| !v.is_empty()))
}

/// Resolves the shared secret from `--secret` or `S2S_SECRET`.
pub fn resolve_secret(flag: Option<String>) -> Result<SharedSecret> {
    flag_or_env(flag, std::env::var(SECRET_ENV).ok())
        .map(SharedSecret::new)
        .ok_or_else(|| anyhow!("No secret given: pass --secret or set {}", SECRET_ENV))
}

/// Resolves the admin key from `--api-key` or `S2S_ADMIN_KEY`.
pub fn resolve_api_key(flag: Option<String>) -> Option<String> {
    flag_or_env(flag, std::env::var(ADMIN_KEY_ENV).ok())
}

/// Checks that `url` starts with `http://` or `https://`.
pub fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow!(
            "Invalid {}: '{}' must start with http:// or https://",
            description,
            url
        ))
    }
}

/// Builds the probe configuration from the directory command's flags.
pub fn probe_config(attempts: u32, delay_ms: u64, timeout_ms: u64) -> Result<ProbeConfig> {
    if attempts == 0 {
        return Err(anyhow!("--probe-attempts must be at least 1"));
    }
    if timeout_ms == 0 {
        return Err(anyhow!("--probe-timeout-ms must be at least 1"));
    }
    Ok(ProbeConfig {
        attempts,
        delay: Duration::from_millis(delay_ms),
        timeout: Duration::from_millis(timeout_ms),
    })
}
