//! Configuration for the security decision core.
//!
//! Loaded from `haven.toml` `[guard]` section or `HAVEN_GUARD__`
//! environment variables.

use serde::Deserialize;

use haven_core::HavenError;

use crate::policy::FailMode;
use crate::ratelimit::RateLimitConfig;

/// Top-level guard configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuardConfig {
    /// What missing policy rules and unknown rule kinds evaluate to.
    /// The shipped default is fail-open; flip to `closed` to deny.
    #[serde(default)]
    pub fail_mode: FailMode,

    /// Rate limiter settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl GuardConfig {
    /// Load from the `[guard]` section of the Haven configuration.
    pub fn load() -> Result<Self, HavenError> {
        haven_core::config::load_section("guard")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_fail_open_with_threshold_five() {
        let config = GuardConfig::default();
        assert_eq!(config.fail_mode, FailMode::Open);
        assert_eq!(config.rate_limit.threshold, 5);
    }

    #[test]
    fn deserializes_from_toml_section() {
        let parsed: GuardConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "fail_mode = \"closed\"\n[rate_limit]\nthreshold = 3\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(parsed.fail_mode, FailMode::Closed);
        assert_eq!(parsed.rate_limit.threshold, 3);
    }
}
