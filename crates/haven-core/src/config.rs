//! Configuration loading for Haven services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`HAVEN_` prefix, `__` section separator)
//! 2. Config file (`haven.toml`)
//! 3. Per-section serde defaults

use serde::de::DeserializeOwned;

use crate::error::HavenError;

/// Load one named section of the Haven configuration.
///
/// A missing section falls back to the type's `Default`; a present but
/// malformed section is a configuration error.
pub fn load_section<T>(section: &str) -> Result<T, HavenError>
where
    T: DeserializeOwned + Default,
{
    let settings = config::Config::builder()
        .add_source(config::File::with_name("haven").required(false))
        .add_source(config::Environment::with_prefix("HAVEN").separator("__"))
        .build()
        .map_err(|e| HavenError::Config(e.to_string()))?;

    match settings.get::<T>(section) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => {
            tracing::debug!(section, "config section absent, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(HavenError::Config(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, serde::Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        retries: u32,
    }

    #[test]
    fn missing_section_uses_defaults() {
        let sample: Sample = load_section("no_such_section").unwrap();
        assert_eq!(sample, Sample { retries: 0 });
    }
}
