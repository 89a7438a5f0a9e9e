//! # cheap Configuration System
//!
//! Hierarchical configuration for cursor arenas and their tooling.
//!
//! ## Features
//! - **Layered sources**: defaults, YAML files and `CHEAP_*` environment variables
//! - **Validation**: field-level checks with `validator` plus cross-field checks

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

mod arena;
mod error;
mod telemetry;
mod validation;

pub use arena::{ArenaConfig, BackingKind, MAX_ARENA_SIZE};
pub use error::ConfigError;
pub use telemetry::TelemetryConfig;

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct CheapConfig {
    /// Arena backing and alignment.
    #[serde(default)]
    #[validate(nested)]
    pub arena: ArenaConfig,

    /// Logging and metrics.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl CheapConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/cheap.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<CHEAP_ENV>.yaml` - Environment-specific overrides.
    /// 4. `CHEAP_*` environment variables, nested with `__`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(CheapConfig::default()));

        if Path::new("config/cheap.yaml").exists() {
            figment = figment.merge(Yaml::file("config/cheap.yaml"));
        } else {
            debug!("config/cheap.yaml not found, using default configuration");
        }

        if let Ok(env) = std::env::var("CHEAP_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific file, with environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::finish(
            Figment::from(Serialized::defaults(CheapConfig::default())).merge(Yaml::file(path)),
        )
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed("CHEAP_").ignore(&["ENV"]).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                config.arena.check().map_err(ConfigError::Invalid)?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn jailed(err: ConfigError) -> figment::Error {
        figment::Error::from(err.to_string())
    }

    #[test]
    fn default_config_validates() {
        let config = CheapConfig::default();
        config.validate().expect("Default config should validate");
        config.arena.check().expect("Default arena config should be consistent");
    }

    #[test]
    fn environment_override() {
        Jail::expect_with(|jail| {
            jail.set_env("CHEAP_ARENA__SIZE", "4096");
            jail.set_env("CHEAP_ARENA__ALIGNMENT", "64");
            let config = CheapConfig::load().map_err(jailed)?;
            assert_eq!(config.arena.size, 4096);
            assert_eq!(config.arena.alignment, 64);
            Ok(())
        });
    }

    #[test]
    fn yaml_files_layer_by_environment() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                "config/cheap.yaml",
                "arena:\n  size: 1048576\ntelemetry:\n  log_level: debug\n",
            )?;
            jail.create_file("config/bench.yaml", "arena:\n  alignment: 32\n")?;
            jail.set_env("CHEAP_ENV", "bench");

            let config = CheapConfig::load().map_err(jailed)?;
            assert_eq!(config.arena.size, 1 << 20);
            assert_eq!(config.arena.alignment, 32);
            assert_eq!(config.telemetry.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn device_backing_requires_path() {
        Jail::expect_with(|jail| {
            jail.create_file("arena.yaml", "arena:\n  backing: device\n")?;
            let err = CheapConfig::load_from_path("arena.yaml").unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)));

            jail.create_file(
                "dax.yaml",
                "arena:\n  backing: device\n  device_path: /dev/dax0.0\n",
            )?;
            let config = CheapConfig::load_from_path("dax.yaml").map_err(jailed)?;
            assert_eq!(config.arena.backing, BackingKind::Device);
            assert_eq!(config.arena.device_path, Some(PathBuf::from("/dev/dax0.0")));
            Ok(())
        });
    }

    #[test]
    fn invalid_values_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("bad_align.yaml", "arena:\n  alignment: 24\n")?;
            assert!(matches!(
                CheapConfig::load_from_path("bad_align.yaml"),
                Err(ConfigError::Invalid(_))
            ));

            jail.create_file("too_big.yaml", "arena:\n  alignment: 128\n")?;
            assert!(matches!(
                CheapConfig::load_from_path("too_big.yaml"),
                Err(ConfigError::Validation(_))
            ));

            jail.create_file("bad_level.yaml", "telemetry:\n  log_level: loud\n")?;
            assert!(matches!(
                CheapConfig::load_from_path("bad_level.yaml"),
                Err(ConfigError::Validation(_))
            ));

            jail.create_file("zero.yaml", "arena:\n  size: 0\n")?;
            assert!(matches!(
                CheapConfig::load_from_path("zero.yaml"),
                Err(ConfigError::Validation(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn validation_errors_name_nested_fields() {
        let mut config = CheapConfig::default();
        config.arena.alignment = 4096;
        let err = ConfigError::from(config.validate().unwrap_err());
        assert!(err.to_string().contains("Field 'arena.alignment'"));
    }

    #[test]
    fn missing_file_reported() {
        let err = CheapConfig::load_from_path("/nonexistent/cheap.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
