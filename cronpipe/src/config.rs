//! Orchestrator configuration: environment variables, CLI overrides, defaults.

use tracing::warn;

use crate::errors::ConfigError;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Runtime configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Shared bearer secret the scheduler presents.
    pub cron_secret: String,
    /// Whether the standalone stage endpoints run stages.
    pub split_jobs_enabled: bool,
    /// Listen address.
    pub bind_address: String,
    /// Postgres URL for the ledger and lock store; in-memory when unset.
    pub database_url: Option<String>,
    /// URL POSTed to on cache invalidation; log-only when unset.
    pub cache_revalidate_url: Option<String>,
    /// Bearer token sent with the invalidation request.
    pub cache_revalidate_token: Option<String>,
}

impl std::fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("cron_secret", &"<redacted>")
            .field("split_jobs_enabled", &self.split_jobs_enabled)
            .field("bind_address", &self.bind_address)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("cache_revalidate_url", &self.cache_revalidate_url)
            .field(
                "cache_revalidate_token",
                &self.cache_revalidate_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cron_secret: String::new(),
            split_jobs_enabled: false,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            database_url: None,
            cache_revalidate_url: None,
            cache_revalidate_token: None,
        }
    }
}

/// Values given on the command line, which win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--bind-address`
    pub bind_address: Option<String>,
    /// `--database-url`
    pub database_url: Option<String>,
    /// `--split-jobs`
    pub split_jobs_enabled: Option<bool>,
}

impl OrchestratorConfig {
    /// Loads configuration from the process environment with CLI overrides.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), overrides)
    }

    /// Loads configuration through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F, overrides: ConfigOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        config.cron_secret = lookup("CRON_SECRET").unwrap_or_default();

        config.split_jobs_enabled = match overrides.split_jobs_enabled {
            Some(enabled) => enabled,
            None => match lookup("SPLIT_JOBS_ENABLED") {
                Some(value) => parse_flag("SPLIT_JOBS_ENABLED", &value)?,
                None => false,
            },
        };

        if let Some(addr) = overrides.bind_address.or_else(|| non_empty("BIND_ADDRESS")) {
            config.bind_address = addr;
        }

        config.database_url = overrides.database_url.or_else(|| non_empty("DATABASE_URL"));
        config.cache_revalidate_url = non_empty("CACHE_REVALIDATE_URL");
        config.cache_revalidate_token = non_empty("CACHE_REVALIDATE_TOKEN");

        if config.cache_revalidate_token.is_some() && config.cache_revalidate_url.is_none() {
            warn!("CACHE_REVALIDATE_TOKEN set without CACHE_REVALIDATE_URL; ignoring");
        }

        Ok(config)
    }

    /// Refuses configurations the server must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cron_secret.trim().is_empty() {
            return Err(ConfigError::Missing("CRON_SECRET"));
        }
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Missing("BIND_ADDRESS"));
        }
        Ok(())
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)], overrides: ConfigOverrides) -> Result<OrchestratorConfig, ConfigError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        OrchestratorConfig::from_lookup(|name| env.get(name).cloned(), overrides)
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("CRON_SECRET", "s3cret")], ConfigOverrides::default()).unwrap();
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert!(!config.split_jobs_enabled);
        assert!(config.database_url.is_none());
        assert!(config.cache_revalidate_url.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_env_values() {
        let config = load(
            &[
                ("CRON_SECRET", "s3cret"),
                ("SPLIT_JOBS_ENABLED", "TRUE"),
                ("BIND_ADDRESS", "127.0.0.1:9000"),
                ("DATABASE_URL", "postgres://localhost/cron"),
                ("CACHE_REVALIDATE_URL", "http://web/api/revalidate"),
                ("CACHE_REVALIDATE_TOKEN", "tok"),
            ],
            ConfigOverrides::default(),
        )
        .unwrap();

        assert!(config.split_jobs_enabled);
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/cron"));
        assert_eq!(config.cache_revalidate_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_overrides_win() {
        let config = load(
            &[("CRON_SECRET", "s3cret"), ("SPLIT_JOBS_ENABLED", "true"), ("BIND_ADDRESS", "a:1")],
            ConfigOverrides {
                bind_address: Some("b:2".into()),
                database_url: None,
                split_jobs_enabled: Some(false),
            },
        )
        .unwrap();
        assert_eq!(config.bind_address, "b:2");
        assert!(!config.split_jobs_enabled);
    }

    #[test]
    fn test_invalid_flag() {
        let err = load(&[("SPLIT_JOBS_ENABLED", "maybe")], ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SPLIT_JOBS_ENABLED", .. }));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let config = load(&[("CRON_SECRET", "  ")], ConfigOverrides::default()).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("CRON_SECRET"))));
        let config = load(&[], ConfigOverrides::default()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = load(&[("CRON_SECRET", "s3cret")], ConfigOverrides::default()).unwrap();
        assert!(!format!("{config:?}").contains("s3cret"));
    }
}
