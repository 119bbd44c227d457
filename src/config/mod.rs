pub mod toml_config;

pub use toml_config::{load_config, load_config_or_default, save_config};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard limit the platform gives a screening before it answers on its own.
pub const PLATFORM_CEILING_MS: u64 = 5000;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub screening: ScreeningConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub contacts: ContactsConfig,
    #[serde(default)]
    pub call_log: CallLogConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ScreeningConfig {
    /// Internal budget for producing a verdict.
    pub budget_ms: u64,
    /// Platform limit; the budget never exceeds it or `PLATFORM_CEILING_MS`.
    pub platform_ceiling_ms: u64,
    pub contact_lookup_timeout_ms: u64,
    /// Screenings slower than this are logged as warnings.
    pub slow_warning_ms: u64,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            budget_ms: 4500,
            platform_ceiling_ms: PLATFORM_CEILING_MS,
            contact_lookup_timeout_ms: 2000,
            slow_warning_ms: 1000,
        }
    }
}

impl ScreeningConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(
            self.budget_ms
                .min(self.platform_ceiling_ms)
                .min(PLATFORM_CEILING_MS),
        )
    }

    pub fn contact_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.contact_lookup_timeout_ms).min(self.budget())
    }

    pub fn slow_warning(&self) -> Duration {
        Duration::from_millis(self.slow_warning_ms)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.budget_ms == 0 {
            problems.push("screening.budget_ms must be greater than zero".to_string());
        }
        if self.platform_ceiling_ms > PLATFORM_CEILING_MS {
            problems.push(format!(
                "screening.platform_ceiling_ms ({}) is above the platform limit of {PLATFORM_CEILING_MS}ms; it will be ignored",
                self.platform_ceiling_ms
            ));
        }
        if self.budget_ms > self.platform_ceiling_ms {
            problems.push(format!(
                "screening.budget_ms ({}) exceeds platform_ceiling_ms ({}); it will be clamped",
                self.budget_ms, self.platform_ceiling_ms
            ));
        }
        if self.contact_lookup_timeout_ms > self.budget_ms {
            problems.push(format!(
                "screening.contact_lookup_timeout_ms ({}) exceeds budget_ms ({})",
                self.contact_lookup_timeout_ms, self.budget_ms
            ));
        }
        problems
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "/var/lib/callscreen/callscreen.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ContactsConfig {
    /// YAML file with the user's contacts.
    pub directory_path: Option<String>,
    pub permission_granted: bool,
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            directory_path: None,
            permission_granted: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CallLogConfig {
    pub recent_limit: usize,
    pub retention_days: Option<u32>,
}

impl Default for CallLogConfig {
    fn default() -> Self {
        Self {
            recent_limit: 50,
            retention_days: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Every setting that will be ignored or clamped at runtime.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.screening.validate();
        if self.storage.database_path.trim().is_empty() {
            problems.push("storage.database_path is empty".to_string());
        }
        if self.call_log.recent_limit == 0 {
            problems.push("call_log.recent_limit is 0; --log will show nothing".to_string());
        }
        if let Some(level) = &self.logging {
            if level.level.parse::<log::LevelFilter>().is_err() {
                problems.push(format!("logging.level '{}' is not a log level", level.level));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_clamped_to_ceiling() {
        let screening = ScreeningConfig {
            budget_ms: 9000,
            ..ScreeningConfig::default()
        };
        assert_eq!(screening.budget(), Duration::from_millis(5000));
        assert_eq!(screening.validate().len(), 1);
    }

    #[test]
    fn test_budget_never_exceeds_platform_limit() {
        let screening = ScreeningConfig {
            budget_ms: 8000,
            platform_ceiling_ms: 10000,
            ..ScreeningConfig::default()
        };
        assert_eq!(screening.budget(), Duration::from_millis(PLATFORM_CEILING_MS));
        assert!(screening.contact_lookup_timeout() <= Duration::from_millis(PLATFORM_CEILING_MS));
        assert!(screening
            .validate()
            .iter()
            .any(|p| p.contains("platform_ceiling_ms")));
    }

    #[test]
    fn test_lower_configured_ceiling_wins() {
        let screening = ScreeningConfig {
            budget_ms: 4500,
            platform_ceiling_ms: 3000,
            ..ScreeningConfig::default()
        };
        assert_eq!(screening.budget(), Duration::from_millis(3000));
    }

    #[test]
    fn test_config_validate_covers_all_sections() {
        let mut config = Config::default();
        config.call_log.recent_limit = 0;
        config.logging = Some(LoggingConfig {
            level: "loud".to_string(),
        });
        let problems = config.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("recent_limit")));
        assert!(problems.iter().any(|p| p.contains("loud")));
    }

    #[test]
    fn test_contact_timeout_within_budget() {
        let screening = ScreeningConfig {
            budget_ms: 300,
            contact_lookup_timeout_ms: 2000,
            ..ScreeningConfig::default()
        };
        assert_eq!(screening.contact_lookup_timeout(), Duration::from_millis(300));
        assert!(!screening.validate().is_empty());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.screening.budget(), Duration::from_millis(4500));
        assert!(config.contacts.permission_granted);
    }
}
