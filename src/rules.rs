use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Home country code used when none has been configured.
pub const DEFAULT_HOME_COUNTRY_CODE: &str = "+1";

/// One consistent read of every blocking policy, taken once per screened call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    pub block_all: bool,
    pub block_unknown: bool,
    pub block_international: bool,
    pub home_country_code: String,
    /// Literal prefixes in stored order. The first match wins.
    pub blocked_prefixes: Vec<String>,
}

impl RuleSnapshot {
    /// Least restrictive rule set. Used when the rule store cannot be read.
    pub fn permissive() -> Self {
        Self {
            block_all: false,
            block_unknown: false,
            block_international: false,
            home_country_code: DEFAULT_HOME_COUNTRY_CODE.to_string(),
            blocked_prefixes: Vec::new(),
        }
    }

    /// Configured home country code, falling back to the default when blank.
    pub fn home_country_code(&self) -> &str {
        let code = self.home_country_code.trim();
        if code.is_empty() {
            DEFAULT_HOME_COUNTRY_CODE
        } else {
            code
        }
    }
}

impl Default for RuleSnapshot {
    fn default() -> Self {
        Self::permissive()
    }
}

/// A prefix rule as stored and listed by the rule store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedPrefix {
    pub id: i64,
    pub prefix: String,
    pub description: Option<String>,
    pub created_at_millis: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("Prefix cannot be empty")]
    EmptyPrefix,
    #[error("This prefix already exists: {0}")]
    DuplicatePrefix(String),
    #[error("Country code cannot be empty")]
    EmptyCountryCode,
    #[error("Country code must be '+' followed by digits: {0}")]
    InvalidCountryCode(String),
}

/// Trims a user-entered prefix and rejects blank input.
pub fn normalize_prefix(raw: &str) -> Result<String, RuleError> {
    let prefix = raw.trim();
    if prefix.is_empty() {
        return Err(RuleError::EmptyPrefix);
    }
    Ok(prefix.to_string())
}

/// Trims a user-entered description; blank descriptions are dropped.
pub fn normalize_description(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

pub fn normalize_country_code(raw: &str) -> Result<String, RuleError> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(RuleError::EmptyCountryCode);
    }

    let digits = match code.strip_prefix('+') {
        Some(rest) => rest,
        None => return Err(RuleError::InvalidCountryCode(code.to_string())),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(RuleError::InvalidCountryCode(code.to_string()));
    }

    Ok(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_home_code_falls_back_to_default() {
        let rules = RuleSnapshot {
            home_country_code: "  ".to_string(),
            ..RuleSnapshot::permissive()
        };
        assert_eq!(rules.home_country_code(), "+1");

        let rules = RuleSnapshot {
            home_country_code: "+48".to_string(),
            ..RuleSnapshot::permissive()
        };
        assert_eq!(rules.home_country_code(), "+48");
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("  +48 "), Ok("+48".to_string()));
        assert_eq!(normalize_prefix("   "), Err(RuleError::EmptyPrefix));
        assert_eq!(normalize_prefix(""), Err(RuleError::EmptyPrefix));
    }

    #[test]
    fn test_normalize_description() {
        assert_eq!(normalize_description(Some(" Poland ")), Some("Poland".to_string()));
        assert_eq!(normalize_description(Some("   ")), None);
        assert_eq!(normalize_description(None), None);
    }

    #[test]
    fn test_normalize_country_code() {
        assert_eq!(normalize_country_code(" +44 "), Ok("+44".to_string()));
        assert_eq!(normalize_country_code(""), Err(RuleError::EmptyCountryCode));
        assert!(matches!(
            normalize_country_code("44"),
            Err(RuleError::InvalidCountryCode(_))
        ));
        assert!(matches!(
            normalize_country_code("+"),
            Err(RuleError::InvalidCountryCode(_))
        ));
        assert!(matches!(
            normalize_country_code("+4a"),
            Err(RuleError::InvalidCountryCode(_))
        ));
    }
}
