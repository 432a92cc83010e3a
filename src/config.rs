use std::env;

use anyhow::{Context, Result, bail};
use tracing::Level;

/// What to do when a request asks for more days than the approved balance holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalancePolicy {
    /// Report the shortfall but accept the request; reviewers decide.
    #[default]
    Advisory,
    /// Refuse the submission outright.
    BlockSubmission,
}

impl BalancePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalancePolicy::Advisory => "advisory",
            BalancePolicy::BlockSubmission => "submit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "advisory" => Some(BalancePolicy::Advisory),
            "submit" | "block" => Some(BalancePolicy::BlockSubmission),
            _ => None,
        }
    }
}

impl std::fmt::Display for BalancePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: String,
    pub log_level: Level,
    pub balance_policy: BalancePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "leavebook.db".to_string(),
            log_level: Level::WARN,
            balance_policy: BalancePolicy::Advisory,
        }
    }
}

impl Config {
    /// Read configuration from the environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let database = lookup("LEAVEBOOK_DATABASE").unwrap_or(defaults.database);

        let log_level = match lookup("LEAVEBOOK_LOG") {
            Some(level) => level
                .parse::<Level>()
                .with_context(|| format!("Invalid LEAVEBOOK_LOG '{}'", level))?,
            None => defaults.log_level,
        };

        let balance_policy = match lookup("LEAVEBOOK_BALANCE_CHECK") {
            Some(value) => match BalancePolicy::from_str(&value) {
                Some(policy) => policy,
                None => bail!(
                    "Invalid LEAVEBOOK_BALANCE_CHECK '{}'. Valid values: advisory, submit",
                    value
                ),
            },
            None => defaults.balance_policy,
        };

        Ok(Self {
            database,
            log_level,
            balance_policy,
        })
    }
}
