//! Deployment environment resolution.
//!
//! The environment is read once from the `ENV` variable and used to namespace
//! configuration keys (`config/<domain>/<env>/...`, `/config/<env>/<service>/...`).
//!
//! Recognized tokens are `dev`, `prod` and `test` (exact, case-sensitive).
//! Anything else, including an unset or empty variable, resolves to
//! [`Environment::Development`].

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Name of the variable selecting the environment.
pub const ENV_VAR: &str = "ENV";

/// Deployment environment of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Token used in configuration keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "dev",
            Self::Production => "prod",
            Self::Test => "test",
        }
    }

    /// Resolves the environment from `ENV`, defaulting to development.
    pub fn from_env() -> Self {
        match std::env::var(ENV_VAR) {
            Ok(value) => Self::resolve(&value),
            Err(_) => Self::Development,
        }
    }

    /// Maps a raw token to an environment, defaulting to development.
    pub fn resolve(value: &str) -> Self {
        if value.is_empty() {
            return Self::Development;
        }

        value.parse().unwrap_or_else(|_| {
            tracing::warn!(
                value,
                "Unrecognized {} value, falling back to development",
                ENV_VAR
            );
            Self::Development
        })
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Self::Development),
            "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::invalid(ENV_VAR, other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
