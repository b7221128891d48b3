//! Identity of the service embedding this library.

use std::fmt;

use crate::error::ConfigError;

/// Name of the variable holding the service name.
pub const SERVICE_VAR: &str = "Service";

/// Opaque, non-empty name of the owning service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName(String);

impl ServiceName {
    /// Wraps a service name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] if `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::MissingVar(SERVICE_VAR));
        }
        Ok(Self(name))
    }

    /// Reads the service name from the `Service` variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] if the variable is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let name = std::env::var(SERVICE_VAR).unwrap_or_default();
        Self::new(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
