//! RBAC configuration

use crate::error::{RbacError, Result};
use serde::{Deserialize, Serialize};

/// Query kinds that can be simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryKind {
    /// Role membership queries
    RoleIs,
    /// Permission membership queries
    May,
    /// Entity-level checks
    Allowed,
}

/// Forced results used when simulation is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PretendOptions {
    pub role_is: bool,
    pub may: bool,
    pub allowed: bool,
}

impl Default for PretendOptions {
    fn default() -> Self {
        Self {
            role_is: true,
            may: true,
            allowed: true,
        }
    }
}

impl PretendOptions {
    /// Same forced result for every query kind
    pub fn all(result: bool) -> Self {
        Self {
            role_is: result,
            may: result,
            allowed: result,
        }
    }

    pub fn result_for(&self, kind: QueryKind) -> bool {
        match kind {
            QueryKind::RoleIs => self.role_is,
            QueryKind::May => self.may,
            QueryKind::Allowed => self.allowed,
        }
    }
}

/// Simulation ("pretend") mode
///
/// When enabled, every query answers with the configured result for its kind
/// without touching assignment data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PretendConfig {
    pub enabled: bool,
    pub options: PretendOptions,
}

impl PretendConfig {
    /// Forced result for a query kind, if simulation is enabled
    pub fn forced(&self, kind: QueryKind) -> Option<bool> {
        self.enabled.then(|| self.options.result_for(kind))
    }
}

/// RBAC configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    /// Separator used for slugs and named queries
    pub separator: char,

    /// Simulation mode
    pub pretend: PretendConfig,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            separator: '.',
            pretend: PretendConfig::default(),
        }
    }
}

impl RbacConfig {
    /// Parse a JSON configuration document; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Use a different slug separator
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Enable simulation mode with the given forced results
    pub fn with_pretend(mut self, options: PretendOptions) -> Self {
        self.pretend = PretendConfig {
            enabled: true,
            options,
        };
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if matches!(self.separator, ',' | '|' | '*') || self.separator.is_whitespace() {
            return Err(RbacError::Config(format!(
                "Separator '{}' collides with reference syntax",
                self.separator
            )));
        }
        Ok(())
    }
}
