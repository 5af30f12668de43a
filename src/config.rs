//! Provider configuration.
//!
//! Configuration lives under a `[psmx]` table in a TOML file:
//!
//! ```toml
//! [psmx]
//! cq_pool_capacity = 64
//! pool_overflow = "fail"
//! sread_slice_us = 1000
//! ```
//!
//! `reserved_tag_bits` defaults to the message and RMA bits and is best left
//! to the default; TOML integers are signed, so the high bits cannot be
//! written as a literal.

use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fabric::cq::OverflowPolicy;
use crate::fabric::type_alias::{PSMX_MSG_BIT, PSMX_RMA_BIT};

/// Configuration loading error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration file")]
    Io(#[from] io::Error),

    /// The TOML document is malformed or has wrongly typed fields.
    #[error("bad TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// The JSON document is malformed or has wrongly typed fields.
    #[error("bad JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The document has no `[psmx]` table.
    #[error("psmx configuration not found")]
    MissingTable,

    /// A field holds a value outside its valid range.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Provider-wide tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Number of completion events preallocated per CQ.
    pub cq_pool_capacity: usize,

    /// What a CQ does when its event pool runs dry.
    pub pool_overflow: OverflowPolicy,

    /// Tag bits reserved by the provider. When the message bit is reserved,
    /// receive completions carry the sender's epid in the remaining bits.
    pub reserved_tag_bits: u64,

    /// Longest single wait on a wait object during a timed read, in microseconds.
    pub sread_slice_us: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            cq_pool_capacity: 64,
            pool_overflow: OverflowPolicy::Fail,
            reserved_tag_bits: PSMX_MSG_BIT | PSMX_RMA_BIT,
            sread_slice_us: 1000,
        }
    }
}

impl ProviderConfig {
    /// Load the `[psmx]` table of a TOML configuration file.
    pub fn load_toml(config_file: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_str = fs::read_to_string(config_file)?;
        Self::from_toml_str(&toml_str)
    }

    /// Parse the `[psmx]` table of a TOML document.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let toml: toml::Value = toml::from_str(toml_str)?;
        let table = toml.get("psmx").ok_or(ConfigError::MissingTable)?;
        let config: Self = table.clone().try_into()?;
        config.validate()
    }

    /// Parse a JSON object holding the configuration fields.
    pub fn from_json_str(json_str: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json_str)?;
        config.validate()
    }

    /// Get the timed-read wait slice.
    #[inline]
    pub fn sread_slice(&self) -> Duration {
        Duration::from_micros(self.sread_slice_us)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.cq_pool_capacity == 0 {
            return Err(ConfigError::Invalid("cq_pool_capacity must be positive"));
        }
        if self.sread_slice_us == 0 {
            return Err(ConfigError::Invalid("sread_slice_us must be positive"));
        }
        Ok(self)
    }
}
