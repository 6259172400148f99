//! Engine configuration.
//!
//! ```
//! use relgraph_core::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{"formats": {"date": "%d.%m.%Y"}}"#).unwrap();
//! assert_eq!(config.formats.date, "%d.%m.%Y");
//! assert_eq!(config.formats.time, "%H:%M:%S");
//! assert!(config.include.one_to_many);
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// chrono format strings used to store and parse temporal scalar fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Formats {
    pub date: String,
    pub time: String,
    pub datetime: String,
}

impl Default for Formats {
    fn default() -> Self {
        Self {
            date: "%Y-%m-%d".to_string(),
            time: "%H:%M:%S".to_string(),
            datetime: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

/// Relationship kinds followed by a load unless the caller overrides them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncludeDefaults {
    pub many_to_one: bool,
    pub one_to_many: bool,
    pub many_to_many: bool,
}

impl Default for IncludeDefaults {
    fn default() -> Self {
        Self {
            many_to_one: true,
            one_to_many: true,
            many_to_many: true,
        }
    }
}

/// Configuration shared by every operation of an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub formats: Formats,
    pub include: IncludeDefaults,
}

impl EngineConfig {
    /// Parse a configuration document. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Set the storage format for date fields.
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.formats.date = format.into();
        self
    }

    /// Set the storage format for time fields.
    pub fn time_format(mut self, format: impl Into<String>) -> Self {
        self.formats.time = format.into();
        self
    }

    /// Set the storage format for datetime fields.
    pub fn datetime_format(mut self, format: impl Into<String>) -> Self {
        self.formats.datetime = format.into();
        self
    }

    /// Set which relationship kinds loads follow by default.
    pub fn include(mut self, many_to_one: bool, one_to_many: bool, many_to_many: bool) -> Self {
        self.include = IncludeDefaults {
            many_to_one,
            one_to_many,
            many_to_many,
        };
        self
    }
}
