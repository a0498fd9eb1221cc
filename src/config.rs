//! Scrape configuration: which objects to collect and through which backend.
//!
//! ```json
//! {
//!   "objects": [
//!     { "object": "Processor", "backend": "perflib", "counters": ["*"] },
//!     { "object": "System", "backend": "pdh", "counters": ["Processes"] }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::collector::{Backend, Collector, CollectorFactory, ObjectError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("objects[{index}]: {reason}")]
    Invalid { index: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_backend() -> Backend {
    Backend::Perflib
}

/// One performance object to collect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub object: String,
    #[serde(default = "default_backend")]
    pub backend: Backend,
    /// Instances to keep (perflib) or bind (pdh); empty means all, or the
    /// single unnamed instance for pdh.
    #[serde(default)]
    pub instances: Vec<String>,
    pub counters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub objects: Vec<ObjectConfig>,
}

impl Config {
    /// Loads and validates a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (index, entry) in self.objects.iter().enumerate() {
            let invalid = |reason: &str| ConfigError::Invalid {
                index,
                reason: reason.to_string(),
            };
            if entry.object.trim().is_empty() {
                return Err(invalid("object name is empty"));
            }
            if entry.counters.is_empty() {
                return Err(invalid("no counters listed"));
            }
            if entry.backend == Backend::Pdh && entry.instances.iter().any(|i| i == "*") {
                return Err(invalid(
                    "wildcard instance is not supported by the pdh backend",
                ));
            }
            if entry.backend == Backend::Pdh && entry.counters.iter().any(|c| c == "*") {
                return Err(invalid(
                    "wildcard counter is not supported by the pdh backend",
                ));
            }
            if !seen.insert(entry.object.as_str()) {
                return Err(invalid("object listed twice"));
            }
        }
        Ok(())
    }

    /// Builds one collector per entry.
    ///
    /// Entries that fail are returned as errors; the rest still run.
    pub fn build(&self, factory: &CollectorFactory) -> (Vec<Collector>, Vec<ObjectError>) {
        let mut collectors = Vec::with_capacity(self.objects.len());
        let mut errors = Vec::new();
        for entry in &self.objects {
            match factory.new_collector(
                entry.backend,
                &entry.object,
                &entry.instances,
                &entry.counters,
            ) {
                Ok(collector) => collectors.push(collector),
                Err(err) => {
                    warn!(error = %err, "skipping object");
                    errors.push(err);
                }
            }
        }
        (collectors, errors)
    }
}
