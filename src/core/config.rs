use crate::core::errors::{ParallelError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by callback batches and the async runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Name attached to every log event of the batch
    pub label: Option<String>,
    /// Maximum number of futures executing at once (async runner only)
    pub max_in_flight: Option<usize>,
    /// Emit a debug event for every dispatch and completion
    pub log_task_events: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            label: None,
            max_in_flight: None,
            log_task_events: true,
        }
    }
}

impl RunConfig {
    /// Create a builder for custom configuration
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::new()
    }

    /// Quiet configuration for hot paths: only batch-level events are logged
    pub fn quiet() -> Self {
        Self {
            log_task_events: false,
            ..Self::default()
        }
    }

    /// Bounded configuration for fan-outs against rate-limited backends
    pub fn bounded(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: Some(max_in_flight),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == Some(0) {
            return Err(ParallelError::configuration_field(
                "max_in_flight must be greater than 0",
                "max_in_flight",
            ));
        }
        if let Some(label) = &self.label {
            if label.trim().is_empty() {
                return Err(ParallelError::configuration_field(
                    "label must not be blank",
                    "label",
                ));
            }
        }
        Ok(())
    }

    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ParallelError::io(format!("read {}", path.display()), e))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&source),
            Some("json") => Self::from_json_str(&source),
            other => Err(ParallelError::configuration(format!(
                "unsupported config extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// Fluent builder for [`RunConfig`]
#[derive(Debug, Default)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = Some(label.into());
        self
    }

    /// Cap concurrently executing futures
    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.config.max_in_flight = Some(limit);
        self
    }

    /// Enable/disable per-task events
    pub fn log_task_events(mut self, enabled: bool) -> Self {
        self.config.log_task_events = enabled;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<RunConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
