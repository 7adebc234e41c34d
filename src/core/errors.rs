use crate::parallel::SlotState;
use thiserror::Error;
use uuid::Uuid;

/// Error type for the coordinator and its configuration layer
#[derive(Debug, Error)]
pub enum ParallelError {
    /// A task signalled completion after it had already completed
    #[error(
        "Task {index} of batch {batch}{} completed more than once (already {previous})",
        label_suffix(.label)
    )]
    DoubleCompletion {
        batch: Uuid,
        label: Option<String>,
        index: usize,
        previous: SlotState,
    },

    /// Every completion signal of a batch was dropped before the batch finished
    #[error(
        "Batch {batch}{} was abandoned with {pending} task(s) still pending",
        label_suffix(.label)
    )]
    Abandoned {
        batch: Uuid,
        label: Option<String>,
        pending: usize,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors
    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn label_suffix(label: &Option<String>) -> String {
    match label {
        Some(label) => format!(" ({})", label),
        None => String::new(),
    }
}

impl ParallelError {
    pub fn double_completion(
        batch: Uuid,
        label: Option<String>,
        index: usize,
        previous: SlotState,
    ) -> Self {
        Self::DoubleCompletion {
            batch,
            label,
            index,
            previous,
        }
    }

    pub fn abandoned(batch: Uuid, label: Option<String>, pending: usize) -> Self {
        Self::Abandoned {
            batch,
            label,
            pending,
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Misuse of the completion contract, as opposed to an environment failure
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::DoubleCompletion { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::DoubleCompletion { .. } => "double_completion",
            Self::Abandoned { .. } => "abandoned",
            Self::Configuration { .. } => "configuration",
            Self::Serialization { .. } => "serialization",
            Self::Io { .. } => "io",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ParallelError>;

impl From<std::io::Error> for ParallelError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for ParallelError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for ParallelError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

/// Failure of an async batch: either a task's own error or a coordinator fault
#[derive(Debug, Error)]
pub enum RunError<E> {
    /// The first error reported by a task, in completion order
    #[error("Task failed: {0}")]
    Task(#[source] E),

    #[error(transparent)]
    Coordinator(#[from] ParallelError),
}

impl<E> RunError<E> {
    /// The task error, if the batch failed because a task did
    pub fn into_task_error(self) -> Option<E> {
        match self {
            Self::Task(err) => Some(err),
            Self::Coordinator(_) => None,
        }
    }
}
