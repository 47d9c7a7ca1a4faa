use std::fmt;
use thiserror::Error;

use crate::datastore::NodeId;

/// Phase of the solve in which a division happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Triangularization,
    BackSubstitution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Triangularization => write!(f, "triangularization"),
            Stage::BackSubstitution => write!(f, "back-substitution"),
        }
    }
}

/// Unified error type for the cluster simulation
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Division by a zero, near-zero or non-finite divisor
    #[error("Arithmetic fault on node {node} during {stage} (iteration {iteration}): divisor {divisor}")]
    Arithmetic {
        node: NodeId,
        stage: Stage,
        iteration: usize,
        divisor: f64,
    },

    /// Wiring or parameter errors detected before or at solve time
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Errors reported by a node's datastore
    #[error("Datastore error on node {node} during {operation}: {message}")]
    Datastore {
        node: NodeId,
        operation: String,
        message: String,
    },

    /// Semaphore, channel and join failures
    #[error("Concurrency error: {operation}")]
    Concurrency {
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A node's compute task did not run to completion
    #[error("Task error on node {node}: {message}")]
    Task { node: NodeId, message: String },

    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ClusterError {
    /// Create an arithmetic fault
    pub fn arithmetic(node: NodeId, stage: Stage, iteration: usize, divisor: f64) -> Self {
        Self::Arithmetic {
            node,
            stage,
            iteration,
            divisor,
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

    /// Create a datastore error
    pub fn datastore<O: Into<String>, M: Into<String>>(node: NodeId, operation: O, message: M) -> Self {
        Self::Datastore {
            node,
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a concurrency error with source
    pub fn concurrency_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        operation: S,
        source: E,
    ) -> Self {
        Self::Concurrency {
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a task error
    pub fn task<M: Into<String>>(node: NodeId, message: M) -> Self {
        Self::Task {
            node,
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
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

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Self::Arithmetic { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Arithmetic { .. } => "arithmetic",
            Self::Configuration { .. } => "configuration",
            Self::Datastore { .. } => "datastore",
            Self::Concurrency { .. } => "concurrency",
            Self::Task { .. } => "task",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ClusterError>;

impl From<std::io::Error> for ClusterError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for ClusterError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

impl From<tokio::sync::AcquireError> for ClusterError {
    fn from(err: tokio::sync::AcquireError) -> Self {
        Self::concurrency_with_source("semaphore_acquire", err)
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ClusterError {
    fn from(err: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::concurrency_with_source("reply_receive", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_display() {
        let err = ClusterError::arithmetic(2, Stage::Triangularization, 1, 0.0);
        assert!(err.is_arithmetic());
        assert_eq!(err.category(), "arithmetic");
        assert_eq!(
            err.to_string(),
            "Arithmetic fault on node 2 during triangularization (iteration 1): divisor 0"
        );
    }

    #[test]
    fn test_configuration_field() {
        let err = ClusterError::configuration_field("must be positive", "pivot_tolerance");
        assert!(err.is_configuration());
        match err {
            ClusterError::Configuration { field, .. } => {
                assert_eq!(field.as_deref(), Some("pivot_tolerance"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_json_error() {
        let parse = serde_json::from_str::<Vec<f64>>("not json").unwrap_err();
        let err: ClusterError = parse.into();
        assert_eq!(err.category(), "serialization");
    }
}
