//! Error types for the APIManager operator

use thiserror::Error;

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Errors that can occur during operator operations
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error (conflicts and transient I/O included)
    #[error("Kubernetes API error: {0}")]
    KubeApi(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The APIManager spec failed validation while applying defaults
    #[error("Validation error: {0}")]
    Validation(String),

    /// An upgrade procedure failed
    #[error("Upgrade error: {0}")]
    Upgrade(String),

    /// No upgrade procedure exists for the installed/running version pair
    #[error("Unsupported upgrade path from operator version {from} to {to}")]
    UnsupportedUpgrade { from: String, to: String },

    /// The declared database engine differs from the one already provisioned
    #[error("Database engine change from {existing} to {declared} is not supported")]
    DatabaseEngineChange { declared: String, existing: String },

    /// Component reconciliation error
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),
}

impl OperatorError {
    /// Errors that will not go away without user action.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            OperatorError::Validation(_)
                | OperatorError::UnsupportedUpgrade { .. }
                | OperatorError::DatabaseEngineChange { .. }
        )
    }
}

impl From<kube::Error> for OperatorError {
    fn from(err: kube::Error) -> Self {
        OperatorError::KubeApi(err.to_string())
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OperatorError::KubeApi("test error".to_string());
        assert!(err.to_string().contains("Kubernetes API error"));

        let err = OperatorError::UnsupportedUpgrade {
            from: "0.3.0".to_string(),
            to: "0.5.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported upgrade path from operator version 0.3.0 to 0.5.0"
        );
    }

    #[test]
    fn test_blocking_errors() {
        assert!(OperatorError::Validation("empty".into()).is_blocking());
        assert!(OperatorError::DatabaseEngineChange {
            declared: "postgresql".into(),
            existing: "mysql".into(),
        }
        .is_blocking());
        assert!(!OperatorError::KubeApi("conflict".into()).is_blocking());
        assert!(!OperatorError::Upgrade("failed".into()).is_blocking());
    }

    #[test]
    fn test_from_serde_error() {
        let err: OperatorError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, OperatorError::Serialization(_)));
    }
}
