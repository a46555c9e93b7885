//! Cloud Provider Error Types
//!
//! The error kinds every provider and every cache decorator reports.
//! Errors are `Clone` so one coalesced outcome can be handed to each waiter.

use crate::path::CloudPath;

/// Provider operation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloudError {
    #[error("Not found: {0}")]
    NotFound(CloudPath),

    #[error("Already exists: {0}")]
    AlreadyExists(CloudPath),

    #[error("Type mismatch: {0}")]
    TypeMismatch(CloudPath),

    #[error("Quota not available for {0}")]
    QuotaNotAvailable(CloudPath),

    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

/// Result alias for provider operations
pub type CloudResult<T> = Result<T, CloudError>;

impl CloudError {
    /// Wrap any displayable failure as a generic provider error
    pub fn provider(message: impl std::fmt::Display) -> Self {
        CloudError::Provider(message.to_string())
    }

    /// Whether this error confirms that the item is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    /// Whether a failed quota lookup is a stable outcome worth keeping until TTL expiry
    pub fn is_retained_quota_failure(&self) -> bool {
        matches!(
            self,
            CloudError::NotFound(_) | CloudError::QuotaNotAvailable(_)
        )
    }
}

impl From<tokio::task::JoinError> for CloudError {
    fn from(err: tokio::task::JoinError) -> Self {
        CloudError::Provider(format!("upstream task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let path = CloudPath::new("/q");
        assert!(CloudError::NotFound(path.clone()).is_not_found());
        assert!(!CloudError::AlreadyExists(path.clone()).is_not_found());

        assert!(CloudError::NotFound(path.clone()).is_retained_quota_failure());
        assert!(CloudError::QuotaNotAvailable(path.clone()).is_retained_quota_failure());
        assert!(!CloudError::provider("boom").is_retained_quota_failure());
        assert!(!CloudError::TypeMismatch(path).is_retained_quota_failure());
    }

    #[test]
    fn test_display() {
        let err = CloudError::NotFound(CloudPath::new("/a/b"));
        assert_eq!(err.to_string(), "Not found: /a/b");
    }
}
