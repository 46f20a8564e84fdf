use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::agent::{AgentFilter, AgentRecord, Creation, NewCreation};

/// Failures of the upstream Registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The request never produced a response (DNS, connect, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The Registry answered with a server-side error status.
    #[error("registry returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The upstream call did not finish within its deadline.
    #[error("registry call timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be decoded.
    #[error("invalid registry response: {0}")]
    Decode(String),

    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The Registry refused the request as invalid or unauthorized (4xx).
    #[error("registry rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl RegistryError {
    /// Map an HTTP status and body to the matching variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            400..=499 => Self::Rejected { status, message },
            _ => Self::Status { status, message },
        }
    }

    /// Whether this failure says something about upstream health.
    ///
    /// Client errors are the caller's fault and must not trip the breaker.
    pub fn counts_against_breaker(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::Rejected { .. })
    }
}

/// Typed client for the Registry service of record.
///
/// The gateway treats every method as "may fail, may be slow"; it knows
/// nothing about the wire protocol behind it.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn get_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, RegistryError>;

    async fn get_agent(&self, id: &str, include: &[String]) -> Result<AgentRecord, RegistryError>;

    async fn get_creations(&self, agent_id: &str) -> Result<Vec<Creation>, RegistryError>;

    async fn create_creation(
        &self,
        agent_id: &str,
        body: &NewCreation,
    ) -> Result<Creation, RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            RegistryError::from_status(404, "gone"),
            RegistryError::NotFound(_)
        ));
        assert!(matches!(
            RegistryError::from_status(422, "bad"),
            RegistryError::Rejected { status: 422, .. }
        ));
        assert!(matches!(
            RegistryError::from_status(503, "down"),
            RegistryError::Status { status: 503, .. }
        ));
    }

    #[test]
    fn client_errors_do_not_count_against_breaker() {
        assert!(!RegistryError::NotFound("x".into()).counts_against_breaker());
        assert!(!RegistryError::from_status(401, "no").counts_against_breaker());
        assert!(RegistryError::Transport("reset".into()).counts_against_breaker());
        assert!(RegistryError::Timeout(Duration::from_secs(1)).counts_against_breaker());
        assert!(RegistryError::from_status(500, "boom").counts_against_breaker());
    }

    fn _assert_object_safe(_: &dyn RegistryClient) {}
}
