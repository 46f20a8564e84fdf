use chrono::{DateTime, Utc};
use thiserror::Error;

use bastion_audit::CallStatus;
use bastion_core::RegistryError;

use crate::circuit_breaker::BreakerOpen;

/// Errors surfaced by gateway calls.
///
/// Cache failures never appear here; they degrade to the next tier.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The upstream call ran and failed, including timeouts.
    #[error("upstream call `{operation}` failed: {source}")]
    Upstream {
        operation: String,
        #[source]
        source: RegistryError,
    },

    /// The circuit breaker rejected the call without touching upstream.
    #[error("circuit breaker `{breaker}` is open; retry after {retry_at}")]
    CircuitOpen {
        breaker: String,
        retry_at: DateTime<Utc>,
    },

    /// The caller failed authentication.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Another caller holds the idempotency key and did not finish in time.
    /// Safe to retry with the same key.
    #[error("idempotent request `{0}` is already in flight")]
    IdempotencyInFlight(String),

    /// A required collaborator was not supplied at construction time.
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl GatewayError {
    pub fn upstream(operation: impl Into<String>, source: RegistryError) -> Self {
        Self::Upstream {
            operation: operation.into(),
            source,
        }
    }

    /// Whether the caller should back off and retry later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { source, .. } => source.counts_against_breaker(),
            Self::CircuitOpen { .. } | Self::IdempotencyInFlight(_) => true,
            Self::Authentication(_) | Self::NotConfigured(_) => false,
        }
    }

    /// HTTP-style status code for audit records and route handlers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Upstream { source, .. } => match source {
                RegistryError::Status { status, .. } | RegistryError::Rejected { status, .. } => {
                    *status
                }
                RegistryError::NotFound(_) => 404,
                RegistryError::Timeout(_) => 504,
                RegistryError::Transport(_) | RegistryError::Decode(_) => 502,
            },
            Self::CircuitOpen { .. } => 503,
            Self::Authentication(_) => 401,
            Self::IdempotencyInFlight(_) => 409,
            Self::NotConfigured(_) => 500,
        }
    }

    pub(crate) fn audit_status(&self) -> CallStatus {
        match self {
            Self::CircuitOpen { .. } => CallStatus::CircuitOpen,
            Self::Authentication(_) => CallStatus::Unauthorized,
            Self::Upstream { .. } | Self::IdempotencyInFlight(_) | Self::NotConfigured(_) => {
                CallStatus::Error
            }
        }
    }
}

impl From<BreakerOpen> for GatewayError {
    fn from(open: BreakerOpen) -> Self {
        Self::CircuitOpen {
            breaker: open.breaker,
            retry_at: open.retry_at,
        }
    }
}
