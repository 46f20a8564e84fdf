use std::time::Duration;

use thiserror::Error;

/// Errors raised by a supplemental data source.
///
/// The engine never surfaces these to its caller; any of them turns a pass
/// into a fallback pass.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The source could not be reached.
    #[error("supplemental source unavailable: {0}")]
    Unavailable(String),

    /// The source answered with something other than a record list.
    #[error("supplemental source returned an invalid response: {0}")]
    Decode(String),

    /// The fetch did not finish in time.
    #[error("supplemental fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl SourceError {
    /// Returns `true` if a later fetch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SourceError::Unavailable("refused".into()).is_retryable());
        assert!(SourceError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!SourceError::Decode("not a list".into()).is_retryable());
    }
}
