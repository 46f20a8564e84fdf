use thiserror::Error;

/// Errors raised by a single alert channel.
///
/// A channel failure is isolated to that channel and reported in the
/// dispatch report; it never blocks other channels.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Writing to a local sink failed.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid channel configuration: {0}")]
    Configuration(String),
}

/// Errors raised when managing alert rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertError {
    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("invalid rule {id}: {reason}")]
    InvalidRule { id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_display() {
        let err = ChannelError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "unexpected status 502: bad gateway");
    }

    #[test]
    fn invalid_rule_display() {
        let err = AlertError::InvalidRule {
            id: "r1".into(),
            reason: "empty name".into(),
        };
        assert_eq!(err.to_string(), "invalid rule r1: empty name");
    }
}
