/// Errors that can occur while delivering an audit record.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// An error from the underlying sink.
    #[error("sink error: {0}")]
    Sink(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
