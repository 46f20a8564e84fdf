pub mod error;
pub mod log;
pub mod memory;
pub mod record;
pub mod sink;

pub use error::AuditError;
pub use log::LogAuditSink;
pub use memory::MemoryAuditSink;
pub use record::{AuditRecord, CallMethod, CallStatus};
pub use sink::AuditSink;
