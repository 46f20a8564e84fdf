pub mod agent;
pub mod caller;
pub mod clock;
pub mod headers;
pub mod health;
pub mod registry;

pub use agent::{AgentFilter, AgentRecord, Creation, NewCreation, Provenance};
pub use caller::{AuthOutcome, Caller};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use headers::{IDEMPOTENCY_KEY_HEADER, RequestHeaders};
pub use health::{BreakerSnapshot, BreakerState, CacheHealth, ReconciliationSummary};
pub use registry::{RegistryClient, RegistryError};
