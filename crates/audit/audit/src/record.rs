use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a gateway call reads or writes upstream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallMethod {
    Get,
    Post,
}

impl CallMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl std::fmt::Display for CallMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a gateway call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// The upstream call ran and succeeded.
    Ok,
    /// Served from cache without touching the breaker or upstream.
    CacheHit,
    /// A write whose stored result was replayed for a repeated key.
    IdempotentReplay,
    /// The upstream call ran and failed (including timeouts).
    Error,
    /// Rejected by an open circuit breaker.
    CircuitOpen,
    /// Rejected by the authentication gate.
    Unauthorized,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::CacheHit => "cache_hit",
            Self::IdempotentReplay => "idempotent_replay",
            Self::Error => "error",
            Self::CircuitOpen => "circuit_open",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// HTTP-style status code reported alongside the outcome.
    ///
    /// Upstream errors carry their own code, so they have no default here.
    pub fn default_status_code(self) -> Option<u16> {
        match self {
            Self::Ok | Self::CacheHit | Self::IdempotentReplay => Some(200),
            Self::CircuitOpen => Some(503),
            Self::Unauthorized => Some(401),
            Self::Error => None,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::CacheHit | Self::IdempotentReplay)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured record per gateway invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Unique identifier for this record (UUID v7).
    pub id: String,
    /// Trace id generated for the invocation.
    pub trace_id: String,
    /// Logical operation name (e.g. `get_agents`).
    pub operation: String,
    pub method: CallMethod,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Wall time spent inside the gateway, in milliseconds.
    pub duration_ms: u64,
    /// Identity of the authenticated caller, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Start a record with a fresh id and the status's default code.
    pub fn new(
        trace_id: impl Into<String>,
        operation: impl Into<String>,
        method: CallMethod,
        status: CallStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            trace_id: trace_id.into(),
            operation: operation.into(),
            method,
            status,
            status_code: status.default_status_code(),
            duration_ms: 0,
            user_id: None,
            error: None,
            timestamp,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, elapsed: std::time::Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>, status_code: Option<u16>) -> Self {
        self.error = Some(error.into());
        if status_code.is_some() {
            self.status_code = status_code;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_takes_default_status_code() {
        let rec = AuditRecord::new("t1", "get_agents", CallMethod::Get, CallStatus::CacheHit, Utc::now());
        assert_eq!(rec.status_code, Some(200));
        assert!(!rec.id.is_empty());
        assert_ne!(rec.id, rec.trace_id);

        let rec = AuditRecord::new("t2", "op", CallMethod::Get, CallStatus::CircuitOpen, Utc::now());
        assert_eq!(rec.status_code, Some(503));
    }

    #[test]
    fn error_overrides_status_code_only_when_given() {
        let rec = AuditRecord::new("t", "op", CallMethod::Post, CallStatus::Error, Utc::now())
            .with_error("boom", Some(502));
        assert_eq!(rec.status_code, Some(502));
        assert_eq!(rec.error.as_deref(), Some("boom"));

        let rec = AuditRecord::new("t", "op", CallMethod::Post, CallStatus::Unauthorized, Utc::now())
            .with_error("missing token", None);
        assert_eq!(rec.status_code, Some(401));
    }

    #[test]
    fn serializes_camel_case_and_omits_empty_fields() {
        let rec = AuditRecord::new("t", "get_agent", CallMethod::Get, CallStatus::Ok, Utc::now())
            .with_duration(std::time::Duration::from_millis(42));
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["traceId"], "t");
        assert_eq!(json["method"], "GET");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["durationMs"], 42);
        assert!(json.get("userId").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn success_classification() {
        assert!(CallStatus::IdempotentReplay.is_success());
        assert!(!CallStatus::CircuitOpen.is_success());
        assert_eq!(CallStatus::IdempotentReplay.to_string(), "idempotent_replay");
    }
}
