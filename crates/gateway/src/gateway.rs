use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use bastion_audit::{AuditRecord, AuditSink, CallMethod, CallStatus};
use bastion_cache::TieredCache;
use bastion_core::{
    AgentFilter, AgentRecord, BreakerSnapshot, BreakerState, CacheHealth, Clock, Creation,
    NewCreation, RegistryClient, RegistryError, RequestHeaders, SharedClock,
};

use crate::auth::Authenticator;
use crate::background::Scheduler;
use crate::circuit_breaker::CircuitBreaker;
use crate::error::GatewayError;
use crate::idempotency::{IdempotencyManager, KeyInput, KeyMode, derive_key};
use crate::metrics::{GatewayMetrics, MetricsSnapshot};

/// Namespace for idempotency keys sent on unauthenticated writes.
const ANONYMOUS_CALLER: &str = "anonymous";

/// Gateway-level settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// TTL for the typed Registry read helpers.
    pub read_ttl: Duration,
    /// Upper bound on every upstream call. A timeout counts as a failure.
    pub call_timeout: Duration,
    /// Period of the fallback-cache cleanup loop.
    pub cleanup_interval: Duration,
    /// Window for content-derived deduplication of writes that carry no
    /// idempotency key header. `None` disables derived keys.
    pub dedup_window: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            read_ttl: Duration::from_secs(300),
            call_timeout: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(60),
            dedup_window: Some(Duration::from_secs(60)),
        }
    }
}

/// Options for a read through [`Gateway::call`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub cache_key: Option<String>,
    /// TTL for the cached result; the cache default when `None`.
    pub ttl: Option<Duration>,
    pub require_auth: bool,
    pub headers: RequestHeaders,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-through caching under `key`.
    pub fn cached(key: impl Into<String>) -> Self {
        Self {
            cache_key: Some(key.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn require_auth(mut self, require: bool) -> Self {
        self.require_auth = require;
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }
}

/// Content from which an idempotency key is derived when the caller sent none.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    /// `caller_id` is filled from the authenticated caller when left empty.
    pub input: KeyInput,
    pub mode: KeyMode,
}

/// Options for a write through [`Gateway::call_write`].
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub require_auth: bool,
    pub headers: RequestHeaders,
    pub derived_key: Option<DerivedKey>,
    /// Cache keys or glob patterns removed after a first successful write.
    pub invalidate: Vec<String>,
    /// Lifetime of the idempotency record; the manager default when `None`.
    pub ttl: Option<Duration>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require_auth(mut self, require: bool) -> Self {
        self.require_auth = require;
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn derived_key(mut self, input: KeyInput, mode: KeyMode) -> Self {
        self.derived_key = Some(DerivedKey { input, mode });
        self
    }

    #[must_use]
    pub fn invalidate(mut self, pattern: impl Into<String>) -> Self {
        self.invalidate.push(pattern.into());
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Combined health view of the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayHealth {
    pub breaker: BreakerSnapshot,
    pub cache: CacheHealth,
    pub metrics: MetricsSnapshot,
}

/// Per-invocation bookkeeping for the audit record.
struct CallContext<'a> {
    trace_id: String,
    operation: &'a str,
    method: CallMethod,
    started: Instant,
    user: Option<String>,
}

/// Resilient front door to the Registry.
///
/// Every call runs the same pipeline: authentication gate, cache lookup,
/// circuit-breaker check, bounded upstream call, cache population, and one
/// fire-and-forget audit record. Writes additionally pass through the
/// [`IdempotencyManager`] and invalidate related cache entries on success.
///
/// Construct with [`GatewayBuilder`](crate::GatewayBuilder).
pub struct Gateway {
    pub(crate) registry: Option<Arc<dyn RegistryClient>>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) cache: Arc<TieredCache>,
    pub(crate) idempotency: IdempotencyManager,
    pub(crate) authenticator: Option<Arc<dyn Authenticator>>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) audit_tracker: TaskTracker,
    pub(crate) metrics: Arc<GatewayMetrics>,
    pub(crate) scheduler: Scheduler,
    pub(crate) clock: SharedClock,
    pub(crate) config: GatewayConfig,
}

impl Gateway {
    /// Run a read through the resilience pipeline.
    ///
    /// With a cache key, a live cached value is returned without consulting
    /// the breaker; a miss runs `f` and caches its result.
    #[instrument(
        name = "gateway.call",
        skip_all,
        fields(operation = %operation, trace_id = tracing::field::Empty)
    )]
    pub async fn call<T, F, Fut>(
        &self,
        operation: &str,
        f: F,
        options: CallOptions,
    ) -> Result<T, GatewayError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RegistryError>>,
    {
        let mut ctx = self.begin(operation, CallMethod::Get);

        match self.authorize(options.require_auth, &options.headers).await {
            Ok(user) => ctx.user = user,
            Err(e) => return Err(self.fail(&ctx, e)),
        }

        if let Some(key) = &options.cache_key {
            if let Some(value) = self.cache.get::<T>(key).await {
                self.metrics.increment_cache_hits();
                debug!(key, "cache hit");
                self.emit(&ctx, CallStatus::CacheHit, None);
                return Ok(value);
            }
            self.metrics.increment_cache_misses();
        }

        match self.guarded(operation, f).await {
            Ok(value) => {
                if let Some(key) = &options.cache_key {
                    self.cache.set(key, &value, options.ttl).await;
                }
                self.emit(&ctx, CallStatus::Ok, None);
                Ok(value)
            }
            Err(e) => Err(self.fail(&ctx, e)),
        }
    }

    /// Run a write through the resilience pipeline.
    ///
    /// When the request carries an `idempotency-key` header (or a derived key
    /// is supplied) the write executes at most once per key; repeats replay
    /// the first result and skip invalidation.
    #[instrument(
        name = "gateway.call_write",
        skip_all,
        fields(operation = %operation, trace_id = tracing::field::Empty)
    )]
    pub async fn call_write<T, F, Fut>(
        &self,
        operation: &str,
        f: F,
        options: WriteOptions,
    ) -> Result<T, GatewayError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RegistryError>>,
    {
        let mut ctx = self.begin(operation, CallMethod::Post);

        match self.authorize(options.require_auth, &options.headers).await {
            Ok(user) => ctx.user = user,
            Err(e) => return Err(self.fail(&ctx, e)),
        }

        let idempotency_key = match options.headers.idempotency_key() {
            // Caller-chosen keys only collide within one caller's namespace.
            Some(key) => Some(format!(
                "{}:{key}",
                ctx.user.as_deref().unwrap_or(ANONYMOUS_CALLER)
            )),
            None => options.derived_key.map(|DerivedKey { mut input, mode }| {
                if input.caller_id.is_none() {
                    input.caller_id.clone_from(&ctx.user);
                }
                derive_key(&input, mode, self.clock.now())
            }),
        };

        let outcome = match idempotency_key {
            Some(key) => {
                let key = format!("idem:{operation}:{key}");
                self.idempotency
                    .execute(&key, options.ttl, || self.guarded(operation, f))
                    .await
                    .map(|executed| (executed.value, executed.from_cache))
            }
            None => self.guarded(operation, f).await.map(|value| (value, false)),
        };

        match outcome {
            Ok((value, true)) => {
                self.metrics.increment_idempotent_replays();
                self.emit(&ctx, CallStatus::IdempotentReplay, None);
                Ok(value)
            }
            Ok((value, false)) => {
                self.invalidate(&options.invalidate).await;
                self.emit(&ctx, CallStatus::Ok, None);
                Ok(value)
            }
            Err(e) => Err(self.fail(&ctx, e)),
        }
    }

    /// List agents, cached for the read TTL.
    pub async fn get_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, GatewayError> {
        let registry = self.registry("get_agents", CallMethod::Get)?;
        let options = CallOptions::cached(format!("agents:{}", filter.cache_fragment()))
            .ttl(self.config.read_ttl);
        self.call("get_agents", || registry.get_agents(filter), options)
            .await
    }

    /// Fetch one agent, cached for the read TTL.
    pub async fn get_agent(&self, id: &str, include: &[String]) -> Result<AgentRecord, GatewayError> {
        let registry = self.registry("get_agent", CallMethod::Get)?;
        let mut key = format!("agent:{id}:profile");
        if !include.is_empty() {
            key.push(':');
            key.push_str(&include.join(","));
        }
        let options = CallOptions::cached(key).ttl(self.config.read_ttl);
        self.call("get_agent", || registry.get_agent(id, include), options)
            .await
    }

    /// List an agent's creations, cached for the read TTL.
    pub async fn get_creations(&self, agent_id: &str) -> Result<Vec<Creation>, GatewayError> {
        let registry = self.registry("get_creations", CallMethod::Get)?;
        let options =
            CallOptions::cached(format!("agent:{agent_id}:creations")).ttl(self.config.read_ttl);
        self.call(
            "get_creations",
            || registry.get_creations(agent_id),
            options,
        )
        .await
    }

    /// Create a creation for an agent. Requires authentication.
    ///
    /// Deduplicated by the `idempotency-key` header, or by content within the
    /// configured dedup window when no header is sent. A first successful
    /// write invalidates the agent's cached reads and every agent listing.
    pub async fn create_creation(
        &self,
        agent_id: &str,
        body: &NewCreation,
        headers: RequestHeaders,
    ) -> Result<Creation, GatewayError> {
        let registry = self.registry("create_creation", CallMethod::Post)?;
        let mut options = WriteOptions::new()
            .require_auth(true)
            .headers(headers)
            .invalidate(format!("agent:{agent_id}:*"))
            .invalidate("agents:*");

        if let Some(window) = self.config.dedup_window {
            match serde_json::to_value(body) {
                Ok(content) => {
                    options = options.derived_key(
                        KeyInput::new("create_creation", content).subject(agent_id),
                        KeyMode::TimeWindowed { window },
                    );
                }
                Err(e) => warn!(error = %e, "creation body not serializable, no derived key"),
            }
        }

        self.call_write(
            "create_creation",
            || registry.create_creation(agent_id, body),
            options,
        )
        .await
    }

    /// Breaker, cache and counter health in one view.
    pub async fn health(&self) -> GatewayHealth {
        GatewayHealth {
            breaker: self.breaker.snapshot(),
            cache: self.cache.health().await,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Start the periodic purge of expired fallback-cache entries.
    pub fn start_cache_cleanup(&self) {
        let cache = Arc::clone(&self.cache);
        self.scheduler
            .spawn_periodic("cache-cleanup", self.config.cleanup_interval, move || {
                let cache = Arc::clone(&cache);
                async move {
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        debug!(purged, "expired fallback entries purged");
                    }
                }
            });
    }

    /// Stop background loops and wait for pending audit records.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.audit_tracker.close();
        self.audit_tracker.wait().await;
        info!("gateway shutdown complete");
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    pub fn idempotency(&self) -> &IdempotencyManager {
        &self.idempotency
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// The configured Registry client. A missing client still counts and
    /// audits the call as a failed invocation of `operation`.
    fn registry(
        &self,
        operation: &str,
        method: CallMethod,
    ) -> Result<&Arc<dyn RegistryClient>, GatewayError> {
        self.registry.as_ref().ok_or_else(|| {
            let ctx = self.begin(operation, method);
            self.fail(&ctx, GatewayError::NotConfigured("registry client".into()))
        })
    }

    fn begin<'a>(&self, operation: &'a str, method: CallMethod) -> CallContext<'a> {
        self.metrics.increment_calls();
        let trace_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("trace_id", trace_id.as_str());
        CallContext {
            trace_id,
            operation,
            method,
            started: Instant::now(),
            user: None,
        }
    }

    async fn authorize(
        &self,
        required: bool,
        headers: &RequestHeaders,
    ) -> Result<Option<String>, GatewayError> {
        if !required {
            return Ok(None);
        }
        let Some(authenticator) = &self.authenticator else {
            return Err(GatewayError::NotConfigured("authenticator".into()));
        };

        let outcome = authenticator.authenticate(headers).await;
        if outcome.authenticated {
            Ok(outcome.user.map(|u| u.id))
        } else {
            self.metrics.increment_auth_failures();
            Err(GatewayError::Authentication(
                outcome
                    .error
                    .unwrap_or_else(|| "authentication required".into()),
            ))
        }
    }

    /// Breaker check, bounded upstream call, breaker accounting.
    async fn guarded<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RegistryError>>,
    {
        if let Err(open) = self.breaker.check_before_call() {
            self.metrics.increment_circuit_open();
            debug!(retry_at = %open.retry_at, "rejected by open circuit");
            return Err(open.into());
        }

        let outcome = match tokio::time::timeout(self.config.call_timeout, f()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RegistryError::Timeout(self.config.call_timeout)),
        };

        match outcome {
            Ok(value) => {
                self.metrics.increment_upstream_successes();
                self.note_transition(self.breaker.on_success());
                Ok(value)
            }
            Err(e) => {
                self.metrics.increment_upstream_failures();
                // Client errors prove the upstream is answering.
                let transition = if e.counts_against_breaker() {
                    self.breaker.on_failure()
                } else {
                    self.breaker.on_success()
                };
                self.note_transition(transition);
                warn!(error = %e, "upstream call failed");
                Err(GatewayError::upstream(operation, e))
            }
        }
    }

    fn note_transition(&self, transition: Option<(BreakerState, BreakerState)>) {
        if transition.is_some() {
            self.metrics.increment_circuit_transitions();
        }
    }

    async fn invalidate(&self, patterns: &[String]) {
        let mut removed = 0;
        for pattern in patterns {
            removed += if pattern.contains(['*', '?']) {
                self.cache.invalidate_pattern(pattern).await
            } else {
                usize::from(self.cache.invalidate(pattern).await)
            };
        }
        if removed > 0 {
            debug!(removed, "cache entries invalidated after write");
        }
        self.metrics.add_invalidated_keys(removed);
    }

    fn fail(&self, ctx: &CallContext<'_>, error: GatewayError) -> GatewayError {
        self.emit(ctx, error.audit_status(), Some(&error));
        error
    }

    fn emit(&self, ctx: &CallContext<'_>, status: CallStatus, error: Option<&GatewayError>) {
        let mut record = AuditRecord::new(
            ctx.trace_id.as_str(),
            ctx.operation,
            ctx.method,
            status,
            self.clock.now(),
        )
        .with_duration(ctx.started.elapsed())
        .with_user(ctx.user.clone());
        if let Some(e) = error {
            record = record.with_error(e.to_string(), Some(e.status_code()));
        }

        let audit = Arc::clone(&self.audit);
        self.audit_tracker.spawn(async move {
            if let Err(e) = audit.record(record).await {
                warn!(error = %e, "audit recording failed");
            }
        });
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("breaker", &self.breaker)
            .field("cache", &self.cache)
            .field("config", &self.config)
            .field("registry", &self.registry.is_some())
            .field("authenticator", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use bastion_audit::MemoryAuditSink;

    use super::*;
    use crate::builder::GatewayBuilder;

    fn gateway_with_sink() -> (Gateway, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let gateway = GatewayBuilder::new()
            .audit(sink.clone())
            .build()
            .unwrap();
        (gateway, sink)
    }

    #[tokio::test]
    async fn uncached_call_runs_upstream_and_audits() {
        let (gw, sink) = gateway_with_sink();
        let value: u32 = gw
            .call("ping", || async { Ok(7) }, CallOptions::new())
            .await
            .unwrap();
        assert_eq!(value, 7);

        gw.shutdown().await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "ping");
        assert_eq!(records[0].status, CallStatus::Ok);
        assert_eq!(records[0].method, CallMethod::Get);
    }

    #[tokio::test]
    async fn typed_helpers_need_a_registry() {
        let (gw, sink) = gateway_with_sink();
        let err = gw.get_agents(&AgentFilter::default()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConfigured(_)));
        let body = NewCreation {
            title: "Sunrise".into(),
            media_uri: None,
            metadata: serde_json::Value::Null,
        };
        let err = gw
            .create_creation("a1", &body, RequestHeaders::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(gw.metrics().snapshot().calls, 2);

        gw.shutdown().await;
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.by_status(CallStatus::Error).len(), 2);
        let write = sink.by_operation("create_creation");
        assert_eq!(write.len(), 1);
        assert_eq!(write[0].method, CallMethod::Post);
    }

    #[tokio::test]
    async fn auth_without_authenticator_is_not_configured() {
        let (gw, sink) = gateway_with_sink();
        let err = gw
            .call::<u32, _, _>(
                "secret",
                || async { Ok(1) },
                CallOptions::new().require_auth(true),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotConfigured(_)));

        gw.shutdown().await;
        assert_eq!(sink.records()[0].status, CallStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upstream_times_out_and_counts_as_failure() {
        let sink = Arc::new(MemoryAuditSink::new());
        let gw = GatewayBuilder::new()
            .audit(sink.clone())
            .config(GatewayConfig {
                call_timeout: Duration::from_millis(100),
                ..GatewayConfig::default()
            })
            .build()
            .unwrap();

        let err = gw
            .call::<u32, _, _>(
                "slow",
                || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(1)
                },
                CallOptions::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Upstream {
                source: RegistryError::Timeout(_),
                ..
            }
        ));
        assert_eq!(gw.breaker().snapshot().failure_count, 1);
        gw.shutdown().await;
        assert_eq!(sink.records()[0].status_code, Some(504));
    }

    #[tokio::test]
    async fn client_errors_do_not_trip_the_breaker() {
        let (gw, _) = gateway_with_sink();
        for _ in 0..10 {
            let _ = gw
                .call::<u32, _, _>(
                    "missing",
                    || async { Err(RegistryError::NotFound("x".into())) },
                    CallOptions::new(),
                )
                .await;
        }
        assert_eq!(gw.breaker().snapshot().failure_count, 0);
        assert_eq!(gw.metrics().snapshot().upstream_failures, 10);
    }

    #[tokio::test]
    async fn health_combines_components() {
        let (gw, _) = gateway_with_sink();
        let _: u32 = gw
            .call("ping", || async { Ok(1) }, CallOptions::new())
            .await
            .unwrap();
        let health = gw.health().await;
        assert_eq!(health.metrics.calls, 1);
        assert_eq!(health.breaker.state, BreakerState::Closed);
        assert!(!health.cache.distributed_configured);
    }
}
