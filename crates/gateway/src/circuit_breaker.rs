use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use bastion_core::{BreakerSnapshot, BreakerState, SharedClock, system_clock};

/// Configuration for the circuit breaker guarding the Registry.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe call is allowed.
    pub recovery_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Validate configuration values.
    ///
    /// - `failure_threshold` must be >= 1
    /// - `recovery_timeout` must be non-zero, so an open circuit always has a
    ///   retry time strictly after its last failure
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold < 1 {
            return Err("failure_threshold must be >= 1".into());
        }
        if self.recovery_timeout.is_zero() {
            return Err("recovery_timeout must be > 0".into());
        }
        Ok(())
    }

    fn recovery_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.recovery_timeout).unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Returned when the breaker refuses a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerOpen {
    pub breaker: String,
    /// Earliest time a probe call will be admitted.
    pub retry_at: DateTime<Utc>,
}

/// Mutable breaker state. `is_open` implies `next_retry_time > last_failure_time`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub is_open: bool,
    pub next_retry_time: Option<DateTime<Utc>>,
    /// Start time of the outstanding half-open probe, if any. Transient: the
    /// half-open state itself is never stored.
    probe_started: Option<DateTime<Utc>>,
}

/// Circuit breaker for the single upstream dependency.
///
/// - `Closed` -> `Open` when consecutive failures reach the threshold
/// - `Open` -> half-open probe once `next_retry_time` has passed; exactly one
///   call is admitted and every other call fails fast
/// - probe success -> `Closed`; probe failure -> `Open` with a new retry time
///
/// A probe whose caller never reports back (e.g. the future was dropped) is
/// superseded after one recovery timeout.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: SharedClock,
    data: RwLock<CircuitBreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            clock: system_clock(),
            data: RwLock::new(CircuitBreakerState::default()),
        }
    }

    /// Replace the clock used for retry-time decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Decide whether a call may proceed.
    ///
    /// Fails fast while the circuit is open and the retry time has not been
    /// reached, or while another caller's probe is outstanding. Once the retry
    /// time has passed, the first caller is admitted as the half-open probe:
    /// the failure count is reset and the open flag cleared.
    pub fn check_before_call(&self) -> Result<(), BreakerOpen> {
        let now = self.clock.now();
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(started) = data.probe_started {
            let deadline = started
                .checked_add_signed(self.config.recovery_delta())
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if now < deadline {
                return Err(self.rejection(deadline));
            }
            debug!(breaker = %self.name, "stale half-open probe superseded");
            data.probe_started = Some(now);
            return Ok(());
        }

        if !data.is_open {
            return Ok(());
        }

        let retry_at = data.next_retry_time.unwrap_or(now);
        if now < retry_at {
            return Err(self.rejection(retry_at));
        }

        info!(
            breaker = %self.name,
            failures = data.failure_count,
            threshold = self.config.failure_threshold,
            "circuit breaker half-open, admitting probe call"
        );
        data.failure_count = 0;
        data.is_open = false;
        data.probe_started = Some(now);
        Ok(())
    }

    /// Record a successful call.
    ///
    /// Returns `Some((from, to))` if a state transition occurred.
    pub fn on_success(&self) -> Option<(BreakerState, BreakerState)> {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let was_probe = data.probe_started.take().is_some();
        let was_open = data.is_open;
        data.failure_count = 0;
        data.is_open = false;

        if was_probe {
            info!(breaker = %self.name, "circuit breaker closing after successful probe");
            Some((BreakerState::HalfOpen, BreakerState::Closed))
        } else if was_open {
            info!(breaker = %self.name, "circuit breaker closing");
            Some((BreakerState::Open, BreakerState::Closed))
        } else {
            None
        }
    }

    /// Record a failed call.
    ///
    /// Returns `Some((from, to))` if a state transition occurred. The caller
    /// still owns the error and propagates it.
    pub fn on_failure(&self) -> Option<(BreakerState, BreakerState)> {
        let now = self.clock.now();
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        data.failure_count = data.failure_count.saturating_add(1);
        data.last_failure_time = Some(now);

        if data.probe_started.take().is_some() {
            self.open(&mut data, now);
            info!(
                breaker = %self.name,
                next_retry = ?data.next_retry_time,
                "circuit breaker re-opening after half-open probe failure"
            );
            return Some((BreakerState::HalfOpen, BreakerState::Open));
        }

        if data.is_open {
            // Late failures from calls admitted before opening push the retry out.
            self.open(&mut data, now);
            return None;
        }

        if data.failure_count >= self.config.failure_threshold {
            self.open(&mut data, now);
            info!(
                breaker = %self.name,
                failures = data.failure_count,
                threshold = self.config.failure_threshold,
                next_retry = ?data.next_retry_time,
                "circuit breaker opening"
            );
            return Some((BreakerState::Closed, BreakerState::Open));
        }

        debug!(
            breaker = %self.name,
            failures = data.failure_count,
            threshold = self.config.failure_threshold,
            "upstream failure recorded"
        );
        None
    }

    /// Force the circuit open, as if the threshold had just been reached.
    pub fn trip(&self) {
        let now = self.clock.now();
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        data.failure_count = data.failure_count.max(self.config.failure_threshold);
        data.last_failure_time = Some(now);
        data.probe_started = None;
        self.open(&mut data, now);
        info!(breaker = %self.name, "circuit breaker tripped manually");
    }

    /// Reset the breaker to its initial closed state.
    pub fn reset(&self) {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let was_open = data.is_open;
        *data = CircuitBreakerState::default();
        if was_open {
            info!(breaker = %self.name, "circuit breaker reset");
        }
    }

    /// Current state without triggering transitions.
    pub fn state(&self) -> BreakerState {
        let data = self
            .data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::derive_state(&data)
    }

    /// Copy of the raw state.
    pub fn raw_state(&self) -> CircuitBreakerState {
        self.data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let data = self
            .data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        BreakerSnapshot {
            name: self.name.clone(),
            state: Self::derive_state(&data),
            failure_count: data.failure_count,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_ms: u64::try_from(self.config.recovery_timeout.as_millis())
                .unwrap_or(u64::MAX),
            last_failure_time: data.last_failure_time,
            next_retry_time: data.next_retry_time,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn derive_state(data: &CircuitBreakerState) -> BreakerState {
        if data.probe_started.is_some() {
            BreakerState::HalfOpen
        } else if data.is_open {
            BreakerState::Open
        } else {
            BreakerState::Closed
        }
    }

    fn open(&self, data: &mut CircuitBreakerState, now: DateTime<Utc>) {
        data.is_open = true;
        data.next_retry_time = Some(
            now.checked_add_signed(self.config.recovery_delta())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
    }

    fn rejection(&self, retry_at: DateTime<Utc>) -> BreakerOpen {
        BreakerOpen {
            breaker: self.name.clone(),
            retry_at,
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self
            .data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &Self::derive_state(&data))
            .field("failure_count", &data.failure_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bastion_core::{Clock, ManualClock};

    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }

    fn breaker(clock: &Arc<ManualClock>) -> CircuitBreaker {
        CircuitBreaker::new("registry", config()).with_clock(clock.clone())
    }

    fn fail_n(cb: &CircuitBreaker, n: u32) {
        for _ in 0..n {
            cb.check_before_call().unwrap();
            cb.on_failure();
        }
    }

    // -- config ---------------------------------------------------------------

    #[test]
    fn default_config_values() {
        let cfg = CircuitBreakerConfig::default();
        assert_eq!(cfg.failure_threshold, 5);
        assert_eq!(cfg.recovery_timeout, Duration::from_secs(30));
    }

    #[test]
    fn config_validation_rejects_zero_failure_threshold() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 0,
            ..config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_validation_rejects_zero_recovery_timeout() {
        let cfg = CircuitBreakerConfig {
            recovery_timeout: Duration::ZERO,
            ..config()
        };
        assert!(cfg.validate().is_err());
        assert!(config().validate().is_ok());
    }

    // -- transitions ----------------------------------------------------------

    #[test]
    fn starts_closed() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.check_before_call().is_ok());
    }

    #[test]
    fn stays_closed_below_threshold() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        fail_n(&cb, 2);
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.raw_state().failure_count, 2);
    }

    #[test]
    fn opens_at_threshold_with_retry_time() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        fail_n(&cb, 2);
        cb.check_before_call().unwrap();
        assert_eq!(
            cb.on_failure(),
            Some((BreakerState::Closed, BreakerState::Open))
        );

        let raw = cb.raw_state();
        assert!(raw.is_open);
        assert_eq!(
            raw.next_retry_time,
            Some(clock.now() + chrono::Duration::seconds(30))
        );
        assert!(raw.next_retry_time > raw.last_failure_time);
    }

    #[test]
    fn rejects_before_retry_time() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        fail_n(&cb, 3);

        clock.advance(Duration::from_secs(29));
        let err = cb.check_before_call().unwrap_err();
        assert_eq!(err.breaker, "registry");
        assert_eq!(err.retry_at, cb.raw_state().next_retry_time.unwrap());
    }

    #[test]
    fn success_resets_failure_count() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        fail_n(&cb, 2);
        assert_eq!(cb.on_success(), None);
        assert_eq!(cb.raw_state().failure_count, 0);

        fail_n(&cb, 2);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn admits_exactly_one_probe_after_retry_time() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        fail_n(&cb, 3);
        clock.advance(Duration::from_secs(30));

        assert!(cb.check_before_call().is_ok());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        let raw = cb.raw_state();
        assert_eq!(raw.failure_count, 0);
        assert!(!raw.is_open);

        assert!(cb.check_before_call().is_err(), "second caller must fail fast");
    }

    #[test]
    fn probe_success_closes() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        fail_n(&cb, 3);
        clock.advance(Duration::from_secs(30));
        cb.check_before_call().unwrap();

        assert_eq!(
            cb.on_success(),
            Some((BreakerState::HalfOpen, BreakerState::Closed))
        );
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.check_before_call().is_ok());
    }

    #[test]
    fn probe_failure_reopens_and_extends_retry() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        fail_n(&cb, 3);
        let first_retry = cb.raw_state().next_retry_time.unwrap();

        clock.advance(Duration::from_secs(31));
        cb.check_before_call().unwrap();
        assert_eq!(
            cb.on_failure(),
            Some((BreakerState::HalfOpen, BreakerState::Open))
        );

        let raw = cb.raw_state();
        assert!(raw.is_open);
        assert!(raw.next_retry_time.unwrap() > first_retry);
        assert!(cb.check_before_call().is_err());
    }

    #[test]
    fn abandoned_probe_is_superseded_after_timeout() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        fail_n(&cb, 3);
        clock.advance(Duration::from_secs(30));
        cb.check_before_call().unwrap();

        clock.advance(Duration::from_secs(29));
        assert!(cb.check_before_call().is_err());

        clock.advance(Duration::from_secs(1));
        assert!(cb.check_before_call().is_ok());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn late_failure_while_open_keeps_invariant() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        fail_n(&cb, 3);

        clock.advance(Duration::from_secs(10));
        assert_eq!(cb.on_failure(), None);
        let raw = cb.raw_state();
        assert!(raw.is_open);
        assert!(raw.next_retry_time > raw.last_failure_time);
    }

    #[test]
    fn trip_and_reset() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);

        cb.trip();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.check_before_call().is_err());
        assert_eq!(cb.snapshot().failure_count, 3);

        cb.reset();
        assert_eq!(cb.raw_state(), CircuitBreakerState::default());
        assert!(cb.check_before_call().is_ok());
    }

    #[test]
    fn snapshot_reports_config_and_times() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = breaker(&clock);
        fail_n(&cb, 3);

        let snap = cb.snapshot();
        assert_eq!(snap.name, "registry");
        assert_eq!(snap.state, BreakerState::Open);
        assert_eq!(snap.failure_threshold, 3);
        assert_eq!(snap.recovery_timeout_ms, 30_000);
        assert_eq!(snap.last_failure_time, Some(clock.now()));
    }

    #[test]
    fn concurrent_checks_admit_single_probe() {
        let clock = Arc::new(ManualClock::starting_now());
        let cb = Arc::new(breaker(&clock));
        fail_n(&cb, 3);
        clock.advance(Duration::from_secs(30));

        let admitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let cb = Arc::clone(&cb);
                    s.spawn(move || usize::from(cb.check_before_call().is_ok()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(admitted, 1);
    }
}
