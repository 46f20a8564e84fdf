use std::sync::Arc;

use tracing::debug;

use bastion_gateway::Scheduler;

use crate::engine::AlertEngine;
use crate::metrics::MetricsCollector;

/// Timer loop driving an [`AlertEngine`].
///
/// Every tick collects a snapshot, evaluates and dispatches, then prunes
/// resolved alerts past the retention window.
pub struct AlertMonitor;

impl AlertMonitor {
    /// Spawn the loop on `scheduler`; it stops when the scheduler shuts down.
    pub fn start(
        scheduler: &Scheduler,
        engine: Arc<AlertEngine>,
        collector: Arc<dyn MetricsCollector>,
    ) {
        let interval = engine.config().check_interval;
        scheduler.spawn_periodic("alert-monitor", interval, move || {
            let engine = Arc::clone(&engine);
            let collector = Arc::clone(&collector);
            async move {
                let metrics = collector.collect().await;
                let reports = engine.process(&metrics).await;
                let pruned = engine.prune_resolved(engine.config().resolved_retention);
                debug!(fired = reports.len(), pruned, "alert check complete");
            }
        });
    }
}
