//! Prometheus metrics for the hub and the watch bridge

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metrics shared by the hub and watch units
#[derive(Debug, Clone)]
pub struct DashboardMetrics {
    /// Messages dropped, labelled `publisher_full` or `observer_full`
    pub hub_dropped_messages: IntCounterVec,

    /// Currently registered observers
    pub hub_observers: IntGauge,

    /// Watch events translated, by resource type
    pub watch_events: IntCounterVec,

    /// Watch reconnects after a failed open or stream, by resource type
    pub watch_reconnects: IntCounterVec,
}

impl DashboardMetrics {
    /// Create and register dashboard metrics
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let hub_dropped_messages = IntCounterVec::new(
            Opts::new("dashboard_hub_dropped_messages_total", "Messages dropped by the broadcast hub"),
            &["reason"],
        )?;
        registry.register(Box::new(hub_dropped_messages.clone()))?;

        let hub_observers = IntGauge::new("dashboard_hub_observers", "Observers registered with the hub")?;
        registry.register(Box::new(hub_observers.clone()))?;

        let watch_events = IntCounterVec::new(
            Opts::new("dashboard_watch_events_total", "Watch events published to the hub"),
            &["resource"],
        )?;
        registry.register(Box::new(watch_events.clone()))?;

        let watch_reconnects = IntCounterVec::new(
            Opts::new("dashboard_watch_reconnects_total", "Watch reconnects after a failed open or stream"),
            &["resource"],
        )?;
        registry.register(Box::new(watch_reconnects.clone()))?;

        Ok(Self {
            hub_dropped_messages,
            hub_observers,
            watch_events,
            watch_reconnects,
        })
    }

    /// Unregistered metrics for tests
    #[cfg(test)]
    pub fn detached() -> Self {
        Self::register(&Registry::new()).unwrap()
    }
}

/// Export metrics in Prometheus text format
pub fn export(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
