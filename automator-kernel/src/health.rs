use crate::locks::{new_state, Shared};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomatorHealth {
    pub uptime_seconds: u64,
    pub jobs_accepted: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub queue_depth: usize,
    pub memory_usage_mb: f32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    jobs_accepted: Arc<AtomicU64>,
    jobs_succeeded: Arc<AtomicU64>,
    jobs_failed: Arc<AtomicU64>,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Shared<String>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            jobs_accepted: Arc::new(AtomicU64::new(0)),
            jobs_succeeded: Arc::new(AtomicU64::new(0)),
            jobs_failed: Arc::new(AtomicU64::new(0)),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: new_state("disabled".to_string()),
        }
    }

    pub fn record_accepted(&self) {
        self.jobs_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_succeeded(&self) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_mqtt_connecting(&self) {
        *self.mqtt_status.lock() = "connecting".to_string();
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn get_health(&self, queue_depth: usize) -> AutomatorHealth {
        AutomatorHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            jobs_accepted: self.jobs_accepted.load(Ordering::Relaxed),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            queue_depth,
            memory_usage_mb: get_memory_usage_mb(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Resident memory of this process; 0 when the OS won't tell us.
fn get_memory_usage_mb() -> f32 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0.0;
    };
    let mut sys = sysinfo::System::new();
    if !sys.refresh_process(pid) {
        return 0.0;
    }
    sys.process(pid)
        .map(|p| p.memory() as f32 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let health = HealthTracker::new();
        health.record_accepted();
        health.record_accepted();
        health.record_succeeded();
        health.record_failed();

        let snapshot = health.clone().get_health(3);
        assert_eq!(snapshot.jobs_accepted, 2);
        assert_eq!(snapshot.jobs_succeeded, 1);
        assert_eq!(snapshot.jobs_failed, 1);
        assert_eq!(snapshot.queue_depth, 3);
        assert_eq!(snapshot.mqtt_status, "disabled");
    }

    #[test]
    fn test_mqtt_status_transitions() {
        let health = HealthTracker::new();
        health.mark_mqtt_connecting();
        assert_eq!(health.get_health(0).mqtt_status, "connecting");
        health.increment_reconnects();
        let snapshot = health.get_health(0);
        assert_eq!(snapshot.mqtt_status, "reconnecting");
        assert_eq!(snapshot.mqtt_reconnects, 1);
        health.mark_mqtt_connected();
        assert_eq!(health.get_health(0).mqtt_status, "connected");
    }
}
