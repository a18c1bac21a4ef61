//! Thread-safe metrics collection system
//!
//! Atomic counters for the message pipeline, the webhook publisher and the
//! MQTT listeners, plus a bounded window of dispatch latencies.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and a mutex-protected sample window
pub struct MetricsCollector {
    // Pipeline
    messages_received: AtomicU64,
    subscriptions_matched: AtomicU64,
    messages_filtered: AtomicU64,
    hydration_failures: AtomicU64,
    render_fallbacks: AtomicU64,

    // Publisher
    webhooks_queued: AtomicU64,
    webhooks_delivered: AtomicU64,
    webhooks_rejected: AtomicU64,
    webhooks_failed: AtomicU64,
    dispatch_times: Mutex<VecDeque<u64>>, // milliseconds

    // MQTT
    connected_brokers: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            subscriptions_matched: AtomicU64::new(0),
            messages_filtered: AtomicU64::new(0),
            hydration_failures: AtomicU64::new(0),
            render_fallbacks: AtomicU64::new(0),
            webhooks_queued: AtomicU64::new(0),
            webhooks_delivered: AtomicU64::new(0),
            webhooks_rejected: AtomicU64::new(0),
            webhooks_failed: AtomicU64::new(0),
            dispatch_times: Mutex::new(VecDeque::new()),
            connected_brokers: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriptions_matched(&self, count: usize) {
        self.subscriptions_matched
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn message_filtered(&self) {
        self.messages_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hydration_failed(&self) {
        self.hydration_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_fell_back(&self) {
        self.render_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_queued(&self) {
        self.webhooks_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed request; `success` is false for non-2xx responses
    pub fn webhook_completed(&self, duration: Duration, success: bool) {
        if success {
            self.webhooks_delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.webhooks_rejected.fetch_add(1, Ordering::Relaxed);
        }
        self.record_dispatch_time(duration);
    }

    /// Record a request that never produced a response
    pub fn webhook_failed(&self) {
        self.webhooks_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dispatch_time(&self, duration: Duration) {
        if let Ok(mut times) = self.dispatch_times.lock() {
            times.push_back(duration.as_millis() as u64);
            if times.len() > MAX_LATENCY_SAMPLES {
                times.pop_front();
            }
        }
    }

    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.connected_brokers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a previously connected broker as gone
    pub fn mqtt_connection_lost(&self) {
        let _ = self
            .connected_brokers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.messages_received,
            &self.subscriptions_matched,
            &self.messages_filtered,
            &self.hydration_failures,
            &self.render_fallbacks,
            &self.webhooks_queued,
            &self.webhooks_delivered,
            &self.webhooks_rejected,
            &self.webhooks_failed,
            &self.connected_brokers,
            &self.connections_established,
            &self.connection_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut times) = self.dispatch_times.lock() {
            times.clear();
        }
    }

    fn dispatch_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.dispatch_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted: Vec<u64> = times.iter().copied().collect();
        sorted.sort_unstable();

        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        (
            avg,
            percentile(&sorted, 50.0),
            percentile(&sorted, 95.0),
            percentile(&sorted, 99.0),
        )
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95, p99) = self.dispatch_time_statistics();

        MetricsSnapshot {
            pipeline: PipelineMetrics {
                messages_received: self.messages_received.load(Ordering::Relaxed),
                subscriptions_matched: self.subscriptions_matched.load(Ordering::Relaxed),
                messages_filtered: self.messages_filtered.load(Ordering::Relaxed),
                hydration_failures: self.hydration_failures.load(Ordering::Relaxed),
                render_fallbacks: self.render_fallbacks.load(Ordering::Relaxed),
            },
            webhooks: WebhookMetrics {
                queued: self.webhooks_queued.load(Ordering::Relaxed),
                delivered: self.webhooks_delivered.load(Ordering::Relaxed),
                rejected: self.webhooks_rejected.load(Ordering::Relaxed),
                failed: self.webhooks_failed.load(Ordering::Relaxed),
                avg_dispatch_time_ms: avg,
                dispatch_time_p50_ms: p50,
                dispatch_time_p95_ms: p95,
                dispatch_time_p99_ms: p99,
            },
            mqtt: MqttMetrics {
                connected_brokers: self.connected_brokers.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
            },
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub pipeline: PipelineMetrics,
    pub webhooks: WebhookMetrics,
    pub mqtt: MqttMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct PipelineMetrics {
    pub messages_received: u64,
    pub subscriptions_matched: u64,
    pub messages_filtered: u64,
    pub hydration_failures: u64,
    pub render_fallbacks: u64,
}

#[derive(Debug, Serialize)]
pub struct WebhookMetrics {
    pub queued: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub failed: u64,
    pub avg_dispatch_time_ms: f64,
    pub dispatch_time_p50_ms: f64,
    pub dispatch_time_p95_ms: f64,
    pub dispatch_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected_brokers: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
}

fn current_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower = sorted_data[index.floor() as usize] as f64;
        let upper = sorted_data[index.ceil() as usize] as f64;
        lower + (upper - lower) * index.fract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pipeline_metrics() {
        let collector = MetricsCollector::new();

        collector.message_received();
        collector.subscriptions_matched(3);
        collector.message_filtered();
        collector.hydration_failed();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.pipeline.messages_received, 1);
        assert_eq!(metrics.pipeline.subscriptions_matched, 3);
        assert_eq!(metrics.pipeline.messages_filtered, 1);
        assert_eq!(metrics.pipeline.hydration_failures, 1);
    }

    #[test]
    fn test_webhook_metrics() {
        let collector = MetricsCollector::new();

        collector.webhook_queued();
        collector.webhook_queued();
        collector.webhook_completed(Duration::from_millis(100), true);
        collector.webhook_completed(Duration::from_millis(300), false);
        collector.webhook_failed();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.webhooks.queued, 2);
        assert_eq!(metrics.webhooks.delivered, 1);
        assert_eq!(metrics.webhooks.rejected, 1);
        assert_eq!(metrics.webhooks.failed, 1);
        assert_eq!(metrics.webhooks.avg_dispatch_time_ms, 200.0);
    }

    #[test]
    fn test_connection_lost_never_underflows() {
        let collector = MetricsCollector::new();
        collector.mqtt_connection_lost();
        assert_eq!(collector.get_metrics().mqtt.connected_brokers, 0);

        collector.mqtt_connection_established();
        collector.mqtt_connection_lost();
        let metrics = collector.get_metrics();
        assert_eq!(metrics.mqtt.connected_brokers, 0);
        assert_eq!(metrics.mqtt.connections_established, 1);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let collector = MetricsCollector::new();
        for i in 0..(MAX_LATENCY_SAMPLES + 50) {
            collector.webhook_completed(Duration::from_millis(i as u64), true);
        }
        let len = collector.dispatch_times.lock().unwrap().len();
        assert_eq!(len, MAX_LATENCY_SAMPLES);
    }

    #[test]
    fn test_percentile() {
        let data = vec![10, 20, 30, 40, 50];
        assert_eq!(percentile(&data, 50.0), 30.0);
        assert_eq!(percentile(&data, 0.0), 10.0);
        assert_eq!(percentile(&data, 100.0), 50.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector.message_received();
                        collector.webhook_queued();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.get_metrics();
        assert_eq!(metrics.pipeline.messages_received, 1000);
        assert_eq!(metrics.webhooks.queued, 1000);
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();
        collector.message_received();
        collector.webhook_completed(Duration::from_millis(5), true);
        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.pipeline.messages_received, 0);
        assert_eq!(metrics.webhooks.delivered, 0);
        assert_eq!(metrics.webhooks.avg_dispatch_time_ms, 0.0);
    }
}
