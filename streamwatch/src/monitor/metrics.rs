//! Per-stream monitor metrics.
//!
//! Counters are plain atomics updated by the owning monitor loop; the
//! health API reads them through [`MonitorMetrics::snapshot`]. Metrics for a
//! stream survive restarts of its loop and are dropped when the stream is no
//! longer monitored.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;

use crate::database::time::{ms_to_datetime, now_ms};

/// Number of recent cycle durations kept for averages.
const DURATION_SAMPLES: usize = 64;

/// Ring buffer of recent cycle durations in milliseconds.
#[derive(Debug)]
struct CycleDurations {
    samples: Vec<u64>,
    position: usize,
    count: u64,
    max: u64,
}

impl CycleDurations {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity],
            position: 0,
            count: 0,
            max: 0,
        }
    }

    fn record(&mut self, ms: u64) {
        self.samples[self.position] = ms;
        self.position = (self.position + 1) % self.samples.len();
        self.count += 1;
        self.max = self.max.max(ms);
    }

    fn recent_average(&self) -> f64 {
        let filled = self.count.min(self.samples.len() as u64) as usize;
        if filled == 0 {
            return 0.0;
        }
        let sum: u64 = self.samples[..filled].iter().sum();
        sum as f64 / filled as f64
    }
}

#[derive(Debug)]
pub struct MonitorMetrics {
    stream_url: String,
    created_at: Instant,
    cycles: AtomicU64,
    findings: AtomicU64,
    detector_failures: AtomicU64,
    persistence_failures: AtomicU64,
    restarts: AtomicU64,
    /// Detector failures in the most recent cycle.
    last_cycle_failures: AtomicU64,
    /// Epoch ms of the last completed cycle, 0 before the first one.
    last_cycle_at: AtomicI64,
    durations: RwLock<CycleDurations>,
}

impl MonitorMetrics {
    pub fn new(stream_url: impl Into<String>) -> Self {
        Self {
            stream_url: stream_url.into(),
            created_at: Instant::now(),
            cycles: AtomicU64::new(0),
            findings: AtomicU64::new(0),
            detector_failures: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            last_cycle_failures: AtomicU64::new(0),
            last_cycle_at: AtomicI64::new(0),
            durations: RwLock::new(CycleDurations::new(DURATION_SAMPLES)),
        }
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    pub fn record_cycle(&self, duration: Duration, findings: u64, detector_failures: u64) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.findings.fetch_add(findings, Ordering::Relaxed);
        self.detector_failures
            .fetch_add(detector_failures, Ordering::Relaxed);
        self.last_cycle_failures
            .store(detector_failures, Ordering::Relaxed);
        self.last_cycle_at.store(now_ms(), Ordering::Relaxed);
        self.durations.write().record(duration.as_millis() as u64);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn findings(&self) -> u64 {
        self.findings.load(Ordering::Relaxed)
    }

    /// Whether the most recent cycle had at least one detector failure.
    pub fn is_degraded(&self) -> bool {
        self.last_cycle_failures.load(Ordering::Relaxed) > 0
    }

    pub fn snapshot(&self) -> MonitorMetricsSnapshot {
        let durations = self.durations.read();
        let last = self.last_cycle_at.load(Ordering::Relaxed);
        MonitorMetricsSnapshot {
            stream_url: self.stream_url.clone(),
            uptime_secs: self.created_at.elapsed().as_secs(),
            cycles: self.cycles(),
            findings: self.findings(),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            last_cycle_failures: self.last_cycle_failures.load(Ordering::Relaxed),
            last_cycle_at: (last > 0).then(|| ms_to_datetime(last)),
            avg_cycle_ms: durations.recent_average(),
            max_cycle_ms: durations.max,
        }
    }
}

/// Point-in-time copy of a stream's metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorMetricsSnapshot {
    pub stream_url: String,
    pub uptime_secs: u64,
    pub cycles: u64,
    pub findings: u64,
    pub detector_failures: u64,
    pub persistence_failures: u64,
    pub restarts: u64,
    pub last_cycle_failures: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub avg_cycle_ms: f64,
    pub max_cycle_ms: u64,
}

/// Metrics of every monitored stream, keyed by URL.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    monitors: DashMap<String, Arc<MonitorMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, stream_url: &str) -> Arc<MonitorMetrics> {
        self.monitors
            .entry(stream_url.to_string())
            .or_insert_with(|| Arc::new(MonitorMetrics::new(stream_url)))
            .clone()
    }

    pub fn get(&self, stream_url: &str) -> Option<Arc<MonitorMetrics>> {
        self.monitors.get(stream_url).map(|m| m.clone())
    }

    pub fn remove(&self, stream_url: &str) {
        self.monitors.remove(stream_url);
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Streams whose last cycle had detector failures.
    pub fn degraded_streams(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .monitors
            .iter()
            .filter(|m| m.is_degraded())
            .map(|m| m.key().clone())
            .collect();
        urls.sort();
        urls
    }

    /// Snapshots sorted by stream URL.
    pub fn snapshots(&self) -> Vec<MonitorMetricsSnapshot> {
        let mut snapshots: Vec<_> = self.monitors.iter().map(|m| m.snapshot()).collect();
        snapshots.sort_by(|a, b| a.stream_url.cmp(&b.stream_url));
        snapshots
    }
}
