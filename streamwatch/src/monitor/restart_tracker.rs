//! Restart backoff for crashed monitor loops.
//!
//! # Backoff Algorithm
//!
//! - First 3 failures within the failure window: no backoff (immediate restart)
//! - After that: backoff = base * 2^(failures - 3), capped at `max_backoff`
//! - At `max_failures` failures within the window the stream is given up on
//! - Failures older than the window are forgotten

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_FAILURE_THRESHOLD: usize = 3;
pub const DEFAULT_MAX_FAILURES: usize = 10;

/// Maximum exponent to prevent overflow.
const MAX_EXPONENT: u32 = 10;

#[derive(Debug, Clone)]
pub struct RestartTrackerConfig {
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Window for counting failures.
    pub failure_window: Duration,
    /// Number of failures before backoff applies.
    pub failure_threshold: usize,
    /// Number of failures in the window after which restarts stop.
    pub max_failures: usize,
}

impl Default for RestartTrackerConfig {
    fn default() -> Self {
        Self {
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            failure_window: DEFAULT_FAILURE_WINDOW,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }
}

/// What to do with a monitor that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart after the given delay (zero means immediately).
    Restart(Duration),
    /// Too many recent failures.
    GiveUp { failures: usize },
}

#[derive(Debug, Clone, Default)]
struct RestartHistory {
    failures: Vec<Instant>,
    total_restarts: u64,
}

impl RestartHistory {
    fn record_failure(&mut self, now: Instant, window: Duration) -> usize {
        self.failures.retain(|&t| now.duration_since(t) < window);
        self.failures.push(now);
        self.total_restarts += 1;
        self.failures.len()
    }

    fn recent_failures(&self, now: Instant, window: Duration) -> usize {
        self.failures
            .iter()
            .filter(|&&t| now.duration_since(t) < window)
            .count()
    }
}

/// Per-stream failure history.
pub struct RestartTracker {
    history: HashMap<String, RestartHistory>,
    config: RestartTrackerConfig,
}

impl RestartTracker {
    pub fn new() -> Self {
        Self::with_config(RestartTrackerConfig::default())
    }

    pub fn with_config(config: RestartTrackerConfig) -> Self {
        Self {
            history: HashMap::new(),
            config,
        }
    }

    /// Record a failure for `stream_url` and decide whether to restart it.
    pub fn record_failure(&mut self, stream_url: &str) -> RestartDecision {
        self.record_failure_at(stream_url, Instant::now())
    }

    fn record_failure_at(&mut self, stream_url: &str, now: Instant) -> RestartDecision {
        let failures = self
            .history
            .entry(stream_url.to_string())
            .or_default()
            .record_failure(now, self.config.failure_window);

        if failures >= self.config.max_failures {
            warn!(
                stream = stream_url,
                failures, "Monitor exceeded restart limit"
            );
            return RestartDecision::GiveUp { failures };
        }

        let backoff = self.calculate_backoff(failures);
        if backoff.is_zero() {
            debug!(
                stream = stream_url,
                failures, "Monitor failed, immediate restart"
            );
        } else {
            info!(
                stream = stream_url,
                failures,
                backoff_secs = backoff.as_secs_f64(),
                "Monitor failed, restarting with backoff"
            );
        }
        RestartDecision::Restart(backoff)
    }

    /// Formula: base * 2^(failures - threshold) for failures >= threshold.
    fn calculate_backoff(&self, failures: usize) -> Duration {
        if failures < self.config.failure_threshold {
            return Duration::ZERO;
        }

        let exponent =
            (failures - self.config.failure_threshold).min(MAX_EXPONENT as usize) as u32;
        let multiplier = 2u32.saturating_pow(exponent);
        self.config
            .base_backoff
            .saturating_mul(multiplier)
            .min(self.config.max_backoff)
    }

    pub fn recent_failures(&self, stream_url: &str) -> usize {
        let now = Instant::now();
        self.history
            .get(stream_url)
            .map(|h| h.recent_failures(now, self.config.failure_window))
            .unwrap_or(0)
    }

    pub fn total_restarts(&self, stream_url: &str) -> u64 {
        self.history
            .get(stream_url)
            .map(|h| h.total_restarts)
            .unwrap_or(0)
    }

    /// Forget a stream entirely (it is no longer assigned).
    pub fn remove(&mut self, stream_url: &str) {
        self.history.remove(stream_url);
    }

    pub fn stats(&self) -> RestartTrackerStats {
        let now = Instant::now();
        RestartTrackerStats {
            tracked_streams: self.history.len(),
            streams_with_failures: self
                .history
                .values()
                .filter(|h| h.recent_failures(now, self.config.failure_window) > 0)
                .count(),
            total_restarts: self.history.values().map(|h| h.total_restarts).sum(),
        }
    }
}

impl Default for RestartTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RestartTrackerStats {
    pub tracked_streams: usize,
    /// Streams with at least one failure inside the window.
    pub streams_with_failures: usize,
    pub total_restarts: u64,
}
