//! Per-stream monitor loop.
//!
//! A [`StreamMonitor`] owns one stream URL. Each cycle takes the current rule
//! snapshot once, runs every detector in order and hands each finding to the
//! [`EventLogger`]. A detector that errors or panics is logged and counted;
//! the remaining detectors still run. The loop then sleeps for a fixed
//! interval regardless of how long detection took.
//!
//! Cancellation is checked at the top of each cycle, before each detector,
//! and during the sleep.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::logger::EventLogger;
use super::metrics::MonitorMetrics;
use crate::config::RuleStore;
use crate::config::settings::MonitorSettings;
use crate::detection::DetectorSet;
use crate::domain::StreamUrl;

/// Default number of consecutive cycles in which every detector failed
/// before the loop gives up and lets the supervisor restart it.
pub const DEFAULT_MAX_FAILED_CYCLES: u32 = 5;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Fixed sleep between cycles.
    pub poll_interval: Duration,
    /// Consecutive all-failed cycles tolerated. 0 never gives up.
    pub max_failed_cycles: u32,
}

impl MonitorConfig {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            ..Default::default()
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_failed_cycles: DEFAULT_MAX_FAILED_CYCLES,
        }
    }
}

/// Error that ends a monitor loop.
#[derive(Debug, Clone)]
pub struct MonitorError {
    pub message: String,
}

impl MonitorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MonitorError {}

/// Result of a single detection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Findings handed to the event logger.
    pub findings: usize,
    /// Detectors that returned an error or panicked.
    pub failures: usize,
    /// Detectors that ran to completion (successfully or not).
    pub detectors_run: usize,
    /// Cancellation interrupted the cycle.
    pub cancelled: bool,
    pub duration: Duration,
}

impl CycleReport {
    /// Every detector that ran failed.
    pub fn all_failed(&self) -> bool {
        self.detectors_run > 0 && self.failures == self.detectors_run
    }
}

pub struct StreamMonitor {
    stream: StreamUrl,
    detectors: DetectorSet,
    rules: Arc<RuleStore>,
    logger: Arc<EventLogger>,
    metrics: Arc<MonitorMetrics>,
    config: MonitorConfig,
    cancel: CancellationToken,
}

impl StreamMonitor {
    pub fn new(
        stream: StreamUrl,
        detectors: DetectorSet,
        rules: Arc<RuleStore>,
        logger: Arc<EventLogger>,
        metrics: Arc<MonitorMetrics>,
        config: MonitorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream,
            detectors,
            rules,
            logger,
            metrics,
            config,
            cancel,
        }
    }

    pub fn stream(&self) -> &StreamUrl {
        &self.stream
    }

    /// Run cycles until cancelled.
    ///
    /// Returns `Ok(())` on cancellation and an error once
    /// `max_failed_cycles` consecutive cycles had every detector fail.
    pub async fn run(self) -> Result<(), MonitorError> {
        info!(stream = %self.stream, "Monitor started");
        let mut failed_cycles = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let report = self.run_cycle().await;
            if report.cancelled {
                break;
            }

            if report.all_failed() {
                failed_cycles += 1;
                warn!(
                    stream = %self.stream,
                    failed_cycles,
                    "Every detector failed this cycle"
                );
                if self.config.max_failed_cycles > 0
                    && failed_cycles >= self.config.max_failed_cycles
                {
                    return Err(MonitorError::new(format!(
                        "all detectors failed for {} consecutive cycles",
                        failed_cycles
                    )));
                }
            } else {
                failed_cycles = 0;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(stream = %self.stream, "Monitor stopped");
        Ok(())
    }

    /// Run every detector once, in order.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let rules = self.rules.snapshot();
        let mut report = CycleReport::default();

        for detector in self.detectors.iter() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let category = detector.category();
            let outcome = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                outcome = AssertUnwindSafe(detector.detect(&self.stream, &rules)).catch_unwind() => outcome,
            };
            report.detectors_run += 1;

            match outcome {
                Ok(Ok(Some(finding))) => {
                    report.findings += 1;
                    let logged = self.logger.log(&self.stream, category, &finding).await;
                    if !logged.persisted() {
                        self.metrics.record_persistence_failure();
                    }
                }
                Ok(Ok(None)) => {
                    debug!(stream = %self.stream, category = %category, "Nothing detected");
                }
                Ok(Err(e)) => {
                    report.failures += 1;
                    warn!(
                        stream = %self.stream,
                        category = %category,
                        transient = e.transient,
                        error = %e,
                        "Detector failed"
                    );
                }
                Err(panic) => {
                    report.failures += 1;
                    error!(
                        stream = %self.stream,
                        category = %category,
                        "Detector panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        report.duration = started.elapsed();
        if !report.cancelled {
            self.metrics.record_cycle(
                report.duration,
                report.findings as u64,
                report.failures as u64,
            );
        }
        report
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
