//! In-memory doubles shared by the monitor unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Result;
use crate::config::RuleSnapshot;
use crate::database::models::{AssignmentDbModel, AssignmentView, EventCategory, EventDbModel};
use crate::database::repositories::{AssignmentRepository, EventRepository};
use crate::detection::{Detector, DetectorError, Finding};
use crate::domain::StreamUrl;

#[derive(Default)]
pub struct MemoryEvents {
    rows: Mutex<Vec<EventDbModel>>,
}

impl MemoryEvents {
    pub fn rows(&self) -> Vec<EventDbModel> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl EventRepository for MemoryEvents {
    async fn insert(&self, event: &EventDbModel) -> Result<()> {
        self.rows.lock().push(event.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<EventDbModel>> {
        Ok(self.rows.lock().iter().rev().take(limit as usize).cloned().collect())
    }

    async fn list_for_stream(&self, room_url: &str, limit: i64) -> Result<Vec<EventDbModel>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .rev()
            .filter(|e| e.room_url == room_url)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_for_stream(&self, room_url: &str) -> Result<i64> {
        Ok(self.rows.lock().iter().filter(|e| e.room_url == room_url).count() as i64)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.rows.lock().len() as i64)
    }

    async fn purge_older_than(&self, cutoff_ms: i64) -> Result<u64> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|e| e.timestamp >= cutoff_ms);
        Ok((before - rows.len()) as u64)
    }
}

/// Assignment source that only answers `distinct_stream_urls`.
#[derive(Default)]
pub struct StaticAssignments {
    urls: Mutex<Vec<String>>,
}

impl StaticAssignments {
    pub fn set(&self, urls: &[&str]) {
        *self.urls.lock() = urls.iter().map(|u| u.to_string()).collect();
    }
}

#[async_trait]
impl AssignmentRepository for StaticAssignments {
    async fn create(&self, _assignment: &AssignmentDbModel) -> Result<()> {
        Ok(())
    }
    async fn exists(&self, _agent_id: &str, _stream_id: &str) -> Result<bool> {
        Ok(false)
    }
    async fn delete(&self, _id: &str) -> Result<()> {
        Ok(())
    }
    async fn list_views(&self) -> Result<Vec<AssignmentView>> {
        Ok(Vec::new())
    }
    async fn list_views_for_agent(&self, _agent_id: &str) -> Result<Vec<AssignmentView>> {
        Ok(Vec::new())
    }
    async fn distinct_stream_urls(&self) -> Result<Vec<String>> {
        Ok(self.urls.lock().clone())
    }
    async fn count(&self) -> Result<i64> {
        Ok(self.urls.lock().len() as i64)
    }
}

/// Returns the same result every cycle and counts calls.
pub struct FixedDetector {
    category: EventCategory,
    finding: Option<String>,
    calls: AtomicUsize,
}

impl FixedDetector {
    pub fn new(category: EventCategory, finding: Option<&str>) -> Self {
        Self {
            category,
            finding: finding.map(str::to_string),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for FixedDetector {
    fn category(&self) -> EventCategory {
        self.category
    }

    async fn detect(
        &self,
        _stream: &StreamUrl,
        _rules: &RuleSnapshot,
    ) -> std::result::Result<Option<Finding>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.finding.as_deref().map(Finding::new))
    }
}

pub struct FailingDetector(pub EventCategory);

#[async_trait]
impl Detector for FailingDetector {
    fn category(&self) -> EventCategory {
        self.0
    }

    async fn detect(
        &self,
        _stream: &StreamUrl,
        _rules: &RuleSnapshot,
    ) -> std::result::Result<Option<Finding>, DetectorError> {
        Err(DetectorError::transient("backend unreachable"))
    }
}

pub struct PanickingDetector(pub EventCategory);

#[async_trait]
impl Detector for PanickingDetector {
    fn category(&self) -> EventCategory {
        self.0
    }

    async fn detect(
        &self,
        _stream: &StreamUrl,
        _rules: &RuleSnapshot,
    ) -> std::result::Result<Option<Finding>, DetectorError> {
        panic!("model crashed");
    }
}
