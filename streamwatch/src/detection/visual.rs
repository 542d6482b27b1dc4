//! Visual detector: pull one frame, classify it, match flagged objects.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::trace;

use super::{Detector, DetectorError, Finding};
use crate::config::RuleSnapshot;
use crate::database::models::EventCategory;
use crate::domain::StreamUrl;

/// A single decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB24 pixels.
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// One object found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Source of video frames for a stream.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Grab the current frame. `Ok(None)` when the stream has none to give.
    async fn grab_frame(&self, stream: &StreamUrl) -> Result<Option<Frame>, DetectorError>;
}

/// Object detection model.
#[async_trait]
pub trait ObjectClassifier: Send + Sync {
    fn model_name(&self) -> &str;

    async fn classify(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;
}

pub struct VisualDetector {
    frames: Arc<dyn FrameSource>,
    classifier: Arc<dyn ObjectClassifier>,
    threshold: f32,
}

impl VisualDetector {
    pub fn new(
        frames: Arc<dyn FrameSource>,
        classifier: Arc<dyn ObjectClassifier>,
        threshold: f32,
    ) -> Self {
        Self {
            frames,
            classifier,
            threshold,
        }
    }

    /// Strongest detection that clears the threshold and is flagged.
    fn strongest_match<'a>(
        &self,
        detections: &'a [Detection],
        rules: &RuleSnapshot,
    ) -> Option<&'a Detection> {
        detections
            .iter()
            .filter(|d| d.confidence >= self.threshold && rules.is_flagged_object(&d.label))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

#[async_trait]
impl Detector for VisualDetector {
    fn category(&self) -> EventCategory {
        EventCategory::Visual
    }

    async fn detect(
        &self,
        stream: &StreamUrl,
        rules: &RuleSnapshot,
    ) -> Result<Option<Finding>, DetectorError> {
        if rules.objects.is_empty() {
            return Ok(None);
        }

        let Some(frame) = self.frames.grab_frame(stream).await? else {
            trace!(stream = %stream, "No frame available");
            return Ok(None);
        };

        let detections = self.classifier.classify(&frame).await?;
        trace!(
            stream = %stream,
            model = self.classifier.model_name(),
            detections = detections.len(),
            "Frame classified"
        );

        Ok(self.strongest_match(&detections, rules).map(|d| {
            Finding::new(format!(
                "Object detected: {} ({:.2})",
                d.label, d.confidence
            ))
        }))
    }
}
