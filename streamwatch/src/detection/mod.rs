//! Violation detectors.
//!
//! A [`Detector`] inspects one stream and returns at most one [`Finding`].
//! Detectors never persist or notify; the monitor loop does that. Each
//! detector category is backed by narrow capability traits so the model or
//! library behind it can be swapped without touching the loop:
//!
//! - visual: [`FrameSource`] + [`ObjectClassifier`]
//! - audio: [`AudioSource`] + [`Transcriber`]
//! - chat: [`ChatSource`]
//!
//! "No data available" (offline stream, no frame, empty chat) is `Ok(None)`,
//! never an error.

pub mod audio;
pub mod chat;
pub mod simulated;
pub mod visual;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RuleSnapshot;
use crate::database::models::EventCategory;
use crate::domain::StreamUrl;

pub use audio::{AudioChunk, AudioDetector, AudioSource, TimedWord, Transcriber, Transcript};
pub use chat::{ChatDetector, ChatMessage, ChatSource};
pub use visual::{Detection, Frame, FrameSource, ObjectClassifier, VisualDetector};

/// A detector's human-readable description of what it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding(String);

impl Finding {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error raised by a detector or one of its backends.
#[derive(Debug, Clone)]
pub struct DetectorError {
    pub message: String,
    /// Whether the next cycle may succeed (network blip, busy model).
    pub transient: bool,
}

impl DetectorError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    /// An error that will not go away without operator action (model missing).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DetectorError {}

impl From<crate::Error> for DetectorError {
    fn from(err: crate::Error) -> Self {
        DetectorError::transient(err.to_string())
    }
}

impl From<DetectorError> for crate::Error {
    fn from(err: DetectorError) -> Self {
        crate::Error::Detector(err.message)
    }
}

/// One detection capability.
#[async_trait]
pub trait Detector: Send + Sync + 'static {
    fn category(&self) -> EventCategory;

    /// Inspect `stream` against `rules`.
    async fn detect(
        &self,
        stream: &StreamUrl,
        rules: &RuleSnapshot,
    ) -> Result<Option<Finding>, DetectorError>;
}

#[async_trait]
impl<T: Detector + ?Sized> Detector for Arc<T> {
    fn category(&self) -> EventCategory {
        (**self).category()
    }

    async fn detect(
        &self,
        stream: &StreamUrl,
        rules: &RuleSnapshot,
    ) -> Result<Option<Finding>, DetectorError> {
        (**self).detect(stream, rules).await
    }
}

/// The ordered detectors a monitor loop runs each cycle.
#[derive(Clone)]
pub struct DetectorSet {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectorSet {
    /// Visual, then audio, then chat.
    pub fn standard(
        visual: Arc<dyn Detector>,
        audio: Arc<dyn Detector>,
        chat: Arc<dyn Detector>,
    ) -> Self {
        Self {
            detectors: vec![visual, audio, chat],
        }
    }

    /// Arbitrary detectors, run in the given order.
    pub fn from_detectors(detectors: Vec<Arc<dyn Detector>>) -> Self {
        Self { detectors }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Detector>> {
        self.detectors.iter()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

impl fmt::Debug for DetectorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.detectors.iter().map(|d| d.category()))
            .finish()
    }
}
