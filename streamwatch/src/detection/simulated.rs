//! Simulated detector backends.
//!
//! Used when no real model is configured. They produce occasional random
//! hits from a fixed vocabulary so the whole pipeline (events, notifications,
//! metrics) can be exercised end to end.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    AudioChunk, AudioDetector, AudioSource, ChatDetector, ChatMessage, ChatSource, Detection,
    DetectorError, DetectorSet, Frame, FrameSource, ObjectClassifier, Transcriber, Transcript,
    VisualDetector,
};
use crate::config::settings::DetectorSettings;
use crate::domain::StreamUrl;

const OBJECT_LABELS: &[&str] = &["knife", "gun", "rifle", "blade"];

const CHAT_MESSAGES: &[&str] = &[
    "Hello everyone",
    "This stream is amazing",
    "I hate you",
    "There is a gun here",
    "Watch out for that knife",
    "No issues here",
];

const SPOKEN_PHRASES: &[&str] = &[
    "welcome back to the stream",
    "thanks for the follow",
    "put the knife down",
    "is that a gun",
    "see you all tomorrow",
];

/// Roughly two hits in eleven polls.
const HIT_NUMERATOR: u32 = 2;
const HIT_DENOMINATOR: u32 = 11;

fn pick<'a>(items: &[&'a str]) -> &'a str {
    items[(rand::random::<u32>() as usize) % items.len()]
}

fn roll_hit() -> bool {
    rand::random::<u32>() % HIT_DENOMINATOR < HIT_NUMERATOR
}

/// Produces a tiny blank frame every call.
pub struct SimulatedFrameSource;

#[async_trait]
impl FrameSource for SimulatedFrameSource {
    async fn grab_frame(&self, _stream: &StreamUrl) -> Result<Option<Frame>, DetectorError> {
        Ok(Some(Frame {
            width: 1,
            height: 1,
            data: vec![0; 3],
            captured_at: Utc::now(),
        }))
    }
}

/// Occasionally "sees" one of a few weapon labels.
pub struct SimulatedClassifier;

#[async_trait]
impl ObjectClassifier for SimulatedClassifier {
    fn model_name(&self) -> &str {
        "simulated"
    }

    async fn classify(&self, _frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        if !roll_hit() {
            return Ok(Vec::new());
        }
        let confidence = 0.5 + rand::random::<f32>() * 0.5;
        Ok(vec![Detection::new(pick(OBJECT_LABELS), confidence)])
    }
}

/// Silent audio covering the requested window.
pub struct SimulatedAudioSource;

#[async_trait]
impl AudioSource for SimulatedAudioSource {
    async fn capture(
        &self,
        _stream: &StreamUrl,
        window: Duration,
    ) -> Result<Option<AudioChunk>, DetectorError> {
        const SAMPLE_RATE: u32 = 16_000;
        let samples = (window.as_secs_f64() * SAMPLE_RATE as f64) as usize;
        let started_at = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
        Ok(Some(AudioChunk {
            samples: vec![0; samples],
            sample_rate: SAMPLE_RATE,
            started_at,
        }))
    }
}

/// Returns a canned phrase spread evenly over the chunk.
pub struct SimulatedTranscriber;

#[async_trait]
impl Transcriber for SimulatedTranscriber {
    fn model_name(&self) -> &str {
        "simulated"
    }

    async fn transcribe(&self, chunk: &AudioChunk) -> Result<Transcript, DetectorError> {
        let mut transcript = Transcript::from_text(pick(SPOKEN_PHRASES));
        let count = transcript.words.len().max(1) as u32;
        let step = chunk.duration() / count;
        for (i, word) in transcript.words.iter_mut().enumerate() {
            word.offset = step * i as u32;
        }
        Ok(transcript)
    }
}

/// One random canned chat message per call.
pub struct SimulatedChatSource;

#[async_trait]
impl ChatSource for SimulatedChatSource {
    async fn recent_messages(
        &self,
        _stream: &StreamUrl,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, DetectorError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![ChatMessage::new(pick(CHAT_MESSAGES))])
    }
}

/// The standard detector set backed entirely by simulations.
pub fn simulated_detectors(settings: &DetectorSettings) -> DetectorSet {
    DetectorSet::standard(
        Arc::new(VisualDetector::new(
            Arc::new(SimulatedFrameSource),
            Arc::new(SimulatedClassifier),
            settings.visual_confidence_threshold,
        )),
        Arc::new(AudioDetector::new(
            Arc::new(SimulatedAudioSource),
            Arc::new(SimulatedTranscriber),
            settings.audio_window,
        )),
        Arc::new(ChatDetector::new(
            Arc::new(SimulatedChatSource),
            settings.chat_message_window,
        )),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::models::EventCategory;

    fn stream() -> StreamUrl {
        StreamUrl::new("https://example.com/room").unwrap()
    }

    #[tokio::test]
    async fn test_audio_chunk_covers_window() {
        let chunk = SimulatedAudioSource
            .capture(&stream(), Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chunk.samples.len(), 32_000);
        assert_eq!(chunk.duration(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_transcript_offsets_increase() {
        let chunk = SimulatedAudioSource
            .capture(&stream(), Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();
        let transcript = SimulatedTranscriber.transcribe(&chunk).await.unwrap();
        assert!(!transcript.is_empty());
        assert!(
            transcript
                .words
                .windows(2)
                .all(|w| w[0].offset <= w[1].offset)
        );
    }

    #[tokio::test]
    async fn test_classifier_labels_are_known() {
        let frame = SimulatedFrameSource
            .grab_frame(&stream())
            .await
            .unwrap()
            .unwrap();
        for _ in 0..50 {
            for detection in SimulatedClassifier.classify(&frame).await.unwrap() {
                assert!(OBJECT_LABELS.contains(&detection.label.as_str()));
                assert!((0.5..=1.0).contains(&detection.confidence));
            }
        }
    }

    #[test]
    fn test_simulated_set_order() {
        let config = AppConfig::default();
        let set = simulated_detectors(&config.detectors);
        let order: Vec<_> = set.iter().map(|d| d.category()).collect();
        assert_eq!(
            order,
            vec![
                EventCategory::Visual,
                EventCategory::Audio,
                EventCategory::Chat
            ]
        );
    }
}
