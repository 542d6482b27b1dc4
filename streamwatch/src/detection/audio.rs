//! Audio detector: transcribe a recent window and scan it for keywords.
//!
//! Keywords may be phrases. Both the transcript and each keyword are split
//! into lowercase word tokens and a keyword matches when its tokens appear
//! consecutively. The finding carries the phrase as heard plus the
//! approximate wall-clock time of its first word.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::trace;

use super::{Detector, DetectorError, Finding};
use crate::config::RuleSnapshot;
use crate::database::models::EventCategory;
use crate::domain::StreamUrl;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}']+").unwrap());

/// A captured window of mono PCM audio.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    /// Wall-clock time of the first sample.
    pub started_at: DateTime<Utc>,
}

impl AudioChunk {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// A transcribed word and its offset from the start of the chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedWord {
    pub text: String,
    pub offset: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    pub words: Vec<TimedWord>,
}

impl Transcript {
    /// Transcript without word timings; every word is placed at offset zero.
    pub fn from_text(text: &str) -> Self {
        Self {
            words: text
                .split_whitespace()
                .map(|w| TimedWord {
                    text: w.to_string(),
                    offset: Duration::ZERO,
                })
                .collect(),
        }
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Captures audio from a stream.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Capture up to `window` of recent audio. `Ok(None)` when nothing is audible.
    async fn capture(
        &self,
        stream: &StreamUrl,
        window: Duration,
    ) -> Result<Option<AudioChunk>, DetectorError>;
}

/// Speech-to-text model.
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn model_name(&self) -> &str;

    async fn transcribe(&self, chunk: &AudioChunk) -> Result<Transcript, DetectorError>;
}

/// A lowercase token with the index of the transcript word it came from.
struct Token {
    norm: String,
    word: usize,
}

fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn transcript_tokens(transcript: &Transcript) -> Vec<Token> {
    transcript
        .words
        .iter()
        .enumerate()
        .flat_map(|(word, w)| {
            tokenize(&w.text)
                .into_iter()
                .map(move |norm| Token { norm, word })
        })
        .collect()
}

/// First keyword (in rule order) whose tokens occur consecutively.
/// Returns the keyword and the transcript word range it covers.
fn find_phrase<'r>(
    tokens: &[Token],
    keywords: &'r [String],
) -> Option<(&'r str, std::ops::RangeInclusive<usize>)> {
    for keyword in keywords {
        let needle = tokenize(keyword);
        if needle.is_empty() || needle.len() > tokens.len() {
            continue;
        }
        let hit = tokens
            .windows(needle.len())
            .find(|window| window.iter().zip(&needle).all(|(t, n)| &t.norm == n));
        if let Some(window) = hit {
            let first = window[0].word;
            let last = window[window.len() - 1].word;
            return Some((keyword.as_str(), first..=last));
        }
    }
    None
}

pub struct AudioDetector {
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    window: Duration,
}

impl AudioDetector {
    pub fn new(
        source: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        window: Duration,
    ) -> Self {
        Self {
            source,
            transcriber,
            window,
        }
    }
}

#[async_trait]
impl Detector for AudioDetector {
    fn category(&self) -> EventCategory {
        EventCategory::Audio
    }

    async fn detect(
        &self,
        stream: &StreamUrl,
        rules: &RuleSnapshot,
    ) -> Result<Option<Finding>, DetectorError> {
        if rules.keywords.is_empty() {
            return Ok(None);
        }

        let Some(chunk) = self.source.capture(stream, self.window).await? else {
            return Ok(None);
        };

        let transcript = self.transcriber.transcribe(&chunk).await?;
        trace!(
            stream = %stream,
            model = self.transcriber.model_name(),
            words = transcript.words.len(),
            "Audio transcribed"
        );
        if transcript.is_empty() {
            return Ok(None);
        }

        let tokens = transcript_tokens(&transcript);
        let Some((keyword, range)) = find_phrase(&tokens, &rules.keywords) else {
            return Ok(None);
        };

        let first = &transcript.words[*range.start()];
        let heard = transcript.words[range]
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let at = chunk.started_at
            + chrono::Duration::from_std(first.offset).unwrap_or(chrono::Duration::zero());

        Ok(Some(Finding::new(format!(
            "Audio flagged: {} in '{}' at ~{}",
            keyword,
            heard,
            at.format("%H:%M:%S UTC")
        ))))
    }
}
