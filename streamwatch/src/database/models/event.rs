//! Violation event database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One detected violation. Rows are append-only.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventDbModel {
    pub id: String,
    /// Unix epoch milliseconds (UTC) of the detection.
    pub timestamp: i64,
    /// Stream URL the monitor loop was polling.
    pub room_url: String,
    /// Detector category (visual, audio, chat).
    pub category: String,
    /// Detector finding text, verbatim.
    pub finding: String,
}

impl EventDbModel {
    pub fn new(
        room_url: impl Into<String>,
        category: EventCategory,
        finding: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: crate::database::time::now_ms(),
            room_url: room_url.into(),
            category: category.as_str().to_string(),
            finding: finding.into(),
        }
    }

    pub fn category(&self) -> Option<EventCategory> {
        EventCategory::parse(&self.category)
    }

    pub fn get_timestamp(&self) -> DateTime<Utc> {
        crate::database::time::ms_to_datetime(self.timestamp)
    }
}

/// Detector categories, in the order a monitor cycle runs them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Visual,
    Audio,
    Chat,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visual => "visual",
            Self::Audio => "audio",
            Self::Chat => "chat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "visual" => Some(Self::Visual),
            "audio" => Some(Self::Audio),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }
}
