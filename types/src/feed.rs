use chrono::{DateTime, Utc};

use crate::risk::RiskLevel;

/// Tag for an operator feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Analysis,
    Transcription,
    Tool,
    Risk,
    Error,
    Status,
}

/// Append-only operator feed record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeedEntry {
    pub kind: FeedKind,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl FeedEntry {
    pub fn new(kind: FeedKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Emitted once per committed risk-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RiskChange {
    pub from: RiskLevel,
    pub to: RiskLevel,
}
