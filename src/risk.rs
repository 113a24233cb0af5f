use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use crate::types::{AnalysisRecord, FeedEntry, FeedKind, RiskChange, RiskLevel};

/// Owns the current risk level and the append-only operator feed.
///
/// The remote service is the sole authority on the level: every
/// transition it reports is committed, downgrades included. The
/// monitor only detects changes and records them, it never vetoes.
pub struct RiskMonitor {
    state: Mutex<State>,
    level_tx: watch::Sender<RiskLevel>,
}

struct State {
    level: RiskLevel,
    feed: Vec<FeedEntry>,
}

impl RiskMonitor {
    pub fn new() -> Self {
        let (level_tx, _) = watch::channel(RiskLevel::Safe);
        Self {
            state: Mutex::new(State {
                level: RiskLevel::Safe,
                feed: Vec::new(),
            }),
            level_tx,
        }
    }

    /// Subscribes to committed risk-level changes.
    pub fn watch_level(&self) -> watch::Receiver<RiskLevel> {
        self.level_tx.subscribe()
    }

    pub fn level(&self) -> RiskLevel {
        self.lock().level
    }

    /// Clone of the feed for operator display. The live log is never
    /// handed out by reference.
    pub fn snapshot(&self) -> Vec<FeedEntry> {
        self.lock().feed.clone()
    }

    /// Folds one decoded record into the risk state and the feed.
    pub fn apply(&self, record: &AnalysisRecord) {
        let mut state = self.lock();
        if let Some(thought) = &record.thought {
            tracing::debug!("model thought: {}", thought);
        }
        if let Some(analysis) = record.analysis.as_deref().filter(|a| !a.trim().is_empty()) {
            state.feed.push(FeedEntry::new(FeedKind::Analysis, analysis));
        }
        if record.has_speech() {
            if let Some(transcription) = &record.transcription {
                state
                    .feed
                    .push(FeedEntry::new(FeedKind::Transcription, transcription));
            }
        }
        if let Some(level) = record.risk_level {
            Self::commit(&self.level_tx, &mut state, level, "analysis");
        }
    }

    /// Unconditionally commits `level`; used by tool side effects that
    /// imply a level ahead of the remote's own risk field.
    pub fn force(&self, level: RiskLevel, source: &str) {
        let mut state = self.lock();
        Self::commit(&self.level_tx, &mut state, level, source);
    }

    /// Commits `level` only when it is above the current one.
    pub fn escalate(&self, level: RiskLevel, source: &str) {
        let mut state = self.lock();
        if level > state.level {
            Self::commit(&self.level_tx, &mut state, level, source);
        }
    }

    pub fn error(&self, text: impl Into<String>) {
        self.lock().feed.push(FeedEntry::new(FeedKind::Error, text));
    }

    pub fn tool_result(&self, text: impl Into<String>) {
        self.lock().feed.push(FeedEntry::new(FeedKind::Tool, text));
    }

    pub fn status(&self, text: impl Into<String>) {
        self.lock().feed.push(FeedEntry::new(FeedKind::Status, text));
    }

    fn commit(
        level_tx: &watch::Sender<RiskLevel>,
        state: &mut State,
        level: RiskLevel,
        source: &str,
    ) {
        if state.level == level {
            return;
        }
        let change = RiskChange {
            from: state.level,
            to: level,
        };
        state.level = level;
        state.feed.push(FeedEntry::new(
            FeedKind::Risk,
            format!("risk level {} -> {} ({source})", change.from, change.to),
        ));
        level_tx.send_replace(level);
        tracing::info!("risk level changed: {} -> {}", change.from, change.to);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RiskMonitor {
    fn default() -> Self {
        Self::new()
    }
}
