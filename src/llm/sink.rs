//! Live progress delivery from the decoder to the presentation layer.

use std::sync::Mutex;

use tokio::sync::watch;

use crate::error::SynthesisError;

/// What a live update shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Transient reasoning preview; never part of the message.
    Reasoning,
    /// The commit message as generated so far.
    Answer,
}

/// A single live update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveUpdate {
    pub kind: UpdateKind,
    pub text: String,
}

impl LiveUpdate {
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            kind: UpdateKind::Reasoning,
            text: text.into(),
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            kind: UpdateKind::Answer,
            text: text.into(),
        }
    }
}

/// Receiver of live progress during one synthesis session.
///
/// Called synchronously from the decode loop, so implementations must return
/// quickly and never block.
pub trait LiveSink: Send + Sync {
    fn publish(&self, text: &str, kind: UpdateKind);

    /// Called once when the remote attempt failed, before the fallback runs.
    fn failure(&self, error: &SynthesisError);
}

/// Sink that drops everything.
pub struct NullSink;

impl LiveSink for NullSink {
    fn publish(&self, _text: &str, _kind: UpdateKind) {}

    fn failure(&self, _error: &SynthesisError) {}
}

/// State observed through a [`WatchSink`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LiveEvent {
    #[default]
    Idle,
    Update(LiveUpdate),
    Failed(String),
    /// The user stopped the session; no fallback message will be used.
    Cancelled,
}

/// Sink backed by a `tokio::sync::watch` channel.
///
/// A slow reader only ever sees the newest event: updates coalesce but are
/// never reordered, and publishing never waits on the reader.
pub struct WatchSink {
    tx: watch::Sender<LiveEvent>,
}

impl WatchSink {
    pub fn channel() -> (Self, watch::Receiver<LiveEvent>) {
        let (tx, rx) = watch::channel(LiveEvent::Idle);
        (Self { tx }, rx)
    }
}

impl LiveSink for WatchSink {
    fn publish(&self, text: &str, kind: UpdateKind) {
        // send_replace keeps working after every receiver is gone
        self.tx.send_replace(LiveEvent::Update(LiveUpdate {
            kind,
            text: text.to_string(),
        }));
    }

    fn failure(&self, error: &SynthesisError) {
        let event = match error {
            SynthesisError::Cancelled => LiveEvent::Cancelled,
            other => LiveEvent::Failed(other.to_string()),
        };
        self.tx.send_replace(event);
    }
}

/// Sink that keeps every call, for inspection after a session.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<LiveUpdate>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<LiveUpdate> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl LiveSink for RecordingSink {
    fn publish(&self, text: &str, kind: UpdateKind) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(LiveUpdate {
                kind,
                text: text.to_string(),
            });
        }
    }

    fn failure(&self, error: &SynthesisError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(error.to_string());
        }
    }
}
