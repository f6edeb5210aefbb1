//! Consumer side of a job's progress channel.
//!
//! A [`ProgressChannel`] is fed decoded events in arrival order and decides
//! when the job is over:
//!
//! ```text
//! Open ──connected──▶ Connected ──stage──▶ Active ──*_done──▶ Closed (completed)
//!   │                    │                   │
//!   └────────────────────┴──────error────────┴──────────────▶ Closed (failed)
//! ```
//!
//! The channel closes itself on the first terminal event and ignores
//! everything after. Closing is local only; nothing is sent upstream.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::progress::{ProgressEvent, Stage, StageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Connected,
    Active,
    Closed,
}

/// What a single event did to the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Still waiting for a terminal event.
    Pending,
    /// `*_done` arrived; carries the stage result.
    Completed(Value),
    /// `error` arrived, or the channel timed out.
    Failed(String),
    /// The channel was already closed.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("job failed: {0}")]
    Failed(String),
    #[error("no progress event for {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("progress stream ended before a terminal event")]
    Disconnected,
}

/// How long a consumer waits between events before giving up.
///
/// The server sends keep-alive comments well inside this window, so an
/// expiry means the connection or the job is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdlePolicy {
    timeout: Option<Duration>,
}

impl IdlePolicy {
    pub fn never() -> Self {
        Self { timeout: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn expired(&self, idle: Duration) -> bool {
        self.timeout.is_some_and(|t| idle >= t)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressChannel {
    kind: StageKind,
    state: ChannelState,
    last_stage: Option<Stage>,
    last_progress: Option<u8>,
    result: Option<Value>,
    error: Option<ChannelError>,
    close_count: u32,
}

impl ProgressChannel {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            state: ChannelState::Open,
            last_stage: None,
            last_progress: None,
            result: None,
            error: None,
            close_count: 0,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ChannelState::Closed
    }

    pub fn last_stage(&self) -> Option<&Stage> {
        self.last_stage.as_ref()
    }

    pub fn last_progress(&self) -> Option<u8> {
        self.last_progress
    }

    /// The final result once a `*_done` event has been consumed.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&ChannelError> {
        self.error.as_ref()
    }

    /// How many times the channel transitioned to closed (0 or 1).
    pub fn close_count(&self) -> u32 {
        self.close_count
    }

    pub fn on_event(&mut self, event: &ProgressEvent) -> Outcome {
        if self.is_closed() {
            return Outcome::Ignored;
        }

        self.last_stage = Some(event.stage.clone());
        if event.progress.is_some() {
            self.last_progress = event.progress;
        }

        if event.stage.is_error() {
            let message = if event.message.trim().is_empty() {
                "unknown error".to_string()
            } else {
                event.message.clone()
            };
            return self.fail(ChannelError::Failed(message.clone()), message);
        }

        if event.stage.is_done() {
            let result = match &event.result {
                Some(v) if !v.is_null() => v.clone(),
                _ => self.kind.empty_result(),
            };
            self.result = Some(result.clone());
            self.close();
            return Outcome::Completed(result);
        }

        self.state = match (self.state, &event.stage) {
            (ChannelState::Open, Stage::Connected) => ChannelState::Connected,
            (_, Stage::Connected) => self.state,
            _ => ChannelState::Active,
        };
        Outcome::Pending
    }

    /// Fails the channel if `idle` exceeds the policy.
    pub fn on_idle(&mut self, idle: Duration, policy: &IdlePolicy) -> Outcome {
        if self.is_closed() {
            return Outcome::Ignored;
        }
        if !policy.expired(idle) {
            return Outcome::Pending;
        }
        let err = ChannelError::Timeout(idle);
        let message = err.to_string();
        self.fail(err, message)
    }

    /// The transport ended without a terminal event.
    pub fn on_disconnect(&mut self) -> Outcome {
        if self.is_closed() {
            return Outcome::Ignored;
        }
        let err = ChannelError::Disconnected;
        let message = err.to_string();
        self.fail(err, message)
    }

    /// Closes the channel. Returns `true` only for the call that closed it.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = ChannelState::Closed;
        self.close_count += 1;
        true
    }

    /// Final result of a closed channel.
    pub fn finish(&self) -> Result<Value, ChannelError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        self.result.clone().ok_or(ChannelError::Disconnected)
    }

    fn fail(&mut self, err: ChannelError, message: String) -> Outcome {
        self.error = Some(err);
        self.close();
        Outcome::Failed(message)
    }
}
