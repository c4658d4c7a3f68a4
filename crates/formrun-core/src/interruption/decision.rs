//! Operator decision protocol.
//!
//! The engine sends a [`DecisionRequest`] and polls for a [`Decision`]
//! carrying the same `request_id`. Decisions for other ids are stale and
//! discarded.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::Event;
use crate::error::{EngineError, EngineResult};
use crate::workflow::HandlerOutcome;

/// Request for an operator decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub request_id: String,
    pub step_index: usize,
    /// The interruption, or `None` for a step confirmation.
    pub event: Option<Event>,
    pub ranked_options: Vec<String>,
}

/// What the operator chose to do with the event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Press `selected_option`, then `follow_up_option` if given.
    #[default]
    Press,
    Dismiss,
    /// Leave the event alone.
    Ignore,
}

/// Operator answer to a [`DecisionRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub request_id: String,
    #[serde(default)]
    pub action: DecisionAction,
    #[serde(default)]
    pub selected_option: Option<String>,
    #[serde(default)]
    pub follow_up_option: Option<String>,
    #[serde(default)]
    pub outcome: HandlerOutcome,
    #[serde(default)]
    pub save_rule: bool,
}

impl Decision {
    /// Press an option and continue with the next step.
    pub fn press(request_id: impl Into<String>, option: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            action: DecisionAction::Press,
            selected_option: Some(option.into()),
            ..Self::default()
        }
    }

    pub fn with_outcome(mut self, outcome: HandlerOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_follow_up(mut self, option: impl Into<String>) -> Self {
        self.follow_up_option = Some(option.into());
        self
    }

    pub fn saving_rule(mut self) -> Self {
        self.save_rule = true;
        self
    }
}

/// Channel between the engine and whoever makes decisions.
#[async_trait]
pub trait DecisionChannel: Send + Sync {
    /// Publish a request.
    async fn request(&self, request: DecisionRequest) -> EngineResult<()>;

    /// Take the next available decision without waiting.
    fn try_receive(&self) -> Option<Decision>;
}

/// Host side of a [`ChannelDecisionBridge`].
pub struct DecisionHost {
    pub requests: mpsc::UnboundedReceiver<DecisionRequest>,
    pub decisions: mpsc::UnboundedSender<Decision>,
}

/// [`DecisionChannel`] over a pair of tokio channels.
pub struct ChannelDecisionBridge {
    requests: mpsc::UnboundedSender<DecisionRequest>,
    decisions: Mutex<mpsc::UnboundedReceiver<Decision>>,
}

impl ChannelDecisionBridge {
    pub fn new() -> (Self, DecisionHost) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (decision_tx, decision_rx) = mpsc::unbounded_channel();
        (
            Self {
                requests: request_tx,
                decisions: Mutex::new(decision_rx),
            },
            DecisionHost {
                requests: request_rx,
                decisions: decision_tx,
            },
        )
    }
}

#[async_trait]
impl DecisionChannel for ChannelDecisionBridge {
    async fn request(&self, request: DecisionRequest) -> EngineResult<()> {
        self.requests
            .send(request)
            .map_err(|_| EngineError::Channel("Decision host disconnected".to_string()))
    }

    fn try_receive(&self) -> Option<Decision> {
        self.decisions.lock().ok()?.try_recv().ok()
    }
}

/// Channel that never answers. Requests are logged and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecisionChannel;

#[async_trait]
impl DecisionChannel for NoDecisionChannel {
    async fn request(&self, request: DecisionRequest) -> EngineResult<()> {
        tracing::warn!(
            request_id = %request.request_id,
            step_index = request.step_index,
            "Decision requested but no decision host is attached"
        );
        Ok(())
    }

    fn try_receive(&self) -> Option<Decision> {
        None
    }
}
