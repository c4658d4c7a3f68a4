//! Interruption detection, resolution and learning.
//!
//! After (and before) every ordinary step the interpreter runs one
//! resolution pass: detected events are acknowledged, handled by a stored
//! handler, escalated to an operator decision, or stall the run until they
//! disappear.

mod decision;
mod matching;
mod resolver;
pub mod template;

pub use decision::{
    ChannelDecisionBridge, Decision, DecisionAction, DecisionChannel, DecisionHost,
    DecisionRequest, NoDecisionChannel,
};
pub use matching::{find_handler, rank_options, trigger_matches};
pub use resolver::{InterruptionResolver, PassReport};

pub use crate::workflow::EventKind;

use serde::{Deserialize, Serialize};

use crate::condition::normalize;

/// A detected, unplanned condition on the host surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub text: String,
    /// Generalized text, see [`template::generalize`].
    pub template: String,
    /// Controls the operator or a handler can press.
    #[serde(default)]
    pub controls: Vec<String>,
}

impl Event {
    pub fn new(kind: EventKind, text: impl Into<String>, controls: Vec<String>) -> Self {
        let text = text.into();
        Self {
            kind,
            template: template::generalize(&text),
            text,
            controls,
        }
    }

    pub fn dialog(text: impl Into<String>, controls: &[&str]) -> Self {
        Self::new(
            EventKind::Dialog,
            text,
            controls.iter().map(|c| c.to_string()).collect(),
        )
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(EventKind::Notice, text, Vec::new())
    }

    /// Whether the event offers a control, compared case-insensitively.
    pub fn has_control(&self, control: &str) -> bool {
        let wanted = normalize(control);
        self.controls.iter().any(|c| normalize(c) == wanted)
    }

    /// Key identifying the event pattern within a run.
    pub fn pattern_key(&self) -> String {
        format!("{}:{}", self.kind, normalize(&self.template))
    }
}
