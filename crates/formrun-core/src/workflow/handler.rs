//! Interruption handler rules.
//!
//! Handlers map a generalized event pattern to an action list and an
//! outcome. They are authored by hand or learned from operator decisions.

use serde::{Deserialize, Serialize};

/// Kind of detected interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Blocking dialog; the surface is inaccessible until it is resolved.
    Dialog,
    /// Non-blocking notice.
    Notice,
}

impl EventKind {
    pub fn is_blocking(&self) -> bool {
        matches!(self, EventKind::Dialog)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dialog => write!(f, "dialog"),
            Self::Notice => write!(f, "notice"),
        }
    }
}

/// How a handler decides whether to act.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandlerMode {
    /// Apply the action list without asking.
    #[default]
    Auto,
    /// Always ask the operator, even though the handler matches.
    AlwaysAsk,
}

/// How a trigger template is compared with an event template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Contains,
    Exact,
    Regex,
}

/// Event pattern a handler reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerTrigger {
    pub kind: EventKind,

    /// Generalized text template (see `interruption::template`).
    pub text_template: String,

    #[serde(default)]
    pub match_mode: MatchMode,

    /// Controls that must be present on the event.
    #[serde(default)]
    pub required_controls: Vec<String>,
}

/// One action a handler performs on the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerAction {
    /// Press a control of the event.
    Press { control: String },
    /// Dismiss the event without pressing a control.
    Dismiss,
    /// Pause for a fixed delay.
    Wait { ms: u64 },
}

/// Flow outcome after a handler or decision resolves an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerOutcome {
    #[default]
    NextStep,
    ContinueLoop,
    BreakLoop,
    RepeatLoop,
    Stop,
}

/// Stored rule mapping an event pattern to actions and an outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handler {
    pub id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Higher priority handlers are consulted first.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub mode: HandlerMode,

    pub trigger: HandlerTrigger,

    #[serde(default)]
    pub actions: Vec<HandlerAction>,

    #[serde(default)]
    pub outcome: HandlerOutcome,

    /// Whether the handler was synthesized from an operator decision.
    #[serde(default)]
    pub learned: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_true() -> bool {
    true
}

impl Handler {
    /// Whether two handlers would behave identically.
    ///
    /// Compares trigger, actions and outcome; ids, priority and timestamps
    /// are ignored.
    pub fn is_equivalent(&self, other: &Handler) -> bool {
        self.trigger == other.trigger
            && self.actions == other.actions
            && self.outcome == other.outcome
    }
}
