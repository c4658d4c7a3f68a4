//! Workflow document types.
//!
//! A workflow is the only artifact the engine reads and writes: its steps,
//! its settings (default error policy, dataset relationships) and the
//! interruption handlers it has accumulated.

mod data;
mod handler;
mod step;

pub use data::{
    select_detail_rows, value_to_string, DataRow, Dataset, DetailSelection, FieldMapping,
    Relationship, RunInput,
};
pub use handler::{
    EventKind, Handler, HandlerAction, HandlerMode, HandlerOutcome, HandlerTrigger, MatchMode,
};
pub use step::{
    ActionSpec, Condition, DataOp, ErrorMode, ErrorPolicy, GotoSpec, IfSpec, LabelSpec,
    LoopEndSpec, LoopMode, LoopSpec, Step, StepKind, UiCheck, ValueSource, WaitSpec, WaitState,
};

use serde::{Deserialize, Serialize};

/// Workflow-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    /// Policy applied to steps without an override, or with mode `default`.
    #[serde(default)]
    pub default_error_policy: ErrorPolicy,

    /// Parent/child relationships between datasets, in declaration order.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// A workflow program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub settings: WorkflowSettings,

    #[serde(default)]
    pub handlers: Vec<Handler>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
            settings: WorkflowSettings::default(),
            handlers: Vec::new(),
        }
    }

    pub fn with_default_policy(mut self, policy: ErrorPolicy) -> Self {
        self.settings.default_error_policy = policy;
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.settings.relationships.push(relationship);
        self
    }

    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Effective error policy of a step.
    ///
    /// A step without an override, or whose override mode is `default`,
    /// uses the workflow default. A `default` workflow mode means `fail`.
    pub fn effective_policy(&self, step: &Step) -> ErrorPolicy {
        let mut policy = match &step.on_error {
            Some(p) if p.mode != ErrorMode::Default => p.clone(),
            _ => self.settings.default_error_policy.clone(),
        };
        if policy.mode == ErrorMode::Default {
            policy.mode = ErrorMode::Fail;
        }
        policy
    }

    /// Append a handler unless an equivalent one exists. Returns whether it was added.
    pub fn add_handler(&mut self, handler: Handler) -> bool {
        if self.handlers.iter().any(|h| h.is_equivalent(&handler)) {
            return false;
        }
        self.handlers.push(handler);
        true
    }
}
