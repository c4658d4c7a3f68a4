//! Workflow step types.
//!
//! A step is a closed tagged union keyed by `type`:
//! - ordinary steps (`click`, `input`, ...) carry an [`ActionSpec`] that is
//!   passed through to the action executor untouched
//! - control steps (`label`, `goto`, `if-start`, `loop-start`, ...) are
//!   interpreted by the engine itself

use serde::{Deserialize, Serialize};

/// One instruction of a workflow program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Optional author-assigned identifier, used in logs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,

    /// Step type and payload.
    #[serde(flatten)]
    pub kind: StepKind,

    /// Per-step error policy override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<ErrorPolicy>,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            step_id: None,
            kind,
            on_error: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.step_id = Some(id.into());
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = Some(policy);
        self
    }

    /// Whether this is an ordinary (action) step.
    pub fn is_action(&self) -> bool {
        self.kind.action().is_some()
    }

    /// Display name for logs: the id if present, otherwise the type tag.
    pub fn display_name(&self) -> String {
        match &self.step_id {
            Some(id) => format!("{} ({})", id, self.kind.type_name()),
            None => self.kind.type_name().to_string(),
        }
    }
}

/// Step type discriminant and per-variant payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepKind {
    // Ordinary steps
    Click(ActionSpec),
    Input(ActionSpec),
    Select(ActionSpec),
    Checkbox(ActionSpec),
    Wait(ActionSpec),
    Navigate(ActionSpec),
    Keypress(ActionSpec),

    // Control steps
    Label(LabelSpec),
    Goto(GotoSpec),
    IfStart(IfSpec),
    Else,
    IfEnd,
    LoopStart(LoopSpec),
    LoopEnd(LoopEndSpec),
    ContinueLoop,
    BreakLoop,
    RepeatLoop,
}

impl StepKind {
    /// The action payload of an ordinary step.
    pub fn action(&self) -> Option<&ActionSpec> {
        match self {
            StepKind::Click(spec)
            | StepKind::Input(spec)
            | StepKind::Select(spec)
            | StepKind::Checkbox(spec)
            | StepKind::Wait(spec)
            | StepKind::Navigate(spec)
            | StepKind::Keypress(spec) => Some(spec),
            _ => None,
        }
    }

    /// The serialized `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::Click(_) => "click",
            StepKind::Input(_) => "input",
            StepKind::Select(_) => "select",
            StepKind::Checkbox(_) => "checkbox",
            StepKind::Wait(_) => "wait",
            StepKind::Navigate(_) => "navigate",
            StepKind::Keypress(_) => "keypress",
            StepKind::Label(_) => "label",
            StepKind::Goto(_) => "goto",
            StepKind::IfStart(_) => "if-start",
            StepKind::Else => "else",
            StepKind::IfEnd => "if-end",
            StepKind::LoopStart(_) => "loop-start",
            StepKind::LoopEnd(_) => "loop-end",
            StepKind::ContinueLoop => "continue-loop",
            StepKind::BreakLoop => "break-loop",
            StepKind::RepeatLoop => "repeat-loop",
        }
    }
}

/// Payload of an ordinary step.
///
/// Everything beyond the fields the engine reads is kept in `extra` and
/// handed to the action executor as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    /// Element the action applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Where the value to apply comes from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueSource>,

    /// Wait for a target state before acting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_before: Option<WaitSpec>,

    /// Wait for a target state after acting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_after: Option<WaitSpec>,

    /// Executor-specific payload.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ActionSpec {
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: ValueSource) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_wait_before(mut self, wait: WaitSpec) -> Self {
        self.wait_before = Some(wait);
        self
    }

    pub fn with_wait_after(mut self, wait: WaitSpec) -> Self {
        self.wait_after = Some(wait);
        self
    }
}

/// Source of the value an ordinary step applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum ValueSource {
    /// Literal value.
    Static { value: String },
    /// Field of the current data row (`field` or namespaced `source:field`).
    Data { field: String },
    /// External clipboard-like source.
    Clipboard,
}

/// Visibility state a wait targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitState {
    Visible,
    Hidden,
    Exists,
}

/// Wait for `target` to reach `state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitSpec {
    pub target: String,
    pub state: WaitState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoSpec {
    pub target_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfSpec {
    pub condition: Condition,
}

/// `loop-start` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSpec {
    /// Loop identifier, matched by `loop-end.loopRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(flatten)]
    pub mode: LoopMode,
}

/// Iteration strategy of a loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "loopMode", rename_all = "kebab-case")]
pub enum LoopMode {
    /// Run the body a fixed number of times.
    #[serde(rename_all = "camelCase")]
    Count { loop_count: usize },

    /// Run the body while a condition holds.
    #[serde(rename_all = "camelCase")]
    While {
        while_condition: Condition,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        loop_max_iterations: Option<usize>,
    },

    /// Run the body once per row of a dataset.
    #[serde(rename_all = "camelCase")]
    Data {
        /// Dataset name; `None` or the primary dataset's name selects the primary rows.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_source_ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration_limit: Option<usize>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopEndSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_ref: Option<String>,
}

/// Predicate used by `if-start` and while loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Condition {
    /// Predicate over the state of a UI element.
    Ui {
        target: String,
        check: UiCheck,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Predicate over a field of the current data row.
    Data {
        field: String,
        op: DataOp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

/// UI-state predicate operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UiCheck {
    Visible,
    Hidden,
    Exists,
    TextEquals,
    TextContains,
    ValueEquals,
    ValueContains,
}

/// Data predicate operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataOp {
    Equals,
    NotEquals,
    Contains,
    Empty,
    NotEmpty,
}

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorMode {
    /// Fail the run.
    #[default]
    Fail,
    /// Continue with the next step.
    Skip,
    /// Jump to `gotoLabel`.
    Goto,
    BreakLoop,
    ContinueLoop,
    RepeatLoop,
    /// Use the workflow's default policy.
    Default,
}

/// Error policy of a step or workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPolicy {
    #[serde(default)]
    pub mode: ErrorMode,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub retry_delay_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto_label: Option<String>,
}

impl ErrorPolicy {
    pub fn new(mode: ErrorMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retry_count: u32, retry_delay_ms: u64) -> Self {
        self.retry_count = retry_count;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn goto(label: impl Into<String>) -> Self {
        Self {
            mode: ErrorMode::Goto,
            goto_label: Some(label.into()),
            ..Self::default()
        }
    }
}
