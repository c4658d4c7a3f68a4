use crate::workflow::HandlerOutcome;

/// Control value returned upward by every executed step and range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    /// Continue with the next step.
    #[default]
    None,
    /// The step failed and was skipped; continue with the next step.
    Skip,
    /// Jump to a step index.
    Goto(usize),
    BreakLoop,
    ContinueLoop,
    RepeatLoop,
}

impl Signal {
    /// Whether the enclosing range continues with its next step.
    pub fn is_advance(&self) -> bool {
        matches!(self, Signal::None | Signal::Skip)
    }

    /// Whether only a loop frame can consume this signal.
    pub fn is_loop_control(&self) -> bool {
        matches!(
            self,
            Signal::BreakLoop | Signal::ContinueLoop | Signal::RepeatLoop
        )
    }

    /// Signal for a handler or decision outcome. `Stop` has no signal.
    pub fn from_outcome(outcome: HandlerOutcome) -> Option<Signal> {
        match outcome {
            HandlerOutcome::NextStep => Some(Signal::None),
            HandlerOutcome::ContinueLoop => Some(Signal::ContinueLoop),
            HandlerOutcome::BreakLoop => Some(Signal::BreakLoop),
            HandlerOutcome::RepeatLoop => Some(Signal::RepeatLoop),
            HandlerOutcome::Stop => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::None => write!(f, "none"),
            Signal::Skip => write!(f, "skip"),
            Signal::Goto(index) => write!(f, "goto({})", index),
            Signal::BreakLoop => write!(f, "break-loop"),
            Signal::ContinueLoop => write!(f, "continue-loop"),
            Signal::RepeatLoop => write!(f, "repeat-loop"),
        }
    }
}
