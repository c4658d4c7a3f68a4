//! Engine error types.

use thiserror::Error;

/// Errors that can occur while running a workflow.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Cooperative cancellation requested by the operator.
    #[error("Run stopped by user")]
    UserStop,

    /// The host surface is about to reload; the run suspends cleanly.
    #[error("Navigation interrupt: {0}")]
    NavigationInterrupt(String),

    /// An ordinary step failed.
    #[error("Step execution failed: {0}")]
    StepExecution(String),

    /// The workflow program is malformed.
    #[error("Structural error: {0}")]
    Structural(String),

    /// A condition could not be evaluated.
    #[error("Condition error: {0}")]
    Condition(String),

    /// A step value could not be resolved from its source.
    #[error("Value unavailable: {0}")]
    ValueUnavailable(String),

    /// The decision channel was closed or rejected a request.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the step error policy (retries, then mode) applies to this error.
    ///
    /// Stops, navigation interrupts and structural errors always propagate.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StepExecution(_)
                | EngineError::Condition(_)
                | EngineError::ValueUnavailable(_)
        )
    }

    /// Shorthand for a structural error.
    pub fn structural(message: impl Into<String>) -> Self {
        EngineError::Structural(message.into())
    }

    /// Shorthand for a step execution error.
    pub fn step(message: impl Into<String>) -> Self {
        EngineError::StepExecution(message.into())
    }
}

impl From<envy::Error> for EngineError {
    fn from(err: envy::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
