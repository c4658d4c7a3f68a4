//! formrun Engine
//!
//! Resumable interpreter that replays recorded form workflows over tabular
//! data.
//!
//! This crate provides:
//! - Workflow model: steps, loops, conditionals, labels, error policies and
//!   interruption handlers
//! - Structural analysis producing jump tables for loops, conditionals and
//!   labels
//! - An index-based interpreter with count, while and data loops over
//!   primary and related detail datasets
//! - Interruption detection, handler matching and an operator decision
//!   protocol that learns new handlers
//! - A driver that validates, runs and reports a workflow run
//!
//! The host surface (actions, element inspection, dialog detection, decisions)
//! is reached only through the traits in [`collaborators`], [`condition`]
//! and [`interruption`].

pub mod analyzer;
pub mod collaborators;
pub mod condition;
pub mod config;
pub mod driver;
pub mod error;
pub mod interpreter;
pub mod interruption;
pub mod progress;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use analyzer::{analyze_workflow, JumpTables, StructuralIssue};
pub use collaborators::Collaborators;
pub use config::EngineConfig;
pub use driver::{ExecutionDriver, ResumePoint, RunOutcome, RunReport};
pub use error::{EngineError, EngineResult};
pub use interpreter::{RunControl, RunOptions};
pub use progress::{ProgressEvent, ProgressSink};
pub use workflow::{RunInput, Workflow};
