//! Run entry point.
//!
//! The driver validates the program, slices the primary dataset, runs the
//! interpreter and folds whatever happened into a [`RunReport`]. Every run
//! ends in exactly one [`RunOutcome`], reported through the progress sink.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyzer::analyze_workflow;
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::interpreter::{ExecutionContext, Interpreter, RunControl, RunOptions};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::workflow::{Handler, Workflow};

pub use crate::workflow::RunInput;

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { rows_processed: usize },
    Stopped,
    Failed { message: String },
}

/// Where a suspended run was when the host surface navigated away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub step_index: usize,
    pub row_index: usize,
}

/// Result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,

    /// Set when a navigation interrupt suspended the run.
    pub resume: Option<ResumePoint>,

    /// Handlers learned during the run, already appended to the workflow.
    pub learned_handlers: Vec<Handler>,

    pub rows_processed: usize,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }
}

/// Runs workflows against one set of collaborators.
///
/// One run at a time: each run resets the shared [`RunControl`] and gets a
/// fresh execution context.
pub struct ExecutionDriver {
    collaborators: Collaborators,
    sink: Arc<dyn ProgressSink>,
    config: EngineConfig,
    control: RunControl,
}

impl ExecutionDriver {
    pub fn new(collaborators: Collaborators, sink: Arc<dyn ProgressSink>, config: EngineConfig) -> Self {
        Self {
            collaborators,
            sink,
            config,
            control: RunControl::new(),
        }
    }

    /// Use a control handle created by the host.
    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    /// Handle for stopping, pausing or resuming the current run from
    /// another task.
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    /// Execute `workflow` over `input`.
    ///
    /// Handlers learned during the run are appended to `workflow`.
    pub async fn run(&self, workflow: &mut Workflow, input: RunInput, options: RunOptions) -> RunReport {
        let skip_rows = options.skip_rows;
        let ctx = ExecutionContext::new(self.control.clone(), options, self.config.clone());
        let run_id = ctx.run_id;
        let progress = ProgressReporter::new(self.sink.clone(), run_id);

        tracing::info!(
            %run_id,
            workflow = %workflow.name,
            steps = workflow.steps.len(),
            rows = input.primary.len(),
            dry_run = ctx.options.dry_run,
            learning_mode = ctx.options.learning_mode,
            "Starting run"
        );
        progress.emit(
            "run.started",
            serde_json::json!({
                "workflow": workflow.name,
                "options": ctx.options,
            }),
        );

        let (tables, issues) = analyze_workflow(workflow);
        if !issues.is_empty() {
            let detail = issues
                .iter()
                .map(|issue| issue.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            let error = EngineError::structural(detail);
            tracing::error!(%run_id, issues = issues.len(), error = %error, "Workflow failed validation");
            return finish(&progress, RunOutcome::failed(&error), None, Vec::new(), 0);
        }

        let run_without_rows = input.primary.is_empty();
        let input = RunInput {
            primary: input.primary.sliced(skip_rows, ctx.options.limit_rows),
            details: input.details,
        };

        let mut interpreter = Interpreter::new(
            workflow,
            tables,
            input,
            self.collaborators.clone(),
            self.sink.clone(),
            ctx,
        )
        .with_row_offset(skip_rows)
        .run_without_rows(run_without_rows);

        let result = interpreter.execute_program().await;
        let (ctx, learned) = interpreter.into_parts();

        for handler in &learned {
            if workflow.add_handler(handler.clone()) {
                tracing::info!(handler_id = %handler.id, template = %handler.trigger.text_template, "Handler saved");
            }
        }

        let rows_processed = ctx.rows_processed;
        let (outcome, resume) = match result {
            Ok(()) => (RunOutcome::Completed { rows_processed }, None),
            Err(EngineError::UserStop) => {
                tracing::warn!(%run_id, step_index = ctx.current_step_index, "Run stopped");
                (RunOutcome::Stopped, None)
            }
            Err(EngineError::NavigationInterrupt(reason)) => {
                let point = ResumePoint {
                    step_index: ctx.current_step_index,
                    row_index: ctx.current_row_index,
                };
                tracing::warn!(
                    %run_id,
                    step_index = point.step_index,
                    row_index = point.row_index,
                    reason = %reason,
                    "Run suspended by navigation"
                );
                (RunOutcome::Stopped, Some(point))
            }
            Err(e) => {
                tracing::error!(%run_id, step_index = ctx.current_step_index, error = %e, "Run failed");
                (RunOutcome::failed(&e), None)
            }
        };

        finish(&progress, outcome, resume, learned, rows_processed)
    }
}

impl RunOutcome {
    fn failed(error: &EngineError) -> Self {
        RunOutcome::Failed {
            message: error.to_string(),
        }
    }
}

fn finish(
    progress: &ProgressReporter,
    outcome: RunOutcome,
    resume: Option<ResumePoint>,
    learned_handlers: Vec<Handler>,
    rows_processed: usize,
) -> RunReport {
    let event_type = match (&outcome, resume) {
        (RunOutcome::Completed { .. }, _) => "run.completed",
        (RunOutcome::Stopped, Some(_)) => "run.suspended",
        (RunOutcome::Stopped, None) => "run.stopped",
        (RunOutcome::Failed { .. }, _) => "run.failed",
    };
    progress.emit(
        event_type,
        serde_json::json!({
            "outcome": outcome,
            "resume": resume,
            "rows_processed": rows_processed,
            "learned_handlers": learned_handlers.len(),
        }),
    );

    RunReport {
        run_id: progress.run_id(),
        outcome,
        resume,
        learned_handlers,
        rows_processed,
    }
}
