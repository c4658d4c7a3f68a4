//! The step-walking interpreter.
//!
//! Steps are walked by index over a flat array. Only loop bodies recurse
//! into [`Interpreter::execute_range`], one frame per nesting level; labels,
//! gotos and conditionals move the index within a frame. A frame returns a
//! [`Signal`] only when its target lies outside the frame.

mod context;
mod control;
mod loops;
mod signal;
mod step;

pub use context::{ExecutionContext, RunOptions};
pub use control::RunControl;
pub use signal::Signal;

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::analyzer::JumpTables;
use crate::collaborators::Collaborators;
use crate::error::{EngineError, EngineResult};
use crate::interruption::InterruptionResolver;
use crate::progress::{ProgressReporter, ProgressSink};
use crate::workflow::{DataRow, Handler, RunInput, Step, StepKind, Workflow};

/// Interpreter for one run of one workflow.
pub struct Interpreter {
    workflow: Workflow,
    steps: Arc<Vec<Step>>,
    tables: JumpTables,
    input: RunInput,
    collaborators: Collaborators,
    resolver: InterruptionResolver,
    progress: ProgressReporter,
    ctx: ExecutionContext,
    row_offset: usize,
    run_without_rows: bool,
}

impl Interpreter {
    pub fn new(
        workflow: &Workflow,
        tables: JumpTables,
        input: RunInput,
        collaborators: Collaborators,
        sink: Arc<dyn ProgressSink>,
        ctx: ExecutionContext,
    ) -> Self {
        let progress = ProgressReporter::new(sink, ctx.run_id);
        let resolver = InterruptionResolver::new(
            collaborators.detector.clone(),
            collaborators.decisions.clone(),
            progress.clone(),
            workflow.handlers.clone(),
        );

        Self {
            workflow: workflow.clone(),
            steps: Arc::new(workflow.steps.clone()),
            tables,
            input,
            collaborators,
            resolver,
            progress,
            ctx,
            row_offset: 0,
            run_without_rows: false,
        }
    }

    /// Offset added to primary row positions in reports.
    pub fn with_row_offset(mut self, offset: usize) -> Self {
        self.row_offset = offset;
        self
    }

    /// In simple (loop-free) mode, run the program once with an empty row
    /// when the primary dataset has no rows.
    pub fn run_without_rows(mut self, enabled: bool) -> Self {
        self.run_without_rows = enabled;
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn into_parts(self) -> (ExecutionContext, Vec<Handler>) {
        (self.ctx, self.resolver.into_learned())
    }

    /// Execute the whole program.
    ///
    /// Without loops the full range runs once per primary row; otherwise it
    /// runs once and data loops pull their own rows.
    pub async fn execute_program(&mut self) -> EngineResult<()> {
        let end = self.steps.len();

        if self.tables.has_loops() {
            let row = DataRow::default();
            let signal = self.execute_range(0, end, &row).await?;
            return check_escaped(signal);
        }

        let source = self.input.primary.name.clone();
        let mut rows: Vec<DataRow> = self
            .input
            .primary
            .rows
            .iter()
            .map(|item| DataRow::from_item(&source, item))
            .collect();
        if rows.is_empty() && self.run_without_rows {
            rows.push(DataRow::default());
        }

        for (position, row) in rows.iter().enumerate() {
            self.ctx.checkpoint().await?;
            self.begin_primary_row(position, row);
            let signal = self.execute_range(0, end, row).await?;
            check_escaped(signal)?;
        }

        Ok(())
    }

    fn begin_primary_row(&mut self, position: usize, row: &DataRow) {
        let row_index = self.row_offset + position;
        self.ctx.current_row_index = row_index;
        self.ctx.current_row = row.clone();
        self.ctx.rows_processed += 1;
        tracing::info!(row_index, "Processing row");
        self.progress
            .emit("row.started", serde_json::json!({ "row_index": row_index }));
    }

    /// Execute steps `[start, end)` against `row`.
    ///
    /// Never moves the index outside the range: a jump or loop-control
    /// signal whose target lies outside is returned to the caller.
    pub fn execute_range<'a>(
        &'a mut self,
        start: usize,
        end: usize,
        row: &'a DataRow,
    ) -> BoxFuture<'a, EngineResult<Signal>> {
        Box::pin(async move {
            let steps = Arc::clone(&self.steps);
            let mut idx = start;

            while idx < end {
                self.ctx.checkpoint().await?;
                self.ctx.current_step_index = idx;
                let step = &steps[idx];

                match &step.kind {
                    StepKind::Label(_) | StepKind::IfEnd => idx += 1,

                    // Only reached by falling through a body that never ran.
                    StepKind::LoopEnd(_) => idx += 1,

                    StepKind::Goto(goto) => {
                        let target = self.tables.label(&goto.target_label).ok_or_else(|| {
                            EngineError::structural(format!(
                                "goto at step {} targets unknown label '{}'",
                                idx, goto.target_label
                            ))
                        })?;
                        tracing::debug!(from = idx, to = target, label = %goto.target_label, "Goto");
                        if (start..end).contains(&target) {
                            idx = target;
                        } else {
                            return Ok(Signal::Goto(target));
                        }
                    }

                    StepKind::IfStart(spec) => {
                        let holds = self
                            .collaborators
                            .conditions
                            .evaluate(&spec.condition, row)
                            .await?;
                        if holds {
                            idx += 1;
                        } else {
                            let if_end = self.tables.if_to_end.get(&idx).copied().ok_or_else(
                                || EngineError::structural(format!("if-start at step {} has no if-end", idx)),
                            )?;
                            idx = match self.tables.if_to_else.get(&idx) {
                                Some(&else_index) => else_index + 1,
                                None => if_end + 1,
                            };
                        }
                    }

                    StepKind::Else => {
                        let if_end = self.tables.else_to_end.get(&idx).copied().ok_or_else(|| {
                            EngineError::structural(format!("else at step {} has no if-end", idx))
                        })?;
                        idx = if_end + 1;
                    }

                    StepKind::ContinueLoop => return Ok(Signal::ContinueLoop),
                    StepKind::BreakLoop => return Ok(Signal::BreakLoop),
                    StepKind::RepeatLoop => return Ok(Signal::RepeatLoop),

                    StepKind::LoopStart(spec) => {
                        let loop_end = self.tables.loop_pairs.get(&idx).copied().ok_or_else(|| {
                            EngineError::structural(format!("loop-start at step {} has no loop-end", idx))
                        })?;
                        match self.run_loop(idx, loop_end, spec, row).await? {
                            Signal::Goto(target) if (start..end).contains(&target) => idx = target,
                            Signal::Goto(target) => return Ok(Signal::Goto(target)),
                            _ => idx = loop_end + 1,
                        }
                    }

                    _ => match self.execute_step_with_handling(idx, step, row).await? {
                        Signal::None | Signal::Skip => idx += 1,
                        Signal::Goto(target) if (start..end).contains(&target) => idx = target,
                        signal => return Ok(signal),
                    },
                }
            }

            Ok(Signal::None)
        })
    }
}

/// A signal escaping the outermost range is a structural error.
fn check_escaped(signal: Signal) -> EngineResult<()> {
    if signal.is_advance() {
        return Ok(());
    }
    if signal.is_loop_control() {
        return Err(EngineError::structural(format!(
            "loop-control signal used outside a loop ({})",
            signal
        )));
    }
    Err(EngineError::structural(format!(
        "{} lies outside the program",
        signal
    )))
}
