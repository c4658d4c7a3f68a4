//! Loop dispatch: count, while and data modes.

use serde_json::{Map, Value};

use super::{Interpreter, Signal};
use crate::error::EngineResult;
use crate::workflow::{select_detail_rows, DataRow, DetailSelection, LoopMode, LoopSpec};

/// What a loop does after one body execution.
enum Next {
    Advance,
    Repeat,
    Exit,
    Bubble(Signal),
}

/// Tracks consecutive repeats of one iteration.
struct RepeatGuard {
    limit: usize,
    repeats: usize,
}

impl RepeatGuard {
    fn new(limit: usize) -> Self {
        Self { limit, repeats: 0 }
    }

    /// Classify a body signal; a repeat past the limit advances instead.
    fn classify(&mut self, signal: Signal, loop_index: usize) -> Next {
        match signal {
            Signal::None | Signal::Skip | Signal::ContinueLoop => {
                self.repeats = 0;
                Next::Advance
            }
            Signal::BreakLoop => Next::Exit,
            Signal::RepeatLoop if self.repeats < self.limit => {
                self.repeats += 1;
                Next::Repeat
            }
            Signal::RepeatLoop => {
                tracing::warn!(
                    loop_index,
                    limit = self.limit,
                    "Repeat limit reached, advancing to next iteration"
                );
                self.repeats = 0;
                Next::Advance
            }
            Signal::Goto(_) => Next::Bubble(signal),
        }
    }
}

impl Interpreter {
    /// Run a loop whose `loop-start` is at `start` and `loop-end` at `end`.
    ///
    /// Returns `Signal::None` when the loop finishes or breaks, or a `goto`
    /// that left the body.
    pub(super) async fn run_loop(
        &mut self,
        start: usize,
        end: usize,
        spec: &LoopSpec,
        row: &DataRow,
    ) -> EngineResult<Signal> {
        let loop_id = spec.id.as_deref();
        tracing::debug!(loop_index = start, loop_end = end, loop_id, mode = ?spec.mode, "Entering loop");

        let signal = match &spec.mode {
            LoopMode::Count { loop_count } => {
                self.run_count_loop(start, end, *loop_count, loop_id, row)
                    .await?
            }
            LoopMode::While {
                while_condition,
                loop_max_iterations,
            } => {
                let max = loop_max_iterations.unwrap_or(self.ctx.config.loop_max_iterations);
                let mut executions = 0;
                let mut iteration = 0;
                let mut guard = RepeatGuard::new(self.ctx.config.repeat_limit);
                let mut result = Signal::None;

                loop {
                    if executions >= max {
                        tracing::warn!(
                            loop_index = start,
                            max_iterations = max,
                            "While loop hit its iteration cap"
                        );
                        break;
                    }
                    self.ctx.checkpoint().await?;
                    self.ctx.current_step_index = start;
                    if !self
                        .collaborators
                        .conditions
                        .evaluate(while_condition, row)
                        .await?
                    {
                        break;
                    }

                    self.progress.loop_iteration(start, iteration, loop_id);
                    let signal = self.execute_range(start + 1, end, row).await?;
                    executions += 1;

                    match guard.classify(signal, start) {
                        Next::Advance => iteration += 1,
                        Next::Repeat => {}
                        Next::Exit => break,
                        Next::Bubble(signal) => {
                            result = signal;
                            break;
                        }
                    }
                }
                result
            }
            LoopMode::Data {
                data_source_ref,
                iteration_limit,
            } => {
                self.run_data_loop(
                    start,
                    end,
                    data_source_ref.as_deref(),
                    *iteration_limit,
                    loop_id,
                    row,
                )
                .await?
            }
        };

        tracing::debug!(loop_index = start, %signal, "Leaving loop");
        Ok(signal)
    }

    async fn run_count_loop(
        &mut self,
        start: usize,
        end: usize,
        count: usize,
        loop_id: Option<&str>,
        row: &DataRow,
    ) -> EngineResult<Signal> {
        let mut guard = RepeatGuard::new(self.ctx.config.repeat_limit);
        let mut iteration = 0;

        while iteration < count {
            self.ctx.checkpoint().await?;
            self.progress.loop_iteration(start, iteration, loop_id);

            let signal = self.execute_range(start + 1, end, row).await?;
            match guard.classify(signal, start) {
                Next::Advance => iteration += 1,
                Next::Repeat => {}
                Next::Exit => break,
                Next::Bubble(signal) => return Ok(signal),
            }
        }

        Ok(Signal::None)
    }

    async fn run_data_loop(
        &mut self,
        start: usize,
        end: usize,
        source_ref: Option<&str>,
        iteration_limit: Option<usize>,
        loop_id: Option<&str>,
        row: &DataRow,
    ) -> EngineResult<Signal> {
        let (source, is_primary, mut items) = self.loop_rows(source_ref, row, start);
        if let Some(limit) = iteration_limit {
            items.truncate(limit);
        }

        let mut guard = RepeatGuard::new(self.ctx.config.repeat_limit);
        let mut position = 0;
        let mut entered = None;
        let mut result = Signal::None;

        while position < items.len() {
            self.ctx.checkpoint().await?;
            let merged = row.merge_item(&source, &items[position]);
            if is_primary && entered != Some(position) {
                self.begin_primary_row(position, &merged);
                entered = Some(position);
            } else {
                self.ctx.current_row = merged.clone();
            }
            self.progress.loop_iteration(start, position, loop_id);

            let signal = self.execute_range(start + 1, end, &merged).await?;
            match guard.classify(signal, start) {
                Next::Advance => position += 1,
                Next::Repeat => {}
                Next::Exit => break,
                Next::Bubble(signal) => {
                    result = signal;
                    break;
                }
            }
        }

        self.ctx.current_row = row.clone();
        Ok(result)
    }

    /// Rows a data loop iterates: the primary dataset, or a detail dataset
    /// filtered against the enclosing row.
    fn loop_rows(
        &self,
        source_ref: Option<&str>,
        row: &DataRow,
        loop_index: usize,
    ) -> (String, bool, Vec<Map<String, Value>>) {
        let primary = &self.input.primary;
        let name = match source_ref {
            None => return (primary.name.clone(), true, primary.rows.clone()),
            Some(name) if name == primary.name => {
                return (primary.name.clone(), true, primary.rows.clone())
            }
            Some(name) => name.to_string(),
        };

        let Some(dataset) = self.input.detail(&name) else {
            tracing::warn!(loop_index, dataset = %name, "Unknown dataset, loop skipped");
            return (name, false, Vec::new());
        };

        let selection = select_detail_rows(dataset, &self.workflow.settings.relationships, row);
        match &selection {
            DetailSelection::Filtered { relationship, rows } => {
                tracing::debug!(
                    loop_index,
                    dataset = %name,
                    relationship,
                    parent = row.nearest_source(),
                    matched = rows.len(),
                    "Filtered detail rows"
                );
            }
            DetailSelection::Unrelated(_) => {}
            DetailSelection::Unresolvable => {
                tracing::warn!(
                    loop_index,
                    dataset = %name,
                    nearest = row.nearest_source(),
                    lineage = ?row.lineage,
                    "No relationship resolvable from the enclosing loops, loop skipped"
                );
            }
        }

        (name, false, selection.into_rows())
    }
}
