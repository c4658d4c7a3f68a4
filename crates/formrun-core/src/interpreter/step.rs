//! Ordinary step execution with error policy handling.

use std::time::Duration;

use super::{Interpreter, Signal};
use crate::error::{EngineError, EngineResult};
use crate::workflow::{DataRow, ErrorMode, Step, WaitSpec};

impl Interpreter {
    /// Execute an ordinary step under its effective error policy.
    ///
    /// Retryable failures are retried `retry_count` times, `retry_delay_ms`
    /// apart, and then resolved by the policy mode. Stops, navigation
    /// interrupts and structural errors propagate untouched.
    pub(super) async fn execute_step_with_handling(
        &mut self,
        idx: usize,
        step: &Step,
        row: &DataRow,
    ) -> EngineResult<Signal> {
        let step_type = step.kind.type_name();

        if self.ctx.options.dry_run {
            tracing::info!(step_index = idx, step = %step.display_name(), "Dry run, step skipped");
            self.progress.emit(
                "step.dry_run",
                serde_json::json!({
                    "step_index": idx,
                    "step_type": step_type,
                    "row_index": self.ctx.current_row_index,
                }),
            );
            return Ok(Signal::None);
        }

        let policy = self.workflow.effective_policy(step);
        self.progress
            .step_started(idx, step_type, self.ctx.current_row_index);

        let mut attempt: u32 = 0;
        loop {
            self.ctx.checkpoint().await?;
            self.ctx.current_step_index = idx;

            let err = match self.execute_single_step(idx, step, row).await {
                Ok(signal) => {
                    tracing::debug!(step_index = idx, step_type, %signal, "Step completed");
                    self.progress.step_completed(idx, step_type);
                    return Ok(signal);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt < policy.retry_count {
                attempt += 1;
                tracing::warn!(
                    step_index = idx,
                    attempt,
                    retry_count = policy.retry_count,
                    error = %err,
                    "Step failed, retrying"
                );
                self.progress.step_retry(idx, attempt, &err.to_string());
                self.ctx.sleep_ms(policy.retry_delay_ms).await?;
                continue;
            }

            tracing::warn!(
                step_index = idx,
                mode = ?policy.mode,
                error = %err,
                "Step failed, applying error policy"
            );
            self.progress
                .step_failed(idx, policy.mode, &err.to_string());

            return match policy.mode {
                ErrorMode::Skip => Ok(Signal::Skip),
                ErrorMode::BreakLoop => Ok(Signal::BreakLoop),
                ErrorMode::ContinueLoop => Ok(Signal::ContinueLoop),
                ErrorMode::RepeatLoop => Ok(Signal::RepeatLoop),
                ErrorMode::Goto => {
                    let label = policy.goto_label.as_deref().unwrap_or_default();
                    self.tables.label(label).map(Signal::Goto).ok_or_else(|| {
                        EngineError::structural(format!(
                            "error policy of step {} targets unknown label '{}'",
                            idx, label
                        ))
                    })
                }
                ErrorMode::Fail | ErrorMode::Default => Err(err),
            };
        }
    }

    /// Resolve the value, wait, act, wait, then resolve interruptions.
    async fn execute_single_step(
        &mut self,
        idx: usize,
        step: &Step,
        row: &DataRow,
    ) -> EngineResult<Signal> {
        let Some(action) = step.kind.action() else {
            return Err(EngineError::structural(format!(
                "step {} ({}) is not an action",
                idx,
                step.kind.type_name()
            )));
        };

        let before = self.resolver.resolve_pass(&mut self.ctx).await?;
        if before.signal != Signal::None {
            return Ok(before.signal);
        }

        let value = match &action.value {
            Some(source) => self.collaborators.values.resolve(source, row).await?,
            None => None,
        };

        if let Some(wait) = &action.wait_before {
            self.wait_for(wait).await?;
        }

        tracing::debug!(step_index = idx, step = %step.display_name(), "Executing step");
        self.collaborators
            .executor
            .execute(step, value.as_deref())
            .await?;

        if let Some(wait) = &action.wait_after {
            self.wait_for(wait).await?;
        }

        let after = self.resolver.resolve_pass(&mut self.ctx).await?;
        if after.signal != Signal::None {
            return Ok(after.signal);
        }

        if self.ctx.options.learning_mode && after.events_seen == 0 {
            return self.resolver.confirm_step(&mut self.ctx).await;
        }

        Ok(Signal::None)
    }

    /// Poll the surface until the target reaches the wanted state.
    async fn wait_for(&self, wait: &WaitSpec) -> EngineResult<()> {
        let timeout_ms = wait.timeout_ms.unwrap_or(self.ctx.config.wait_timeout_ms);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            self.ctx.checkpoint().await?;
            let state = self.collaborators.inspector.inspect(&wait.target).await?;
            if state.satisfies(wait.state) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::step(format!(
                    "timed out after {}ms waiting for '{}' to be {:?}",
                    timeout_ms, wait.target, wait.state
                )));
            }
            tokio::time::sleep(self.ctx.config.wait_poll_interval()).await;
        }
    }
}
