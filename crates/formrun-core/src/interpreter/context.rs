//! Per-run mutable state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RunControl;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::workflow::DataRow;

/// Options of a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// Primary rows to skip.
    #[serde(default)]
    pub skip_rows: usize,

    /// Maximum primary rows to process after skipping.
    #[serde(default)]
    pub limit_rows: Option<usize>,

    /// Log ordinary steps instead of executing them.
    #[serde(default)]
    pub dry_run: bool,

    /// Ask the operator about unresolved interruptions and confirm steps.
    #[serde(default)]
    pub learning_mode: bool,

    /// Stop at the first interruption no handler resolves.
    #[serde(default)]
    pub run_until_interception: bool,
}

/// State of the one live run.
///
/// Created fresh for each run, so dedup sets and pending decisions never
/// leak between runs.
#[derive(Debug)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub control: RunControl,
    pub options: RunOptions,
    pub config: EngineConfig,

    pub current_step_index: usize,
    pub current_row_index: usize,
    pub current_row: DataRow,

    /// Primary rows whose execution has started.
    pub rows_processed: usize,

    /// Request id of the decision being waited for.
    pub pending_decision: Option<String>,

    /// Event patterns acknowledged once and not raised again this run.
    pub acknowledged: HashSet<String>,

    /// Blocking event patterns already logged as stalling the run.
    pub stall_logged: HashSet<String>,
}

impl ExecutionContext {
    pub fn new(control: RunControl, options: RunOptions, config: EngineConfig) -> Self {
        control.reset();
        Self {
            run_id: Uuid::new_v4(),
            control,
            options,
            config,
            current_step_index: 0,
            current_row_index: 0,
            current_row: DataRow::default(),
            rows_processed: 0,
            pending_decision: None,
            acknowledged: HashSet::new(),
            stall_logged: HashSet::new(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn is_stopped(&self) -> bool {
        self.control.is_stopped()
    }

    /// Pause/stop checkpoint.
    pub async fn checkpoint(&self) -> EngineResult<()> {
        self.control
            .checkpoint(self.config.pause_poll_interval())
            .await
    }

    /// Cooperative sleep that observes stop requests.
    pub async fn sleep_ms(&self, ms: u64) -> EngineResult<()> {
        self.control
            .sleep(
                std::time::Duration::from_millis(ms),
                self.config.pause_poll_interval(),
            )
            .await
    }
}
