//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `FORMRUN_`:
/// - `FORMRUN_LOOP_MAX_ITERATIONS`: While-loop iteration cap (default: 100)
/// - `FORMRUN_INTERRUPTION_MAX_DEPTH`: Events resolved per interruption pass (default: 6)
/// - `FORMRUN_DECISION_POLL_INTERVAL_MS`: Decision poll cadence (default: 250)
/// - `FORMRUN_PAUSE_POLL_INTERVAL_MS`: Pause checkpoint cadence (default: 200)
/// - `FORMRUN_STABILIZATION_DELAY_MS`: Settle time after a handled interruption (default: 300)
/// - `FORMRUN_STALL_POLL_INTERVAL_MS`: Re-detect cadence while a dialog blocks the run (default: 500)
/// - `FORMRUN_WAIT_TIMEOUT_MS`: Default visibility wait timeout (default: 10000)
/// - `FORMRUN_WAIT_POLL_INTERVAL_MS`: Visibility wait poll cadence (default: 100)
/// - `FORMRUN_REPEAT_LIMIT`: Consecutive repeats of one loop iteration (default: 25)
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_loop_max_iterations")]
    pub loop_max_iterations: usize,

    #[serde(default = "default_interruption_max_depth")]
    pub interruption_max_depth: usize,

    #[serde(default = "default_decision_poll_interval_ms")]
    pub decision_poll_interval_ms: u64,

    #[serde(default = "default_pause_poll_interval_ms")]
    pub pause_poll_interval_ms: u64,

    #[serde(default = "default_stabilization_delay_ms")]
    pub stabilization_delay_ms: u64,

    #[serde(default = "default_stall_poll_interval_ms")]
    pub stall_poll_interval_ms: u64,

    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    #[serde(default = "default_wait_poll_interval_ms")]
    pub wait_poll_interval_ms: u64,

    #[serde(default = "default_repeat_limit")]
    pub repeat_limit: usize,
}

fn default_loop_max_iterations() -> usize {
    100
}

fn default_interruption_max_depth() -> usize {
    6
}

fn default_decision_poll_interval_ms() -> u64 {
    250
}

fn default_pause_poll_interval_ms() -> u64 {
    200
}

fn default_stabilization_delay_ms() -> u64 {
    300
}

fn default_stall_poll_interval_ms() -> u64 {
    500
}

fn default_wait_timeout_ms() -> u64 {
    10_000
}

fn default_wait_poll_interval_ms() -> u64 {
    100
}

fn default_repeat_limit() -> usize {
    25
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("FORMRUN_").from_env::<EngineConfig>()
    }

    /// Configuration with minimal poll intervals and no settle delay, for tests.
    pub fn immediate() -> Self {
        Self {
            decision_poll_interval_ms: 1,
            pause_poll_interval_ms: 1,
            stabilization_delay_ms: 0,
            stall_poll_interval_ms: 1,
            wait_poll_interval_ms: 1,
            ..Self::default()
        }
    }

    pub fn decision_poll_interval(&self) -> Duration {
        Duration::from_millis(self.decision_poll_interval_ms)
    }

    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub fn stall_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stall_poll_interval_ms)
    }

    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            loop_max_iterations: default_loop_max_iterations(),
            interruption_max_depth: default_interruption_max_depth(),
            decision_poll_interval_ms: default_decision_poll_interval_ms(),
            pause_poll_interval_ms: default_pause_poll_interval_ms(),
            stabilization_delay_ms: default_stabilization_delay_ms(),
            stall_poll_interval_ms: default_stall_poll_interval_ms(),
            wait_timeout_ms: default_wait_timeout_ms(),
            wait_poll_interval_ms: default_wait_poll_interval_ms(),
            repeat_limit: default_repeat_limit(),
        }
    }
}
