//! Progress reporting.
//!
//! Progress events are fire-and-forget: sinks never fail and never block
//! the run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::workflow::ErrorMode;

/// One progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Phase name, e.g. `step.started`.
    pub event_type: String,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Receives progress events.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _event: ProgressEvent) {}
}

/// Sink that writes every event as a tracing record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn report(&self, event: ProgressEvent) {
        match event.event_type.as_str() {
            "run.failed" | "step.failed" => tracing::error!(
                event_type = %event.event_type,
                run_id = %event.run_id,
                payload = %event.payload,
                "Progress"
            ),
            "run.stopped" | "run.suspended" | "step.retry" | "interruption.detected" => {
                tracing::warn!(
                    event_type = %event.event_type,
                    run_id = %event.run_id,
                    payload = %event.payload,
                    "Progress"
                )
            }
            _ => tracing::info!(
                event_type = %event.event_type,
                run_id = %event.run_id,
                payload = %event.payload,
                "Progress"
            ),
        }
    }
}

/// Sink that forwards events over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn report(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Progress receiver dropped");
        }
    }
}

/// Stamps events with the run id and forwards them to a sink.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    run_id: Uuid,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, run_id: Uuid) -> Self {
        Self { sink, run_id }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Report an event of the given phase.
    pub fn emit(&self, event_type: &str, payload: serde_json::Value) {
        self.sink.report(ProgressEvent {
            event_type: event_type.to_string(),
            run_id: self.run_id,
            timestamp: Utc::now(),
            payload,
        });
    }

    pub fn step_started(&self, step_index: usize, step_type: &str, row_index: usize) {
        self.emit(
            "step.started",
            serde_json::json!({
                "step_index": step_index,
                "step_type": step_type,
                "row_index": row_index,
            }),
        );
    }

    pub fn step_completed(&self, step_index: usize, step_type: &str) {
        self.emit(
            "step.completed",
            serde_json::json!({
                "step_index": step_index,
                "step_type": step_type,
            }),
        );
    }

    pub fn step_retry(&self, step_index: usize, attempt: u32, error: &str) {
        self.emit(
            "step.retry",
            serde_json::json!({
                "step_index": step_index,
                "attempt": attempt,
                "error": error,
            }),
        );
    }

    pub fn step_failed(&self, step_index: usize, mode: ErrorMode, error: &str) {
        self.emit(
            "step.failed",
            serde_json::json!({
                "step_index": step_index,
                "mode": mode,
                "error": error,
            }),
        );
    }

    pub fn loop_iteration(&self, step_index: usize, iteration: usize, loop_id: Option<&str>) {
        self.emit(
            "loop.iteration",
            serde_json::json!({
                "step_index": step_index,
                "iteration": iteration,
                "loop_id": loop_id,
            }),
        );
    }
}
