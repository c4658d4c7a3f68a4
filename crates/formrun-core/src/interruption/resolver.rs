//! Interruption resolution pass and the learning protocol.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::decision::{Decision, DecisionAction, DecisionChannel, DecisionRequest};
use super::matching::{find_handler, rank_options};
use super::template::is_benign;
use super::Event;
use crate::collaborators::EventDetector;
use crate::error::{EngineError, EngineResult};
use crate::interpreter::{ExecutionContext, Signal};
use crate::progress::ProgressReporter;
use crate::workflow::{
    EventKind, Handler, HandlerAction, HandlerMode, HandlerOutcome, HandlerTrigger, MatchMode,
};

/// Result of one resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// Flow signal produced by a handler or decision outcome.
    pub signal: Signal,
    /// Events that were acted on (benign notices excluded).
    pub events_seen: usize,
}

/// Detects and resolves interruptions for one run.
///
/// Owns the run's working copy of the handler list; handlers learned during
/// the run are appended to it and also collected separately.
pub struct InterruptionResolver {
    detector: Arc<dyn EventDetector>,
    channel: Arc<dyn DecisionChannel>,
    progress: ProgressReporter,
    handlers: Vec<Handler>,
    learned: Vec<Handler>,
}

impl InterruptionResolver {
    pub fn new(
        detector: Arc<dyn EventDetector>,
        channel: Arc<dyn DecisionChannel>,
        progress: ProgressReporter,
        handlers: Vec<Handler>,
    ) -> Self {
        Self {
            detector,
            channel,
            progress,
            handlers,
            learned: Vec::new(),
        }
    }

    pub fn into_learned(self) -> Vec<Handler> {
        self.learned
    }

    /// Run one detection/resolution pass.
    ///
    /// Resolves one event at a time and re-detects after each, up to
    /// `interruption_max_depth` events. Returns early with the first
    /// non-`None` signal an outcome produces.
    pub async fn resolve_pass(&mut self, ctx: &mut ExecutionContext) -> EngineResult<PassReport> {
        let max_depth = ctx.config.interruption_max_depth;
        let mut events_seen = 0;

        for _ in 0..max_depth {
            ctx.control.check_stop()?;

            let events = self.detector.detect().await?;
            let Some(event) = events
                .into_iter()
                .find(|e| !ctx.acknowledged.contains(&e.pattern_key()))
            else {
                return Ok(PassReport {
                    signal: Signal::None,
                    events_seen,
                });
            };

            if event.kind == EventKind::Notice && is_benign(&event.text) {
                tracing::debug!(template = %event.template, "Benign notice acknowledged");
                ctx.acknowledged.insert(event.pattern_key());
                continue;
            }

            events_seen += 1;
            if let Some(signal) = self.resolve_event(ctx, &event).await? {
                return Ok(PassReport {
                    signal,
                    events_seen,
                });
            }
        }

        tracing::warn!(
            max_depth,
            step_index = ctx.current_step_index,
            "Interruption depth limit reached"
        );
        Ok(PassReport {
            signal: Signal::None,
            events_seen,
        })
    }

    /// Ask the operator to confirm the step that just ran.
    pub async fn confirm_step(&mut self, ctx: &mut ExecutionContext) -> EngineResult<Signal> {
        let decision = self
            .await_decision(ctx, None, vec!["continue".to_string()])
            .await?;
        self.progress.emit(
            "decision.applied",
            serde_json::json!({
                "request_id": decision.request_id,
                "step_index": ctx.current_step_index,
                "outcome": decision.outcome,
            }),
        );
        Ok(self
            .finish_outcome(ctx, decision.outcome)
            .await?
            .unwrap_or_default())
    }

    /// Resolve one event. `Some` ends the pass with a signal.
    async fn resolve_event(
        &mut self,
        ctx: &mut ExecutionContext,
        event: &Event,
    ) -> EngineResult<Option<Signal>> {
        let step_index = ctx.current_step_index;
        tracing::info!(
            step_index,
            kind = %event.kind,
            template = %event.template,
            "Interruption detected"
        );
        self.progress.emit(
            "interruption.detected",
            serde_json::json!({
                "step_index": step_index,
                "kind": event.kind,
                "text": event.text,
                "template": event.template,
                "controls": event.controls,
            }),
        );

        if let Some(handler) = find_handler(&self.handlers, event) {
            if handler.mode == HandlerMode::Auto {
                let handler = handler.clone();
                return self.apply_handler(ctx, event, &handler).await;
            }
            tracing::debug!(handler_id = %handler.id, "Handler asks for a decision");
        }

        if ctx.options.run_until_interception {
            tracing::info!(step_index, template = %event.template, "Stopping at interception");
            ctx.control.stop();
            return Err(EngineError::UserStop);
        }

        if ctx.options.learning_mode {
            let options = rank_options(&event.controls);
            let decision = self.await_decision(ctx, Some(event.clone()), options).await?;
            return self.apply_decision(ctx, event, decision).await;
        }

        if event.kind.is_blocking() {
            if ctx.stall_logged.insert(event.pattern_key()) {
                tracing::warn!(
                    step_index,
                    template = %event.template,
                    "Blocking dialog has no handler; run stalled until it is resolved"
                );
            }
            self.wait_until_cleared(ctx, event).await?;
            return Ok(None);
        }

        tracing::info!(template = %event.template, "Unhandled notice acknowledged");
        ctx.acknowledged.insert(event.pattern_key());
        Ok(None)
    }

    async fn apply_handler(
        &mut self,
        ctx: &mut ExecutionContext,
        event: &Event,
        handler: &Handler,
    ) -> EngineResult<Option<Signal>> {
        for action in &handler.actions {
            match action {
                HandlerAction::Press { control } => self.detector.press(event, control).await?,
                HandlerAction::Dismiss => self.detector.dismiss(event).await?,
                HandlerAction::Wait { ms } => ctx.sleep_ms(*ms).await?,
            }
        }

        tracing::info!(
            handler_id = %handler.id,
            outcome = ?handler.outcome,
            "Interruption handled"
        );
        self.progress.emit(
            "interruption.handled",
            serde_json::json!({
                "step_index": ctx.current_step_index,
                "handler_id": handler.id,
                "outcome": handler.outcome,
            }),
        );

        self.finish_outcome(ctx, handler.outcome).await
    }

    /// Translate an outcome. `next-step` keeps the pass going.
    async fn finish_outcome(
        &self,
        ctx: &mut ExecutionContext,
        outcome: HandlerOutcome,
    ) -> EngineResult<Option<Signal>> {
        match Signal::from_outcome(outcome) {
            None => {
                ctx.control.stop();
                Err(EngineError::UserStop)
            }
            Some(Signal::None) => Ok(None),
            Some(signal) => {
                ctx.sleep_ms(ctx.config.stabilization_delay_ms).await?;
                Ok(Some(signal))
            }
        }
    }

    async fn await_decision(
        &self,
        ctx: &mut ExecutionContext,
        event: Option<Event>,
        ranked_options: Vec<String>,
    ) -> EngineResult<Decision> {
        let request_id = Uuid::new_v4().to_string();
        let request = DecisionRequest {
            request_id: request_id.clone(),
            step_index: ctx.current_step_index,
            event,
            ranked_options,
        };

        ctx.pending_decision = Some(request_id.clone());
        ctx.control.hold();
        self.progress.emit(
            "decision.requested",
            serde_json::to_value(&request).unwrap_or_default(),
        );

        let result = match self.channel.request(request).await {
            Ok(()) => self.poll_decision(ctx, &request_id).await,
            Err(e) => Err(e),
        };

        ctx.pending_decision = None;
        ctx.control.release();
        result
    }

    async fn poll_decision(
        &self,
        ctx: &ExecutionContext,
        request_id: &str,
    ) -> EngineResult<Decision> {
        loop {
            ctx.control.check_stop()?;
            while let Some(decision) = self.channel.try_receive() {
                if decision.request_id == request_id {
                    return Ok(decision);
                }
                tracing::debug!(
                    expected = request_id,
                    received = %decision.request_id,
                    "Discarding stale decision"
                );
            }
            tokio::time::sleep(ctx.config.decision_poll_interval()).await;
        }
    }

    async fn apply_decision(
        &mut self,
        ctx: &mut ExecutionContext,
        event: &Event,
        decision: Decision,
    ) -> EngineResult<Option<Signal>> {
        let mut actions = Vec::new();

        match decision.action {
            DecisionAction::Press => {
                if let Some(option) = &decision.selected_option {
                    self.detector.press(event, option).await?;
                    actions.push(HandlerAction::Press {
                        control: option.clone(),
                    });
                }
                if let Some(follow_up) = &decision.follow_up_option {
                    ctx.sleep_ms(ctx.config.stabilization_delay_ms).await?;
                    self.press_follow_up(event, follow_up).await?;
                    actions.push(HandlerAction::Press {
                        control: follow_up.clone(),
                    });
                }
            }
            DecisionAction::Dismiss => {
                self.detector.dismiss(event).await?;
                actions.push(HandlerAction::Dismiss);
            }
            DecisionAction::Ignore => {
                ctx.acknowledged.insert(event.pattern_key());
            }
        }

        if event.kind == EventKind::Notice {
            ctx.acknowledged.insert(event.pattern_key());
        }

        self.progress.emit(
            "decision.applied",
            serde_json::json!({
                "request_id": decision.request_id,
                "step_index": ctx.current_step_index,
                "action": decision.action,
                "outcome": decision.outcome,
            }),
        );

        if decision.save_rule {
            self.learn(event, &decision, actions);
        }

        self.finish_outcome(ctx, decision.outcome).await
    }

    /// Press a follow-up control on whatever event now offers it.
    async fn press_follow_up(&self, original: &Event, control: &str) -> EngineResult<()> {
        let events = self.detector.detect().await?;
        if let Some(next) = events.iter().find(|e| e.has_control(control)) {
            return self.detector.press(next, control).await;
        }
        if original.has_control(control) {
            return self.detector.press(original, control).await;
        }
        tracing::warn!(control, "Follow-up control not found");
        Ok(())
    }

    fn learn(&mut self, event: &Event, decision: &Decision, actions: Vec<HandlerAction>) {
        let required_controls = match decision.action {
            DecisionAction::Press => decision.selected_option.iter().cloned().collect(),
            _ => Vec::new(),
        };

        let handler = Handler {
            id: format!("learned-{}", Uuid::new_v4()),
            enabled: true,
            priority: 0,
            mode: HandlerMode::Auto,
            trigger: HandlerTrigger {
                kind: event.kind,
                text_template: event.template.clone(),
                match_mode: MatchMode::Exact,
                required_controls,
            },
            actions,
            outcome: decision.outcome,
            learned: true,
            created_at: Some(Utc::now()),
        };

        if self.handlers.iter().any(|h| h.is_equivalent(&handler)) {
            tracing::debug!(template = %event.template, "Equivalent handler exists, not saving");
            return;
        }

        tracing::info!(
            handler_id = %handler.id,
            template = %event.template,
            "Learned handler"
        );
        self.progress.emit(
            "handler.learned",
            serde_json::json!({
                "handler_id": handler.id,
                "template": event.template,
                "outcome": handler.outcome,
            }),
        );
        self.handlers.push(handler.clone());
        self.learned.push(handler);
    }

    /// Re-detect until a blocking event is gone or the run is stopped.
    async fn wait_until_cleared(&self, ctx: &ExecutionContext, event: &Event) -> EngineResult<()> {
        let key = event.pattern_key();
        loop {
            ctx.checkpoint().await?;
            tokio::time::sleep(ctx.config.stall_poll_interval()).await;
            let events = self.detector.detect().await?;
            if !events.iter().any(|e| e.pattern_key() == key) {
                tracing::info!(template = %event.template, "Blocking dialog cleared");
                return Ok(());
            }
        }
    }
}
