//! Collaborator fakes shared by the engine tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::collaborators::{ActionExecutor, Collaborators, EventDetector};
use crate::condition::{ElementState, SurfaceInspector};
use crate::error::{EngineError, EngineResult};
use crate::interpreter::RunControl;
use crate::interruption::{Decision, DecisionChannel, DecisionRequest, Event};
use crate::workflow::{
    ActionSpec, Condition, DataOp, Dataset, GotoSpec, IfSpec, LabelSpec, LoopEndSpec, LoopMode,
    LoopSpec, Step, StepKind,
};

/// Executor that records every call and fails, navigates or raises events
/// on demand, keyed by step target.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<(String, Option<String>)>>,
    failures: Mutex<HashMap<String, usize>>,
    navigations: HashSet<String>,
    raises: Vec<(String, Event)>,
    stops: Vec<(String, RunControl)>,
    detector: Option<Arc<ScriptedDetector>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` executions of `target`.
    pub fn failing(self, target: &str, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(target.to_string(), times);
        self
    }

    /// Report a navigation interrupt when `target` executes.
    pub fn navigating(mut self, target: &str) -> Self {
        self.navigations.insert(target.to_string());
        self
    }

    /// Show `event` on `detector` after `target` executes.
    pub fn raising(mut self, target: &str, event: Event, detector: &Arc<ScriptedDetector>) -> Self {
        self.raises.push((target.to_string(), event));
        self.detector = Some(detector.clone());
        self
    }

    /// Request a stop after `target` executes.
    pub fn stopping(mut self, target: &str, control: &RunControl) -> Self {
        self.stops.push((target.to_string(), control.clone()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(target, _)| target.clone())
            .collect()
    }

    pub fn values(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn count(&self, target: &str) -> usize {
        self.calls().iter().filter(|t| t.as_str() == target).count()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, step: &Step, value: Option<&str>) -> EngineResult<()> {
        let target = step
            .kind
            .action()
            .and_then(|a| a.target.clone())
            .unwrap_or_else(|| step.kind.type_name().to_string());
        self.calls
            .lock()
            .unwrap()
            .push((target.clone(), value.map(String::from)));

        for (stop_target, control) in &self.stops {
            if *stop_target == target {
                control.stop();
            }
        }

        if self.navigations.contains(&target) {
            return Err(EngineError::NavigationInterrupt(format!(
                "{} reloads the page",
                target
            )));
        }

        if let Some(detector) = &self.detector {
            for (raise_target, event) in &self.raises {
                if *raise_target == target {
                    detector.show(event.clone());
                }
            }
        }

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(&target) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(EngineError::step(format!("{} failed", target)));
            }
        }

        Ok(())
    }
}

/// Event detector over a mutable set of present events.
///
/// Pressing or dismissing an event removes it, unless the detector is
/// sticky.
#[derive(Default)]
pub struct ScriptedDetector {
    present: Mutex<Vec<Event>>,
    reactions: Mutex<Vec<(String, Event)>>,
    presses: Mutex<Vec<String>>,
    dismissals: Mutex<Vec<String>>,
    sticky: bool,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sticky(mut self) -> Self {
        self.sticky = true;
        self
    }

    pub fn show(&self, event: Event) {
        self.present.lock().unwrap().push(event);
    }

    /// Show `event` once `control` is pressed.
    pub fn after_press(&self, control: &str, event: Event) {
        self.reactions
            .lock()
            .unwrap()
            .push((control.to_string(), event));
    }

    /// Resolve everything out of band.
    pub fn clear(&self) {
        self.present.lock().unwrap().clear();
    }

    pub fn current(&self) -> Vec<Event> {
        self.present.lock().unwrap().clone()
    }

    pub fn presses(&self) -> Vec<String> {
        self.presses.lock().unwrap().clone()
    }

    pub fn dismissals(&self) -> Vec<String> {
        self.dismissals.lock().unwrap().clone()
    }

    fn resolve(&self, event: &Event) {
        if !self.sticky {
            let key = event.pattern_key();
            self.present
                .lock()
                .unwrap()
                .retain(|e| e.pattern_key() != key);
        }
    }
}

#[async_trait]
impl EventDetector for ScriptedDetector {
    async fn detect(&self) -> EngineResult<Vec<Event>> {
        Ok(self.current())
    }

    async fn press(&self, event: &Event, control: &str) -> EngineResult<()> {
        self.presses.lock().unwrap().push(control.to_string());
        self.resolve(event);

        let triggered: Vec<Event> = self
            .reactions
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c.eq_ignore_ascii_case(control))
            .map(|(_, e)| e.clone())
            .collect();
        for event in triggered {
            self.show(event);
        }
        Ok(())
    }

    async fn dismiss(&self, event: &Event) -> EngineResult<()> {
        self.dismissals.lock().unwrap().push(event.template.clone());
        self.resolve(event);
        Ok(())
    }
}

/// Decision channel answering each request from a script.
///
/// Queued answers are used in order, then the fallback answer if any.
/// Scripted answers get the request id filled in.
#[derive(Default)]
pub struct ScriptedDecisionChannel {
    answers: Mutex<VecDeque<Decision>>,
    fallback: Option<Decision>,
    ready: Mutex<VecDeque<Decision>>,
    requests: Mutex<Vec<DecisionRequest>>,
    stale: bool,
}

impl ScriptedDecisionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, decision: Decision) -> Self {
        self.answers.lock().unwrap().push_back(decision);
        self
    }

    pub fn always(mut self, decision: Decision) -> Self {
        self.fallback = Some(decision);
        self
    }

    /// Deliver a decision with a foreign id ahead of every real answer.
    pub fn with_stale_decisions(mut self) -> Self {
        self.stale = true;
        self
    }

    pub fn requests(&self) -> Vec<DecisionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionChannel for ScriptedDecisionChannel {
    async fn request(&self, request: DecisionRequest) -> EngineResult<()> {
        let answer = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone());

        let mut ready = self.ready.lock().unwrap();
        if self.stale {
            ready.push_back(Decision::press("stale-request", "OK"));
        }
        if let Some(mut decision) = answer {
            decision.request_id = request.request_id.clone();
            ready.push_back(decision);
        }
        self.requests.lock().unwrap().push(request);
        Ok(())
    }

    fn try_receive(&self) -> Option<Decision> {
        self.ready.lock().unwrap().pop_front()
    }
}

/// Surface over a mutable map of element states.
#[derive(Default)]
pub struct StaticSurface {
    states: Mutex<HashMap<String, ElementState>>,
}

impl StaticSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, target: &str, state: ElementState) {
        self.states
            .lock()
            .unwrap()
            .insert(target.to_string(), state);
    }
}

#[async_trait]
impl SurfaceInspector for StaticSurface {
    async fn inspect(&self, target: &str) -> EngineResult<ElementState> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_default())
    }
}

/// Fakes wired together.
pub struct Harness {
    pub executor: Arc<RecordingExecutor>,
    pub detector: Arc<ScriptedDetector>,
    pub inspector: Arc<StaticSurface>,
    pub decisions: Arc<ScriptedDecisionChannel>,
}

impl Harness {
    pub fn new(executor: RecordingExecutor) -> Self {
        Self::with_detector(executor, Arc::new(ScriptedDetector::new()))
    }

    pub fn with_detector(executor: RecordingExecutor, detector: Arc<ScriptedDetector>) -> Self {
        Self {
            executor: Arc::new(executor),
            detector,
            inspector: Arc::new(StaticSurface::new()),
            decisions: Arc::new(ScriptedDecisionChannel::new()),
        }
    }

    pub fn with_decisions(mut self, decisions: ScriptedDecisionChannel) -> Self {
        self.decisions = Arc::new(decisions);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.executor.clone(),
            self.inspector.clone(),
            self.detector.clone(),
        )
        .with_decisions(self.decisions.clone())
    }
}

pub fn click(target: &str) -> Step {
    Step::new(StepKind::Click(ActionSpec::target(target)))
}

pub fn label(name: &str) -> Step {
    Step::new(StepKind::Label(LabelSpec {
        name: name.to_string(),
    }))
}

pub fn goto(name: &str) -> Step {
    Step::new(StepKind::Goto(GotoSpec {
        target_label: name.to_string(),
    }))
}

pub fn if_start(condition: Condition) -> Step {
    Step::new(StepKind::IfStart(IfSpec { condition }))
}

pub fn data_condition(field: &str, op: DataOp, value: Option<&str>) -> Condition {
    Condition::Data {
        field: field.to_string(),
        op,
        value: value.map(String::from),
    }
}

/// A data condition that always holds or never holds.
pub fn constant(holds: bool) -> Condition {
    data_condition(
        "__never_set__",
        if holds { DataOp::Empty } else { DataOp::NotEmpty },
        None,
    )
}

pub fn loop_start(id: &str, mode: LoopMode) -> Step {
    Step::new(StepKind::LoopStart(LoopSpec {
        id: Some(id.to_string()),
        mode,
    }))
}

pub fn count_loop(id: &str, loop_count: usize) -> Step {
    loop_start(id, LoopMode::Count { loop_count })
}

pub fn data_loop(id: &str, source: Option<&str>) -> Step {
    loop_start(
        id,
        LoopMode::Data {
            data_source_ref: source.map(String::from),
            iteration_limit: None,
        },
    )
}

pub fn loop_end(loop_ref: &str) -> Step {
    Step::new(StepKind::LoopEnd(LoopEndSpec {
        loop_ref: Some(loop_ref.to_string()),
    }))
}

/// Dataset from JSON objects.
pub fn dataset(name: &str, rows: Vec<Value>) -> Dataset {
    Dataset::new(
        name,
        rows.into_iter()
            .map(|row| row.as_object().cloned().unwrap_or_else(Map::new))
            .collect(),
    )
}
