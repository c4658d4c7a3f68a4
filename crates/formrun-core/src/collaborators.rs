//! Host collaborators the interpreter drives.
//!
//! The engine never touches the host surface directly. Actions, values and
//! interruption detection all go through these traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::condition::{ConditionEvaluator, StandardConditionEvaluator, SurfaceInspector};
use crate::error::{EngineError, EngineResult};
use crate::interruption::{DecisionChannel, Event, NoDecisionChannel};
use crate::workflow::{DataRow, Step, ValueSource};

/// Everything the interpreter needs from the host.
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn ActionExecutor>,
    pub values: Arc<dyn ValueResolver>,
    pub conditions: Arc<dyn ConditionEvaluator>,
    pub inspector: Arc<dyn SurfaceInspector>,
    pub detector: Arc<dyn EventDetector>,
    pub decisions: Arc<dyn DecisionChannel>,
}

impl Collaborators {
    /// Collaborators with the standard value resolver and condition
    /// evaluator, and no decision host.
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        inspector: Arc<dyn SurfaceInspector>,
        detector: Arc<dyn EventDetector>,
    ) -> Self {
        Self {
            executor,
            values: Arc::new(StandardValueResolver::new()),
            conditions: Arc::new(StandardConditionEvaluator::new(inspector.clone())),
            inspector,
            detector,
            decisions: Arc::new(NoDecisionChannel),
        }
    }

    pub fn with_values(mut self, values: Arc<dyn ValueResolver>) -> Self {
        self.values = values;
        self
    }

    pub fn with_conditions(mut self, conditions: Arc<dyn ConditionEvaluator>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_decisions(mut self, decisions: Arc<dyn DecisionChannel>) -> Self {
        self.decisions = decisions;
        self
    }
}

/// Performs one atomic mutation of the host surface.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute an ordinary step with its resolved value.
    ///
    /// Returns `EngineError::NavigationInterrupt` when the host surface is
    /// about to reload.
    async fn execute(&self, step: &Step, value: Option<&str>) -> EngineResult<()>;
}

/// Resolves the value an ordinary step applies.
#[async_trait]
pub trait ValueResolver: Send + Sync {
    async fn resolve(&self, source: &ValueSource, row: &DataRow) -> EngineResult<Option<String>>;
}

/// External clipboard-like value source.
#[async_trait]
pub trait ClipboardSource: Send + Sync {
    async fn read(&self) -> EngineResult<Option<String>>;
}

/// Scans the host surface for interruptions and acts on them.
#[async_trait]
pub trait EventDetector: Send + Sync {
    /// Currently present dialogs and notices, most urgent first.
    async fn detect(&self) -> EngineResult<Vec<Event>>;

    /// Press a control of an event.
    async fn press(&self, event: &Event, control: &str) -> EngineResult<()>;

    /// Dismiss an event without pressing a control.
    async fn dismiss(&self, event: &Event) -> EngineResult<()>;
}

/// Value resolver for literal, row and clipboard sources.
#[derive(Default)]
pub struct StandardValueResolver {
    clipboard: Option<Arc<dyn ClipboardSource>>,
}

impl StandardValueResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn ClipboardSource>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }
}

#[async_trait]
impl ValueResolver for StandardValueResolver {
    async fn resolve(&self, source: &ValueSource, row: &DataRow) -> EngineResult<Option<String>> {
        match source {
            ValueSource::Static { value } => Ok(Some(value.clone())),
            ValueSource::Data { field } => row.get_str(field).map(Some).ok_or_else(|| {
                EngineError::ValueUnavailable(format!("Field '{}' not found in row", field))
            }),
            ValueSource::Clipboard => {
                let clipboard = self.clipboard.as_ref().ok_or_else(|| {
                    EngineError::ValueUnavailable("No clipboard source configured".to_string())
                })?;
                clipboard.read().await?.map(Some).ok_or_else(|| {
                    EngineError::ValueUnavailable("Clipboard is empty".to_string())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedClipboard(Option<String>);

    #[async_trait]
    impl ClipboardSource for FixedClipboard {
        async fn read(&self) -> EngineResult<Option<String>> {
            Ok(self.0.clone())
        }
    }

    fn row() -> DataRow {
        let item = json!({"customer": "ACME", "qty": 3});
        DataRow::from_item("orders", item.as_object().unwrap())
    }

    #[tokio::test]
    async fn test_static_and_data_values() {
        let resolver = StandardValueResolver::new();
        let value = resolver
            .resolve(&ValueSource::Static { value: "x".into() }, &row())
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("x"));

        let value = resolver
            .resolve(&ValueSource::Data { field: "orders:qty".into() }, &row())
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("3"));

        let value = resolver
            .resolve(&ValueSource::Data { field: "invoices:customer".into() }, &row())
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("ACME"));
    }

    #[tokio::test]
    async fn test_missing_field_is_unavailable() {
        let err = StandardValueResolver::new()
            .resolve(&ValueSource::Data { field: "nope".into() }, &row())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ValueUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_clipboard_source() {
        let err = StandardValueResolver::new()
            .resolve(&ValueSource::Clipboard, &row())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ValueUnavailable(_)));

        let resolver = StandardValueResolver::new()
            .with_clipboard(Arc::new(FixedClipboard(Some("pasted".into()))));
        let value = resolver.resolve(&ValueSource::Clipboard, &row()).await.unwrap();
        assert_eq!(value.as_deref(), Some("pasted"));

        let resolver =
            StandardValueResolver::new().with_clipboard(Arc::new(FixedClipboard(None)));
        assert!(resolver.resolve(&ValueSource::Clipboard, &row()).await.is_err());
    }
}
