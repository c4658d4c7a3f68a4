//! Condition evaluation for `if-start` steps and while loops.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::workflow::{Condition, DataOp, DataRow, UiCheck, WaitState};

/// Snapshot of one element of the host surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    pub exists: bool,
    pub visible: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: String,
}

impl ElementState {
    /// An element that is not on the surface at all.
    pub fn missing() -> Self {
        Self::default()
    }

    /// A visible element with the given text.
    pub fn visible(text: impl Into<String>) -> Self {
        Self {
            exists: true,
            visible: true,
            text: text.into(),
            value: String::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Whether the element is in the given visibility state.
    pub fn satisfies(&self, state: WaitState) -> bool {
        match state {
            WaitState::Visible => self.exists && self.visible,
            WaitState::Hidden => !self.exists || !self.visible,
            WaitState::Exists => self.exists,
        }
    }
}

/// Reads element state from the host surface.
#[async_trait]
pub trait SurfaceInspector: Send + Sync {
    async fn inspect(&self, target: &str) -> EngineResult<ElementState>;
}

/// Evaluates a condition against the surface and the current row.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    async fn evaluate(&self, condition: &Condition, row: &DataRow) -> EngineResult<bool>;
}

/// Lower-case, trim and collapse internal whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Evaluate a data predicate. A missing field reads as the empty string.
pub fn evaluate_data(field: &str, op: DataOp, expected: Option<&str>, row: &DataRow) -> bool {
    let actual = normalize(&row.get_str(field).unwrap_or_default());
    let expected = normalize(expected.unwrap_or_default());

    match op {
        DataOp::Equals => actual == expected,
        DataOp::NotEquals => actual != expected,
        DataOp::Contains => actual.contains(&expected),
        DataOp::Empty => actual.is_empty(),
        DataOp::NotEmpty => !actual.is_empty(),
    }
}

/// Evaluate a UI predicate over an element snapshot.
pub fn evaluate_ui(check: UiCheck, expected: Option<&str>, state: &ElementState) -> bool {
    let expected = normalize(expected.unwrap_or_default());

    match check {
        UiCheck::Visible => state.satisfies(WaitState::Visible),
        UiCheck::Hidden => state.satisfies(WaitState::Hidden),
        UiCheck::Exists => state.exists,
        UiCheck::TextEquals => state.exists && normalize(&state.text) == expected,
        UiCheck::TextContains => state.exists && normalize(&state.text).contains(&expected),
        UiCheck::ValueEquals => state.exists && normalize(&state.value) == expected,
        UiCheck::ValueContains => state.exists && normalize(&state.value).contains(&expected),
    }
}

/// Evaluates data predicates locally and UI predicates through a [`SurfaceInspector`].
pub struct StandardConditionEvaluator {
    inspector: Arc<dyn SurfaceInspector>,
}

impl StandardConditionEvaluator {
    pub fn new(inspector: Arc<dyn SurfaceInspector>) -> Self {
        Self { inspector }
    }
}

#[async_trait]
impl ConditionEvaluator for StandardConditionEvaluator {
    async fn evaluate(&self, condition: &Condition, row: &DataRow) -> EngineResult<bool> {
        let result = match condition {
            Condition::Data { field, op, value } => {
                evaluate_data(field, *op, value.as_deref(), row)
            }
            Condition::Ui {
                target,
                check,
                value,
            } => {
                let state = self.inspector.inspect(target).await?;
                evaluate_ui(*check, value.as_deref(), &state)
            }
        };

        tracing::debug!(?condition, result, "Evaluated condition");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use serde_json::json;
    use std::collections::HashMap;

    struct MapSurface(HashMap<String, ElementState>);

    #[async_trait]
    impl SurfaceInspector for MapSurface {
        async fn inspect(&self, target: &str) -> EngineResult<ElementState> {
            if target == "#broken" {
                return Err(EngineError::Condition("inspection failed".to_string()));
            }
            Ok(self.0.get(target).cloned().unwrap_or_default())
        }
    }

    fn row() -> DataRow {
        let item = json!({"status": "  Open   Order ", "note": ""});
        DataRow::from_item("orders", item.as_object().unwrap())
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hello \n  World "), "hello world");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_data_predicates() {
        let row = row();
        assert!(evaluate_data("status", DataOp::Equals, Some("open order"), &row));
        assert!(evaluate_data("orders:status", DataOp::Contains, Some("OPEN"), &row));
        assert!(evaluate_data("status", DataOp::NotEquals, Some("closed"), &row));
        assert!(evaluate_data("note", DataOp::Empty, None, &row));
        assert!(evaluate_data("missing", DataOp::Empty, None, &row));
        assert!(evaluate_data("status", DataOp::NotEmpty, None, &row));
    }

    #[test]
    fn test_ui_predicates() {
        let hidden = ElementState {
            exists: true,
            visible: false,
            text: "Saved".to_string(),
            value: String::new(),
        };
        assert!(evaluate_ui(UiCheck::Hidden, None, &hidden));
        assert!(evaluate_ui(UiCheck::Exists, None, &hidden));
        assert!(!evaluate_ui(UiCheck::Visible, None, &hidden));
        assert!(evaluate_ui(UiCheck::Hidden, None, &ElementState::missing()));

        let field = ElementState::visible("Customer").with_value(" ACME  Corp ");
        assert!(evaluate_ui(UiCheck::ValueEquals, Some("acme corp"), &field));
        assert!(evaluate_ui(UiCheck::ValueContains, Some("acme"), &field));
        assert!(evaluate_ui(UiCheck::TextEquals, Some("customer"), &field));
        assert!(!evaluate_ui(UiCheck::TextContains, Some("x"), &ElementState::missing()));
    }

    #[tokio::test]
    async fn test_standard_evaluator() {
        let mut elements = HashMap::new();
        elements.insert("#banner".to_string(), ElementState::visible("Welcome back"));
        let evaluator = StandardConditionEvaluator::new(Arc::new(MapSurface(elements)));

        let ui = Condition::Ui {
            target: "#banner".to_string(),
            check: UiCheck::TextContains,
            value: Some("welcome".to_string()),
        };
        assert!(evaluator.evaluate(&ui, &row()).await.unwrap());

        let data = Condition::Data {
            field: "status".to_string(),
            op: DataOp::Empty,
            value: None,
        };
        assert!(!evaluator.evaluate(&data, &row()).await.unwrap());

        let broken = Condition::Ui {
            target: "#broken".to_string(),
            check: UiCheck::Visible,
            value: None,
        };
        assert!(evaluator.evaluate(&broken, &row()).await.is_err());
    }
}
