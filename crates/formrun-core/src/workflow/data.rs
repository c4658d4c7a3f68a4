//! Tabular data the workflow iterates over.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named table of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<Map<String, Value>>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, rows: Vec<Map<String, Value>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Slice the rows by `skip` and an optional `limit`.
    pub fn sliced(&self, skip: usize, limit: Option<usize>) -> Dataset {
        let rows = self
            .rows
            .iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Dataset {
            name: self.name.clone(),
            rows,
        }
    }
}

/// Datasets a run iterates over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunInput {
    /// Rows of the top-level loop, or of the simple per-row mode.
    pub primary: Dataset,
    /// Named datasets data loops can reference.
    #[serde(default)]
    pub details: Vec<Dataset>,
}

impl RunInput {
    pub fn new(primary: Dataset) -> Self {
        Self {
            primary,
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, dataset: Dataset) -> Self {
        self.details.push(dataset);
        self
    }

    /// Find a detail dataset by name.
    pub fn detail(&self, name: &str) -> Option<&Dataset> {
        self.details.iter().find(|d| d.name == name)
    }
}

/// Maps a parent field to a child field of a detail dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub parent_field: String,
    pub child_field: String,
}

/// Declares how rows of a detail dataset relate to rows of a parent dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub parent_source: String,
    pub child_source: String,
    pub mappings: Vec<FieldMapping>,
}

/// The row a step executes against.
///
/// Each data loop merges its item into the enclosing row: item fields are
/// stored bare (overriding the parent's) and namespaced as `source:field`
/// (never overridden by a different source), and the source name is pushed
/// onto `lineage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub lineage: Vec<String>,
}

impl DataRow {
    /// Row for one item of a top-level dataset.
    pub fn from_item(source: &str, item: &Map<String, Value>) -> Self {
        DataRow::default().merge_item(source, item)
    }

    /// Merge a loop item into a copy of this row.
    pub fn merge_item(&self, source: &str, item: &Map<String, Value>) -> Self {
        let mut fields = self.fields.clone();
        for (key, value) in item {
            fields.insert(key.clone(), value.clone());
            fields.insert(format!("{}:{}", source, key), value.clone());
        }
        let mut lineage = self.lineage.clone();
        lineage.push(source.to_string());
        Self { fields, lineage }
    }

    /// Look up a field; a namespaced `source:field` key falls back to `field`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.fields.get(key) {
            return Some(value);
        }
        let (_, bare) = key.split_once(':')?;
        self.fields.get(bare)
    }

    /// Look up a field rendered as a string.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(value_to_string)
    }

    /// Whether a loop over `source` encloses this row.
    pub fn descends_from(&self, source: &str) -> bool {
        self.lineage.iter().any(|s| s == source)
    }

    /// Resolve a parent field for a relationship.
    ///
    /// Only the namespaced key written by an enclosing loop over
    /// `parent_source` counts; a bare key may belong to any ancestor.
    pub fn parent_value(&self, parent_source: &str, field: &str) -> Option<String> {
        if !self.descends_from(parent_source) {
            return None;
        }
        self.fields
            .get(&format!("{}:{}", parent_source, field))
            .map(value_to_string)
            .filter(|s| !s.trim().is_empty())
    }

    /// Name of the innermost loop source, if any.
    pub fn nearest_source(&self) -> Option<&str> {
        self.lineage.last().map(|s| s.as_str())
    }
}

/// Result of resolving a detail dataset against the current row.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailSelection {
    /// Rows matched through the relationship at `relationship` (declaration index).
    Filtered {
        relationship: usize,
        rows: Vec<Map<String, Value>>,
    },
    /// No relationship is declared for the dataset; all rows apply.
    Unrelated(Vec<Map<String, Value>>),
    /// Relationships exist but none can be resolved from the current row.
    Unresolvable,
}

impl DetailSelection {
    pub fn into_rows(self) -> Vec<Map<String, Value>> {
        match self {
            DetailSelection::Filtered { rows, .. } | DetailSelection::Unrelated(rows) => rows,
            DetailSelection::Unresolvable => Vec::new(),
        }
    }
}

/// Select the rows of `dataset` that belong to `row`.
///
/// Relationships whose child is `dataset` are checked in declaration order;
/// the first one whose parent is an enclosing loop source and whose parent
/// fields all resolve from `row` filters the dataset.
pub fn select_detail_rows(
    dataset: &Dataset,
    relationships: &[Relationship],
    row: &DataRow,
) -> DetailSelection {
    let candidates: Vec<(usize, &Relationship)> = relationships
        .iter()
        .enumerate()
        .filter(|(_, rel)| rel.child_source == dataset.name)
        .collect();

    if candidates.is_empty() {
        return DetailSelection::Unrelated(dataset.rows.clone());
    }

    for (index, relationship) in candidates {
        if relationship.mappings.is_empty() || !row.descends_from(&relationship.parent_source) {
            continue;
        }

        let keys: Option<Vec<(&str, String)>> = relationship
            .mappings
            .iter()
            .map(|m| {
                row.parent_value(&relationship.parent_source, &m.parent_field)
                    .map(|v| (m.child_field.as_str(), v))
            })
            .collect();

        let Some(keys) = keys else {
            continue;
        };

        let rows = dataset
            .rows
            .iter()
            .filter(|item| {
                keys.iter().all(|(child_field, expected)| {
                    item.get(*child_field)
                        .map(|v| value_to_string(v).trim() == expected.trim())
                        .unwrap_or(false)
                })
            })
            .cloned()
            .collect();

        return DetailSelection::Filtered {
            relationship: index,
            rows,
        };
    }

    DetailSelection::Unresolvable
}

/// Render a JSON value as a plain string.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}
