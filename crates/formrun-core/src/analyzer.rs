//! Structural analysis of a step sequence.
//!
//! Pairs loop and if control steps into jump tables ahead of execution.
//! Every function here is a pure function of the step list: analysis is
//! re-run for each run because workflows can be edited between runs.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::workflow::{ErrorMode, Step, StepKind, Workflow};

/// A structural defect found by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralIssue {
    #[error("loop-end at step {index} has no matching loop-start{}", loop_ref.as_ref().map(|r| format!(" (loopRef '{}')", r)).unwrap_or_default())]
    UnmatchedLoopEnd {
        index: usize,
        loop_ref: Option<String>,
    },

    #[error("loop-start at step {index} is never closed")]
    UnclosedLoop { index: usize },

    #[error("else at step {index} has no open if-start")]
    UnmatchedElse { index: usize },

    #[error("second else at step {index} for if-start at step {if_index}")]
    DuplicateElse { index: usize, if_index: usize },

    #[error("if-end at step {index} has no open if-start")]
    UnmatchedIfEnd { index: usize },

    #[error("if-start at step {index} is never closed")]
    UnclosedIf { index: usize },

    #[error("label '{name}' at step {index} duplicates step {first}")]
    DuplicateLabel {
        name: String,
        index: usize,
        first: usize,
    },

    #[error("step {index} jumps to unknown label '{label}'")]
    UnknownLabel { index: usize, label: String },
}

/// Result of [`find_loop_pairs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopPairs {
    /// `(start, end)` pairs sorted by start index.
    pub pairs: Vec<(usize, usize)>,
    pub issues: Vec<StructuralIssue>,
}

/// Result of [`find_if_pairs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IfPairs {
    pub if_to_else: BTreeMap<usize, usize>,
    pub if_to_end: BTreeMap<usize, usize>,
    pub else_to_end: BTreeMap<usize, usize>,
    pub issues: Vec<StructuralIssue>,
}

struct OpenLoop {
    index: usize,
    id: Option<String>,
}

/// Pair every `loop-start` with its `loop-end`.
///
/// A `loop-end` naming a `loopRef` closes the innermost open loop with that
/// id, even if other loops opened after it are still open. A `loop-end`
/// without a ref closes the innermost open loop.
pub fn find_loop_pairs(steps: &[Step]) -> LoopPairs {
    let mut stack: Vec<OpenLoop> = Vec::new();
    let mut result = LoopPairs::default();

    for (index, step) in steps.iter().enumerate() {
        match &step.kind {
            StepKind::LoopStart(spec) => stack.push(OpenLoop {
                index,
                id: spec.id.clone(),
            }),
            StepKind::LoopEnd(end) => {
                let open = match &end.loop_ref {
                    Some(loop_ref) => stack
                        .iter()
                        .rposition(|open| open.id.as_deref() == Some(loop_ref.as_str()))
                        .map(|pos| stack.remove(pos)),
                    None => stack.pop(),
                };

                match open {
                    Some(open) => result.pairs.push((open.index, index)),
                    None => result.issues.push(StructuralIssue::UnmatchedLoopEnd {
                        index,
                        loop_ref: end.loop_ref.clone(),
                    }),
                }
            }
            _ => {}
        }
    }

    for open in stack {
        result.issues.push(StructuralIssue::UnclosedLoop { index: open.index });
    }

    result.pairs.sort_unstable();
    result
}

struct OpenIf {
    index: usize,
    else_index: Option<usize>,
}

/// Pair every `if-start` with its optional `else` and its `if-end`.
pub fn find_if_pairs(steps: &[Step]) -> IfPairs {
    let mut stack: Vec<OpenIf> = Vec::new();
    let mut result = IfPairs::default();

    for (index, step) in steps.iter().enumerate() {
        match &step.kind {
            StepKind::IfStart(_) => stack.push(OpenIf {
                index,
                else_index: None,
            }),
            StepKind::Else => match stack.last_mut() {
                Some(frame) if frame.else_index.is_none() => frame.else_index = Some(index),
                Some(frame) => result.issues.push(StructuralIssue::DuplicateElse {
                    index,
                    if_index: frame.index,
                }),
                None => result.issues.push(StructuralIssue::UnmatchedElse { index }),
            },
            StepKind::IfEnd => match stack.pop() {
                Some(frame) => {
                    result.if_to_end.insert(frame.index, index);
                    if let Some(else_index) = frame.else_index {
                        result.if_to_else.insert(frame.index, else_index);
                        result.else_to_end.insert(else_index, index);
                    }
                }
                None => result.issues.push(StructuralIssue::UnmatchedIfEnd { index }),
            },
            _ => {}
        }
    }

    for frame in stack {
        result.issues.push(StructuralIssue::UnclosedIf { index: frame.index });
    }

    result
}

/// Map label names to step indices. The first occurrence of a name wins.
pub fn build_label_map(steps: &[Step]) -> (HashMap<String, usize>, Vec<StructuralIssue>) {
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut issues = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        if let StepKind::Label(label) = &step.kind {
            if let Some(&first) = labels.get(&label.name) {
                issues.push(StructuralIssue::DuplicateLabel {
                    name: label.name.clone(),
                    index,
                    first,
                });
            } else {
                labels.insert(label.name.clone(), index);
            }
        }
    }

    (labels, issues)
}

/// Jump tables derived from a step sequence, immutable for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JumpTables {
    pub loop_pairs: BTreeMap<usize, usize>,
    pub if_to_else: BTreeMap<usize, usize>,
    pub if_to_end: BTreeMap<usize, usize>,
    pub else_to_end: BTreeMap<usize, usize>,
    pub label_map: HashMap<String, usize>,
}

impl JumpTables {
    /// Analyze a step sequence. Issues are returned, never raised.
    pub fn analyze(steps: &[Step]) -> (Self, Vec<StructuralIssue>) {
        let loops = find_loop_pairs(steps);
        let ifs = find_if_pairs(steps);
        let (label_map, label_issues) = build_label_map(steps);

        let mut issues = loops.issues;
        issues.extend(ifs.issues);
        issues.extend(label_issues);

        for (index, step) in steps.iter().enumerate() {
            if let StepKind::Goto(goto) = &step.kind {
                if !label_map.contains_key(&goto.target_label) {
                    issues.push(StructuralIssue::UnknownLabel {
                        index,
                        label: goto.target_label.clone(),
                    });
                }
            }
        }

        let tables = JumpTables {
            loop_pairs: loops.pairs.into_iter().collect(),
            if_to_else: ifs.if_to_else,
            if_to_end: ifs.if_to_end,
            else_to_end: ifs.else_to_end,
            label_map,
        };

        (tables, issues)
    }

    /// Resolve a label name to its step index.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.label_map.get(name).copied()
    }

    pub fn has_loops(&self) -> bool {
        !self.loop_pairs.is_empty()
    }
}

/// Analyze a whole workflow, including error-policy goto targets.
pub fn analyze_workflow(workflow: &Workflow) -> (JumpTables, Vec<StructuralIssue>) {
    let (tables, mut issues) = JumpTables::analyze(&workflow.steps);

    for (index, step) in workflow.steps.iter().enumerate() {
        if !step.is_action() {
            continue;
        }
        let policy = workflow.effective_policy(step);
        if policy.mode != ErrorMode::Goto {
            continue;
        }
        let label = policy.goto_label.unwrap_or_default();
        if tables.label(&label).is_none() {
            issues.push(StructuralIssue::UnknownLabel { index, label });
        }
    }

    (tables, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{
        ActionSpec, Condition, DataOp, ErrorPolicy, GotoSpec, IfSpec, LabelSpec, LoopEndSpec,
        LoopMode, LoopSpec,
    };

    fn loop_start(id: &str) -> Step {
        Step::new(StepKind::LoopStart(LoopSpec {
            id: Some(id.to_string()),
            mode: LoopMode::Count { loop_count: 1 },
        }))
    }

    fn loop_end(loop_ref: Option<&str>) -> Step {
        Step::new(StepKind::LoopEnd(LoopEndSpec {
            loop_ref: loop_ref.map(String::from),
        }))
    }

    fn click() -> Step {
        Step::new(StepKind::Click(ActionSpec::target("#a")))
    }

    fn if_start() -> Step {
        Step::new(StepKind::IfStart(IfSpec {
            condition: Condition::Data {
                field: "x".to_string(),
                op: DataOp::NotEmpty,
                value: None,
            },
        }))
    }

    fn label(name: &str) -> Step {
        Step::new(StepKind::Label(LabelSpec {
            name: name.to_string(),
        }))
    }

    fn goto(name: &str) -> Step {
        Step::new(StepKind::Goto(GotoSpec {
            target_label: name.to_string(),
        }))
    }

    #[test]
    fn test_nested_loops_pair_innermost_first() {
        let steps = vec![
            loop_start("outer"),
            loop_start("inner"),
            click(),
            loop_end(None),
            loop_end(None),
        ];
        let result = find_loop_pairs(&steps);
        assert_eq!(result.pairs, vec![(0, 4), (1, 3)]);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_loop_ref_closes_out_of_textual_order() {
        // outer closes first by ref while inner is still open.
        let steps = vec![
            loop_start("outer"),
            loop_start("inner"),
            loop_end(Some("outer")),
            loop_end(Some("inner")),
        ];
        let result = find_loop_pairs(&steps);
        assert_eq!(result.pairs, vec![(0, 2), (1, 3)]);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_loop_issues_are_reported_not_dropped() {
        let steps = vec![
            loop_end(None),
            loop_start("a"),
            click(),
            loop_end(Some("missing")),
        ];
        let result = find_loop_pairs(&steps);
        assert!(result.pairs.is_empty());
        assert_eq!(
            result.issues,
            vec![
                StructuralIssue::UnmatchedLoopEnd {
                    index: 0,
                    loop_ref: None
                },
                StructuralIssue::UnmatchedLoopEnd {
                    index: 3,
                    loop_ref: Some("missing".to_string())
                },
                StructuralIssue::UnclosedLoop { index: 1 },
            ]
        );
    }

    #[test]
    fn test_loop_pairs_are_well_nested() {
        let steps = vec![
            loop_start("a"),
            click(),
            loop_start("b"),
            loop_start("c"),
            click(),
            loop_end(Some("c")),
            loop_end(Some("b")),
            loop_end(Some("a")),
            loop_start("d"),
            loop_end(None),
        ];
        let result = find_loop_pairs(&steps);
        assert!(result.issues.is_empty());
        for &(start, end) in &result.pairs {
            assert!(start < end);
        }
        for (i, &(s1, e1)) in result.pairs.iter().enumerate() {
            for &(s2, e2) in &result.pairs[i + 1..] {
                let disjoint = e1 < s2 || e2 < s1;
                let nested = (s1 < s2 && e2 < e1) || (s2 < s1 && e1 < e2);
                assert!(disjoint || nested, "({s1},{e1}) vs ({s2},{e2})");
            }
        }
    }

    #[test]
    fn test_if_without_else() {
        let steps = vec![if_start(), click(), Step::new(StepKind::IfEnd)];
        let result = find_if_pairs(&steps);
        assert_eq!(result.if_to_end.get(&0), Some(&2));
        assert!(result.if_to_else.is_empty());
        assert!(result.else_to_end.is_empty());
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_if_with_else_is_consistent() {
        let steps = vec![
            if_start(),
            click(),
            Step::new(StepKind::Else),
            click(),
            Step::new(StepKind::IfEnd),
        ];
        let result = find_if_pairs(&steps);
        assert_eq!(result.if_to_else[&0], 2);
        assert_eq!(result.else_to_end[&2], result.if_to_end[&0]);
        assert_eq!(result.if_to_end[&0], 4);
    }

    #[test]
    fn test_nested_ifs() {
        let steps = vec![
            if_start(),
            if_start(),
            Step::new(StepKind::Else),
            Step::new(StepKind::IfEnd),
            Step::new(StepKind::Else),
            Step::new(StepKind::IfEnd),
        ];
        let result = find_if_pairs(&steps);
        assert_eq!(result.if_to_else[&1], 2);
        assert_eq!(result.if_to_end[&1], 3);
        assert_eq!(result.if_to_else[&0], 4);
        assert_eq!(result.if_to_end[&0], 5);
    }

    #[test]
    fn test_if_issues() {
        let steps = vec![
            Step::new(StepKind::Else),
            if_start(),
            Step::new(StepKind::Else),
            Step::new(StepKind::Else),
            Step::new(StepKind::IfEnd),
            Step::new(StepKind::IfEnd),
            if_start(),
        ];
        let result = find_if_pairs(&steps);
        assert_eq!(
            result.issues,
            vec![
                StructuralIssue::UnmatchedElse { index: 0 },
                StructuralIssue::DuplicateElse {
                    index: 3,
                    if_index: 1
                },
                StructuralIssue::UnmatchedIfEnd { index: 5 },
                StructuralIssue::UnclosedIf { index: 6 },
            ]
        );
        assert_eq!(result.if_to_else[&1], 2);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let steps = vec![
            label("top"),
            loop_start("a"),
            if_start(),
            click(),
            Step::new(StepKind::Else),
            goto("top"),
            Step::new(StepKind::IfEnd),
            loop_end(Some("a")),
        ];
        let (first, first_issues) = JumpTables::analyze(&steps);
        let (second, second_issues) = JumpTables::analyze(&steps);
        assert_eq!(first, second);
        assert_eq!(first_issues, second_issues);
        assert!(first_issues.is_empty());
        assert_eq!(first.label("top"), Some(0));
        assert!(first.has_loops());
    }

    #[test]
    fn test_labels_and_gotos() {
        let steps = vec![label("a"), label("a"), goto("b")];
        let (tables, issues) = JumpTables::analyze(&steps);
        assert_eq!(tables.label("a"), Some(0));
        assert_eq!(
            issues,
            vec![
                StructuralIssue::DuplicateLabel {
                    name: "a".to_string(),
                    index: 1,
                    first: 0
                },
                StructuralIssue::UnknownLabel {
                    index: 2,
                    label: "b".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_analyze_workflow_checks_policy_labels() {
        let workflow = Workflow::new(
            "w",
            vec![click().with_error_policy(ErrorPolicy::goto("recover"))],
        );
        let (_, issues) = analyze_workflow(&workflow);
        assert_eq!(
            issues,
            vec![StructuralIssue::UnknownLabel {
                index: 0,
                label: "recover".to_string()
            }]
        );
    }

    #[test]
    fn test_issue_display() {
        let issue = StructuralIssue::UnmatchedLoopEnd {
            index: 3,
            loop_ref: Some("L2".to_string()),
        };
        assert_eq!(
            issue.to_string(),
            "loop-end at step 3 has no matching loop-start (loopRef 'L2')"
        );
    }
}
