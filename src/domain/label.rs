// ============================================================
// Layer 3 — Labels and Task Type
// ============================================================
// Labels come in three kinds. The kind decides the task:
//
//   Text    ["yes", "no"]   → classification
//   Integer [0, 1, 2]       → classification
//   Float   [0.5, 1.25]     → regression
//
// Class labels must be totally ordered so the label set can be
// sorted into a stable label ↔ output-index mapping.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FinetuneError, FinetuneResult};

/// The kind of supervised problem being solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Classification,
    Regression,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Classification => write!(f, "classification"),
            TaskType::Regression => write!(f, "regression"),
        }
    }
}

/// A single label value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Label {
    fn rank(&self) -> u8 {
        match self {
            Label::Text(_) => 0,
            Label::Integer(_) => 1,
            Label::Float(_) => 2,
        }
    }

    /// Numeric value of a regression output.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Label::Integer(v) => Some(*v as f64),
            Label::Float(v) => Some(*v),
            Label::Text(_) => None,
        }
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Label::Text(a), Label::Text(b)) => a.cmp(b),
            (Label::Integer(a), Label::Integer(b)) => a.cmp(b),
            (Label::Float(a), Label::Float(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Label {}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Text(s) => write!(f, "{s}"),
            Label::Integer(v) => write!(f, "{v}"),
            Label::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::Text(s.to_string())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label::Text(s)
    }
}

impl From<i64> for Label {
    fn from(v: i64) -> Self {
        Label::Integer(v)
    }
}

impl From<f64> for Label {
    fn from(v: f64) -> Self {
        Label::Float(v)
    }
}

/// A column of labels, all of one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    Text(Vec<String>),
    Integer(Vec<i64>),
    Float(Vec<f64>),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Text(v) => v.len(),
            Labels::Integer(v) => v.len(),
            Labels::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Float labels mean regression, anything else classification.
    pub fn task_type(&self) -> TaskType {
        match self {
            Labels::Float(_) => TaskType::Regression,
            Labels::Text(_) | Labels::Integer(_) => TaskType::Classification,
        }
    }

    pub fn to_labels(&self) -> Vec<Label> {
        match self {
            Labels::Text(v) => v.iter().cloned().map(Label::Text).collect(),
            Labels::Integer(v) => v.iter().copied().map(Label::Integer).collect(),
            Labels::Float(v) => v.iter().copied().map(Label::Float).collect(),
        }
    }

    /// Numeric targets for regression.
    pub fn to_targets(&self) -> FinetuneResult<Vec<f32>> {
        match self {
            Labels::Float(v) => {
                if let Some(i) = v.iter().position(|x| !x.is_finite()) {
                    return Err(FinetuneError::InvalidLabels(format!(
                        "label {i} is not a finite number"
                    )));
                }
                Ok(v.iter().map(|&x| x as f32).collect())
            }
            Labels::Integer(v) => Ok(v.iter().map(|&x| x as f32).collect()),
            Labels::Text(_) => Err(FinetuneError::InvalidLabels(
                "text labels cannot be used as regression targets".into(),
            )),
        }
    }

    /// Collect individually-typed labels into one column.
    /// Integers and floats mix into a float column; text never mixes.
    pub fn from_values(values: Vec<Label>) -> FinetuneResult<Self> {
        let has_text = values.iter().any(|l| matches!(l, Label::Text(_)));
        let has_float = values.iter().any(|l| matches!(l, Label::Float(_)));

        if has_text {
            values
                .into_iter()
                .enumerate()
                .map(|(i, l)| match l {
                    Label::Text(s) => Ok(s),
                    other => Err(FinetuneError::InvalidLabels(format!(
                        "label {i} is numeric ({other}) in a column of text labels"
                    ))),
                })
                .collect::<FinetuneResult<Vec<_>>>()
                .map(Labels::Text)
        } else if has_float {
            Ok(Labels::Float(
                values.iter().filter_map(Label::as_f64).collect(),
            ))
        } else {
            Ok(Labels::Integer(
                values
                    .into_iter()
                    .filter_map(|l| match l {
                        Label::Integer(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            ))
        }
    }
}

impl From<Vec<String>> for Labels {
    fn from(v: Vec<String>) -> Self {
        Labels::Text(v)
    }
}

impl From<Vec<&str>> for Labels {
    fn from(v: Vec<&str>) -> Self {
        Labels::Text(v.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Labels {
    fn from(v: [&str; N]) -> Self {
        Labels::Text(v.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<i64>> for Labels {
    fn from(v: Vec<i64>) -> Self {
        Labels::Integer(v)
    }
}

impl From<Vec<f64>> for Labels {
    fn from(v: Vec<f64>) -> Self {
        Labels::Float(v)
    }
}

impl From<Vec<f32>> for Labels {
    fn from(v: Vec<f32>) -> Self {
        Labels::Float(v.into_iter().map(f64::from).collect())
    }
}

/// Whether the task type has been fixed for a model instance.
///
/// Set once on the first fine-tuning call and never re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Unconfigured,
    Configured(TaskType),
}

impl TaskState {
    pub fn task_type(&self) -> Option<TaskType> {
        match self {
            TaskState::Unconfigured => None,
            TaskState::Configured(t) => Some(*t),
        }
    }

    /// Fix the task type, or check the request against the fixed one.
    pub fn configure(&mut self, requested: TaskType) -> FinetuneResult<TaskType> {
        match *self {
            TaskState::Unconfigured => {
                *self = TaskState::Configured(requested);
                tracing::info!("Task type inferred from labels: {}", requested);
                Ok(requested)
            }
            TaskState::Configured(configured) if configured == requested => Ok(configured),
            TaskState::Configured(configured) => Err(FinetuneError::TaskTypeConflict {
                configured,
                requested,
            }),
        }
    }
}

/// Sorted set of class labels with their output indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassIndex {
    classes: Vec<Label>,
}

impl ClassIndex {
    /// Build from the distinct training labels.
    pub fn fit(labels: &Labels) -> FinetuneResult<Self> {
        let classes: Vec<Label> = labels
            .to_labels()
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if classes.is_empty() {
            return Err(FinetuneError::EmptyDataset);
        }
        if classes.len() == 1 {
            tracing::warn!("Only one class present in the labels: {}", classes[0]);
        }
        Ok(Self { classes })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    pub fn index_of(&self, label: &Label) -> Option<usize> {
        self.classes.binary_search(label).ok()
    }

    pub fn label(&self, index: usize) -> Option<&Label> {
        self.classes.get(index)
    }

    /// Output index for every label, in order.
    pub fn encode(&self, labels: &Labels) -> FinetuneResult<Vec<usize>> {
        labels
            .to_labels()
            .iter()
            .map(|l| {
                self.index_of(l).ok_or_else(|| {
                    FinetuneError::InvalidLabels(format!("unknown class label '{l}'"))
                })
            })
            .collect()
    }
}
