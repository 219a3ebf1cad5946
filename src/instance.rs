//! Data model for multi-target stream instances.
//!
//! A stream produces [`StreamInstance`]s: a fixed vector of numeric input
//! features plus one value per output target. Targets may be numeric or
//! nominal, and a target may be missing (not applicable) on a given
//! instance. The binary-relevance orchestrator views each instance through
//! a per-label [`LabelSchema`], projecting it into a [`LabelInstance`] with
//! a single target.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Description of a single attribute in a stream header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    /// Continuous attribute.
    Numeric { name: String },
    /// Categorical attribute with a fixed, small value set.
    Nominal { name: String, values: Vec<String> },
}

impl Attribute {
    pub fn numeric(name: impl Into<String>) -> Self {
        Attribute::Numeric { name: name.into() }
    }

    pub fn nominal(name: impl Into<String>, values: Vec<String>) -> Self {
        Attribute::Nominal {
            name: name.into(),
            values,
        }
    }

    /// Two-valued nominal attribute, the common case for label targets.
    pub fn binary(name: impl Into<String>) -> Self {
        Attribute::Nominal {
            name: name.into(),
            values: vec!["0".to_string(), "1".to_string()],
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Attribute::Numeric { name } => name,
            Attribute::Nominal { name, .. } => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Attribute::Numeric { .. })
    }

    /// Cardinality of the value set; numeric attributes report 1.
    pub fn num_values(&self) -> usize {
        match self {
            Attribute::Numeric { .. } => 1,
            Attribute::Nominal { values, .. } => values.len(),
        }
    }
}

/// Stream header: the attribute lists shared by every instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamHeader {
    pub inputs: Vec<Attribute>,
    pub outputs: Vec<Attribute>,
}

impl StreamHeader {
    pub fn new(inputs: Vec<Attribute>, outputs: Vec<Attribute>) -> Self {
        Self { inputs, outputs }
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }
}

/// One multi-target instance. Immutable once produced; arrives exactly
/// once, in stream order.
#[derive(Debug, Clone)]
pub struct StreamInstance {
    header: Arc<StreamHeader>,
    inputs: Vec<f64>,
    /// `None` marks a target as not applicable on this instance.
    outputs: Vec<Option<f64>>,
}

impl StreamInstance {
    pub fn new(header: Arc<StreamHeader>, inputs: Vec<f64>, outputs: Vec<Option<f64>>) -> Self {
        debug_assert_eq!(inputs.len(), header.num_inputs());
        debug_assert_eq!(outputs.len(), header.num_outputs());
        Self {
            header,
            inputs,
            outputs,
        }
    }

    pub fn header(&self) -> &Arc<StreamHeader> {
        &self.header
    }

    pub fn inputs(&self) -> &[f64] {
        &self.inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Target value for index `i`, or `None` when missing / out of range.
    pub fn output(&self, i: usize) -> Option<f64> {
        self.outputs.get(i).copied().flatten()
    }

    /// Whether target `i` carries a value on this instance.
    pub fn is_applicable(&self, i: usize) -> bool {
        self.output(i).is_some()
    }
}

/// Fixed schema for one binary projection: all input attributes of the
/// stream plus the single output attribute at `label_index`. Built once
/// per label on first training contact and never rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSchema {
    pub label_index: usize,
    pub num_inputs: usize,
    pub target: Attribute,
}

impl LabelSchema {
    pub fn from_header(header: &StreamHeader, label_index: usize) -> Self {
        Self {
            label_index,
            num_inputs: header.num_inputs(),
            target: header.outputs[label_index].clone(),
        }
    }

    /// Class count used by the uncertainty policy; numeric targets
    /// degenerate to 1.
    pub fn num_classes(&self) -> usize {
        self.target.num_values().max(1)
    }
}

/// Zero-copy view of a stream instance projected onto one label.
#[derive(Debug, Clone, Copy)]
pub struct LabelInstance<'a> {
    pub inputs: &'a [f64],
    pub target: Option<f64>,
    pub schema: &'a LabelSchema,
}

impl<'a> LabelInstance<'a> {
    pub fn project(instance: &'a StreamInstance, schema: &'a LabelSchema) -> Self {
        Self {
            inputs: instance.inputs(),
            target: instance.output(schema.label_index),
            schema,
        }
    }
}

/// Per-target slot of a multi-label prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TargetPrediction {
    /// Raw scalar for a numeric target.
    Numeric(f64),
    /// Normalized distribution over a nominal target's values. All-zero
    /// when the underlying vote vector carried no mass.
    Distribution(Vec<f64>),
}

impl TargetPrediction {
    /// Index of the winning class for a nominal slot.
    pub fn top_class(&self) -> Option<usize> {
        match self {
            TargetPrediction::Numeric(_) => None,
            TargetPrediction::Distribution(d) => {
                if d.is_empty() {
                    None
                } else {
                    Some(max_index(d))
                }
            }
        }
    }
}

/// Joint prediction over all output targets, one optional slot per index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiLabelPrediction {
    slots: Vec<Option<TargetPrediction>>,
}

impl MultiLabelPrediction {
    pub fn with_slots(n: usize) -> Self {
        Self {
            slots: vec![None; n],
        }
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn set(&mut self, i: usize, prediction: TargetPrediction) {
        if i < self.slots.len() {
            self.slots[i] = Some(prediction);
        }
    }

    pub fn get(&self, i: usize) -> Option<&TargetPrediction> {
        self.slots.get(i).and_then(|s| s.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&TargetPrediction>> {
        self.slots.iter().map(|s| s.as_ref())
    }
}

/// Index of the largest component, first winner on ties.
pub fn max_index(votes: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in votes.iter().enumerate().skip(1) {
        if v > votes[best] {
            best = i;
        }
    }
    best
}

/// Sum-to-one normalization. An all-zero vector maps to an all-zero
/// output rather than dividing by zero.
pub fn normalize_votes(votes: &[f64]) -> Vec<f64> {
    let total: f64 = votes.iter().sum();
    if total > 0.0 {
        votes.iter().map(|v| v / total).collect()
    } else {
        vec![0.0; votes.len()]
    }
}

/// Largest component after normalization; 0.0 for empty or single-element
/// vote vectors, matching the untrained / numeric degenerate case.
pub fn top_posterior(votes: &[f64]) -> f64 {
    if votes.len() > 1 {
        let normalized = normalize_votes(votes);
        normalized[max_index(&normalized)]
    } else {
        0.0
    }
}
