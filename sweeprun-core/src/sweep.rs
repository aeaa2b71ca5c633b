//! Hyperparameter sweeps over a Cartesian product of named axes.
//!
//! A batch-array scheduler hands every task a single integer. [`JobIterator`]
//! turns that integer into one concrete assignment of hyperparameter values,
//! decoding it as a mixed-radix number whose last digit belongs to the last
//! declared axis. Enumerating `0..njobs()` therefore visits the points in the
//! same order as nested loops written in declaration order.

use crate::error::HarnessError;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Range;

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Bool(b) => serde_json::Value::Bool(*b),
            ParamValue::Int(i) => serde_json::Value::from(*i),
            ParamValue::Float(f) => serde_json::Value::from(*f),
            ParamValue::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x:?}"),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// One named axis of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub values: Vec<ParamValue>,
}

/// Ordered set of axes. Declaration order decides the index layout.
///
/// Deserializes from either a list of `{name, values}` records, which keeps
/// the written order, or a table mapping each name to its values, whose
/// order is whatever the source yields (sorted by name through `figment`).
/// Duplicate names are rejected in both forms.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HyperparameterSpace {
    axes: Vec<Axis>,
}

impl HyperparameterSpace {
    pub fn new() -> Self {
        Self { axes: Vec::new() }
    }

    /// Append an axis. Re-declaring a name replaces its values in place.
    pub fn axis<V: Into<ParamValue>>(
        mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values: Vec<ParamValue> = values.into_iter().map(Into::into).collect();
        match self.axes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.values = values,
            None => self.axes.push(Axis {
                name: name.to_string(),
                values,
            }),
        }
        self
    }

    /// Append an integer axis covering `range`.
    pub fn range(self, name: &str, range: Range<i64>) -> Self {
        self.axis(name, range)
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }
}

impl<'de> Deserialize<'de> for HyperparameterSpace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SpaceVisitor)
    }
}

struct SpaceVisitor;

impl SpaceVisitor {
    fn push<E: de::Error>(axes: &mut Vec<Axis>, axis: Axis) -> Result<(), E> {
        if axes.iter().any(|a| a.name == axis.name) {
            return Err(E::custom(format!("duplicate sweep axis `{}`", axis.name)));
        }
        axes.push(axis);
        Ok(())
    }
}

impl<'de> Visitor<'de> for SpaceVisitor {
    type Value = HyperparameterSpace;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of {name, values} axes or a table of name = [values]")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut axes = Vec::new();
        while let Some(axis) = seq.next_element::<Axis>()? {
            Self::push(&mut axes, axis)?;
        }
        Ok(HyperparameterSpace { axes })
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut axes = Vec::new();
        while let Some((name, values)) = map.next_entry::<String, Vec<ParamValue>>()? {
            Self::push(&mut axes, Axis { name, values })?;
        }
        Ok(HyperparameterSpace { axes })
    }
}

/// The assignment selected by one job index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPoint {
    pub index: usize,
    pub assignments: Vec<(String, ParamValue)>,
}

impl JobPoint {
    /// Parameter string for file names: `name_value` pairs joined by `_`.
    pub fn describe(&self) -> String {
        self.assignments
            .iter()
            .map(|(name, value)| format!("{name}_{value}"))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn as_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.assignments
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.assignments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for JobPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

/// Maps job indices onto points of a [`HyperparameterSpace`].
#[derive(Debug, Clone)]
pub struct JobIterator {
    space: HyperparameterSpace,
    njobs: usize,
}

impl JobIterator {
    /// Fails when the number of points does not fit in a `usize`.
    pub fn new(space: HyperparameterSpace) -> Result<Self, HarnessError> {
        let njobs = space
            .axes
            .iter()
            .try_fold(1usize, |acc, axis| acc.checked_mul(axis.values.len()))
            .ok_or_else(|| HarnessError::config("sweep has too many points to index"))?;
        Ok(Self { space, njobs })
    }

    /// Number of points. The empty space has exactly one (empty) point.
    pub fn njobs(&self) -> usize {
        self.njobs
    }

    /// Decode `index` into its point.
    pub fn point(&self, index: usize) -> Result<JobPoint, HarnessError> {
        let njobs = self.njobs;
        if index >= njobs {
            return Err(HarnessError::IndexOutOfRange { index, njobs });
        }

        let mut remainder = index;
        let mut assignments = Vec::with_capacity(self.space.axes.len());
        for axis in self.space.axes.iter().rev() {
            let radix = axis.values.len();
            let digit = remainder % radix;
            remainder /= radix;
            assignments.push((axis.name.clone(), axis.values[digit].clone()));
        }
        assignments.reverse();

        Ok(JobPoint { index, assignments })
    }

    /// Every point, in index order.
    pub fn points(&self) -> impl Iterator<Item = JobPoint> + '_ {
        (0..self.njobs).filter_map(move |i| self.point(i).ok())
    }
}
