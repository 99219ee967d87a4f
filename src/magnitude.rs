// 📏 Magnitudes - caller specification in, normalized descriptors out
//
// MagnitudeSpec:   key (leaf | group | variable, ambiguous until resolved) → value
// DescriptorMap:   variable → TransformationEntry, the plan handed to the applier

use crate::error::{Result, TransformError};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

// ============================================================================
// MAGNITUDE SPECIFICATION (input)
// ============================================================================

/// Either one scalar for every matched category, or one scalar per category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MagnitudeValue {
    Scalar(f64),
    PerCategory(BTreeMap<String, f64>),
}

impl MagnitudeValue {
    pub fn is_per_category(&self) -> bool {
        matches!(self, MagnitudeValue::PerCategory(_))
    }

    /// Apply `f` to every scalar held by the value
    pub fn map(&self, f: impl Fn(f64) -> f64) -> MagnitudeValue {
        match self {
            MagnitudeValue::Scalar(v) => MagnitudeValue::Scalar(f(*v)),
            MagnitudeValue::PerCategory(values) => MagnitudeValue::PerCategory(
                values.iter().map(|(c, v)| (c.clone(), f(*v))).collect(),
            ),
        }
    }

    fn scalars(&self) -> Vec<f64> {
        match self {
            MagnitudeValue::Scalar(v) => vec![*v],
            MagnitudeValue::PerCategory(values) => values.values().copied().collect(),
        }
    }
}

/// Caller-supplied magnitudes. Insertion order is kept because later keys
/// overwrite earlier ones when they hit the same (variable, category).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MagnitudeSpec {
    entries: Vec<(String, MagnitudeValue)>,
}

impl MagnitudeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a scalar for a key
    pub fn scalar(mut self, key: impl Into<String>, value: f64) -> Self {
        self.insert(key, MagnitudeValue::Scalar(value));
        self
    }

    /// Builder: add per-category scalars for a key
    pub fn per_category<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let values = values.into_iter().map(|(c, v)| (c.into(), v)).collect();
        self.insert(key, MagnitudeValue::PerCategory(values));
        self
    }

    /// Insert or replace a key. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: MagnitudeValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MagnitudeValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MagnitudeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every scalar must be finite
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.entries {
            if let Some(bad) = value.scalars().into_iter().find(|v| !v.is_finite()) {
                return Err(TransformError::InvalidMagnitude {
                    key: key.clone(),
                    value: bad,
                });
            }
        }
        Ok(())
    }

    /// Same keys, every scalar passed through `f`
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> MagnitudeSpec {
        MagnitudeSpec {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.map(&f)))
                .collect(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, MagnitudeValue)> for MagnitudeSpec {
    fn from_iter<T: IntoIterator<Item = (K, MagnitudeValue)>>(iter: T) -> Self {
        let mut spec = MagnitudeSpec::new();
        for (k, v) in iter {
            spec.insert(k, v);
        }
        spec
    }
}

impl Serialize for MagnitudeSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// JSON objects are read in document order
impl<'de> Deserialize<'de> for MagnitudeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = MagnitudeSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of key to magnitude (number or map of category to number)")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut spec = MagnitudeSpec::new();
                while let Some((key, value)) = access.next_entry::<String, MagnitudeValue>()? {
                    spec.insert(key, value);
                }
                Ok(spec)
            }
        }

        deserializer.deserialize_map(SpecVisitor)
    }
}

// ============================================================================
// MAGNITUDE KIND + BOUNDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudeKind {
    /// Target = each row's own baseline value × magnitude
    ScalarOfBaseline,

    /// Target = magnitude itself
    AbsoluteBounded,
}

impl MagnitudeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MagnitudeKind::ScalarOfBaseline => "scalar_of_baseline",
            MagnitudeKind::AbsoluteBounded => "absolute_bounded",
        }
    }
}

/// Closed value interval; `upper: None` is unbounded above
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: Option<f64>,
}

impl Bounds {
    pub fn new(lower: f64, upper: Option<f64>) -> Result<Self> {
        let bad = lower.is_nan()
            || upper.map_or(false, |u| u.is_nan() || u < lower);
        if bad {
            return Err(TransformError::InvalidBounds { lower, upper });
        }
        Ok(Bounds { lower, upper })
    }

    /// [0, +∞): a multiplicative scalar must not drive a value negative
    pub fn non_negative() -> Self {
        Bounds {
            lower: 0.0,
            upper: None,
        }
    }

    /// Clamp into the interval. NaN passes through unchanged.
    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.lower {
            return self.lower;
        }
        match self.upper {
            Some(upper) if value > upper => upper,
            _ => value,
        }
    }
}

// ============================================================================
// RESOLVED TRANSFORMATION ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationEntry {
    pub variable: String,

    /// Category → magnitude. The keys are the category subset; never empty.
    pub magnitudes: BTreeMap<String, f64>,

    pub kind: MagnitudeKind,
    pub bounds: Bounds,
    pub baseline_period: i64,
}

impl TransformationEntry {
    pub fn categories(&self) -> BTreeSet<&str> {
        self.magnitudes.keys().map(String::as_str).collect()
    }

    pub fn magnitude(&self, category: &str) -> Option<f64> {
        self.magnitudes.get(category).copied()
    }
}

// ============================================================================
// FLAT DESCRIPTOR MAPPING
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorMap {
    entries: BTreeMap<String, TransformationEntry>,
}

impl DescriptorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one entry: per category, the incoming magnitude wins; categories
    /// the incoming entry does not mention keep their earlier magnitude.
    /// Kind, bounds and baseline follow the latest writer.
    pub fn merge_entry(&mut self, entry: TransformationEntry) {
        if entry.magnitudes.is_empty() {
            return;
        }

        match self.entries.get_mut(&entry.variable) {
            None => {
                self.entries.insert(entry.variable.clone(), entry);
            }
            Some(existing) => {
                for (category, magnitude) in entry.magnitudes {
                    if let Some(old) = existing.magnitudes.insert(category.clone(), magnitude) {
                        if old != magnitude {
                            debug!(
                                variable = %existing.variable,
                                category = %category,
                                old,
                                new = magnitude,
                                "magnitude overwritten by a later key"
                            );
                        }
                    }
                }
                existing.kind = entry.kind;
                existing.bounds = entry.bounds;
                existing.baseline_period = entry.baseline_period;
            }
        }
    }

    /// Merge every entry of `other` in order
    pub fn merge(&mut self, other: DescriptorMap) {
        for entry in other.entries.into_values() {
            self.merge_entry(entry);
        }
    }

    pub fn get(&self, variable: &str) -> Option<&TransformationEntry> {
        self.entries.get(variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransformationEntry> {
        self.entries.values()
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of (variable, category) cells the plan touches
    pub fn cell_count(&self) -> usize {
        self.entries.values().map(|e| e.magnitudes.len()).sum()
    }

    /// SHA-256 over the canonical JSON of the plan
    pub fn fingerprint(&self) -> Result<String> {
        let canonical =
            serde_json::to_string(&self.entries).map_err(|e| TransformError::Serialization {
                reason: e.to_string(),
            })?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
