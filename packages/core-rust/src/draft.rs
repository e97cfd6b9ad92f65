//! In-memory draft buffer for a grading session.
//!
//! A [`DraftBuffer`] maps a record key (the student code) to a
//! [`GradeRecord`], a flat set of named [`FieldValue`]s. Records are merged
//! shallowly: a [`GradePatch`] overwrites the fields it names and leaves
//! every other field untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

/// Field name of the first grade component.
pub const COMPONENT_A: &str = "componentA";
/// Field name of the second grade component.
pub const COMPONENT_B: &str = "componentB";
/// Field name of the third grade component.
pub const COMPONENT_C: &str = "componentC";
/// Field name of the free-text notes.
pub const NOTES: &str = "notes";

/// A single field value inside a grade record.
///
/// Serialized untagged so a JSON number stays a number and a JSON string
/// stays a string. Whole numbers are written as integers (`15`, not
/// `15.0`). JSON has no encoding for NaN or infinity, so a non-finite
/// number is written as its text form and reads back as
/// [`FieldValue::Text`]. An ungraded component is represented by an empty
/// [`FieldValue::Text`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric score.
    Number(f64),
    /// Free text, or an empty string for a blank component.
    Text(String),
}

/// Largest magnitude below which every whole `f64` is an exact `i64`.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

impl FieldValue {
    /// Creates a numeric value. Non-finite input is kept as text.
    #[must_use]
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::Text(value.to_string())
        }
    }

    /// Returns the empty-text value used for blank fields.
    #[must_use]
    pub fn blank() -> Self {
        Self::Text(String::new())
    }

    /// Returns the numeric value, if this field holds one.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Returns `true` for an empty text value.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }

    /// Parses user input: anything that reads as a finite number becomes
    /// [`FieldValue::Number`], everything else is kept verbatim as text.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Text(raw.to_string()),
        }
    }
}

impl Serialize for FieldValue {
    #[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) if !n.is_finite() => serializer.collect_str(n),
            Self::Number(n) if n.trunc() == *n && n.abs() < MAX_EXACT_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::number(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Partial update for a single [`GradeRecord`].
///
/// Only the fields present in the patch are written by
/// [`GradeRecord::apply`]; later patches win per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradePatch {
    fields: BTreeMap<String, FieldValue>,
}

impl GradePatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an arbitrary field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets the first grade component.
    #[must_use]
    pub fn component_a(self, value: impl Into<FieldValue>) -> Self {
        self.field(COMPONENT_A, value)
    }

    /// Sets the second grade component.
    #[must_use]
    pub fn component_b(self, value: impl Into<FieldValue>) -> Self {
        self.field(COMPONENT_B, value)
    }

    /// Sets the third grade component.
    #[must_use]
    pub fn component_c(self, value: impl Into<FieldValue>) -> Self {
        self.field(COMPONENT_C, value)
    }

    /// Sets the notes field.
    #[must_use]
    pub fn notes(self, value: impl Into<String>) -> Self {
        self.field(NOTES, FieldValue::Text(value.into()))
    }

    /// Whether the patch touches no field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over the patched fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
}

/// The graded fields of one student.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradeRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl GradeRecord {
    /// Creates the default record shape: three blank grade components and
    /// blank notes.
    #[must_use]
    pub fn blank() -> Self {
        let fields = [COMPONENT_A, COMPONENT_B, COMPONENT_C, NOTES]
            .into_iter()
            .map(|name| (name.to_string(), FieldValue::blank()))
            .collect();
        Self { fields }
    }

    /// Returns a field, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Overwrites every field named in `patch`.
    pub fn apply(&mut self, patch: &GradePatch) {
        for (name, value) in patch.iter() {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    /// Number of fields in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over all fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
}

impl From<GradePatch> for GradeRecord {
    fn from(patch: GradePatch) -> Self {
        Self {
            fields: patch.fields,
        }
    }
}

/// Mapping from record key to in-progress grades.
///
/// Keys are unique within one teacher + exam scope. Iteration order is the
/// key order, which keeps serialized snapshots deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftBuffer {
    records: BTreeMap<String, GradeRecord>,
}

impl DraftBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&GradeRecord> {
        self.records.get(key)
    }

    /// Merges `patch` into the record for `key`, seeding a
    /// [`GradeRecord::blank`] first when the key is new.
    pub fn merge_record(&mut self, key: &str, patch: &GradePatch) {
        self.records
            .entry(key.to_string())
            .or_insert_with(GradeRecord::blank)
            .apply(patch);
    }

    /// Replaces the record for `key`, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, record: GradeRecord) -> Option<GradeRecord> {
        self.records.insert(key.into(), record)
    }

    /// Removes the record for `key`.
    pub fn remove(&mut self, key: &str) -> Option<GradeRecord> {
        self.records.remove(key)
    }

    /// Object-merge of another buffer: every key in `other` replaces the
    /// corresponding record here.
    pub fn merge(&mut self, other: DraftBuffer) {
        self.records.extend(other.records);
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over `(key, record)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &GradeRecord)> {
        self.records.iter()
    }
}

impl FromIterator<(String, GradeRecord)> for DraftBuffer {
    fn from_iter<I: IntoIterator<Item = (String, GradeRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
