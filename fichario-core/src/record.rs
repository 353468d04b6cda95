//! Dynamic Record Model
//!
//! Records are duck-typed: a record is `(entity type, record id, field map)`
//! rather than a fixed struct. Field values are scalars; shapes are declared
//! per entity in [`crate::schema`] and enforced at the storage boundary, not
//! throughout internal logic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::RecordId;
use crate::schema::FieldType;

/// A scalar field value.
///
/// Serialized untagged so the flat-file store reads as plain JSON:
/// `null`, `true`, `42`, `4.2`, `"texto"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent or explicitly null.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
}

impl Value {
    /// The null value. Usable as a serde default.
    #[must_use]
    pub fn null() -> Self {
        Self::Null
    }

    /// The declared type this value inhabits, or `None` for null.
    #[must_use]
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(FieldType::Bool),
            Self::Int(_) => Some(FieldType::Int),
            Self::Float(_) => Some(FieldType::Float),
            Self::Text(_) => Some(FieldType::Text),
        }
    }

    /// Whether this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value fits a field declared with `field_type`.
    ///
    /// Null fits every type.
    #[must_use]
    pub fn fits(&self, field_type: FieldType) -> bool {
        self.field_type().map_or(true, |t| t == field_type)
    }

    /// Text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an integer value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float content, if this is a float value.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Boolean content, if this is a boolean value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempt to convert this value to the target type.
    ///
    /// This is the coercion table used by type-change migrations. Null
    /// coerces to any type as null. `None` means the value cannot represent
    /// the target type and the caller must flag it.
    ///
    /// | from \ to | bool            | int            | float     | text     |
    /// |-----------|-----------------|----------------|-----------|----------|
    /// | bool      | itself          | -              | -         | "true"   |
    /// | int       | -               | itself         | lossless  | "42"     |
    /// | float     | -               | if integral    | itself    | "4.2"    |
    /// | text      | "true"/"false"  | parsed         | parsed    | itself   |
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coerce(&self, target: FieldType) -> Option<Value> {
        if self.is_null() {
            return Some(Self::Null);
        }
        if self.fits(target) {
            return Some(self.clone());
        }

        match (self, target) {
            (Self::Int(i), FieldType::Float) => Some(Self::Float(*i as f64)),
            (Self::Float(f), FieldType::Int) => float_to_int(*f).map(Self::Int),
            (Self::Bool(b), FieldType::Text) => Some(Self::Text(b.to_string())),
            (Self::Int(i), FieldType::Text) => Some(Self::Text(i.to_string())),
            (Self::Float(f), FieldType::Text) => Some(Self::Text(f.to_string())),
            (Self::Text(s), FieldType::Bool) => match s.trim() {
                "true" => Some(Self::Bool(true)),
                "false" => Some(Self::Bool(false)),
                _ => None,
            },
            (Self::Text(s), FieldType::Int) => s.trim().parse().ok().map(Self::Int),
            (Self::Text(s), FieldType::Float) => s.trim().parse().ok().map(Self::Float),
            _ => None,
        }
    }
}

/// Lossless float-to-int conversion, or `None` when the float is not an
/// integer representable in `i64`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_int(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && (i64::MIN as f64..=i64::MAX as f64).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Caller-supplied field values keyed by field name.
pub type FieldMap = HashMap<String, Value>;

/// One stored instance of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    entity: String,
    id: RecordId,
    fields: FieldMap,
}

impl Record {
    /// Assemble a record from its parts.
    #[must_use]
    pub fn new(entity: impl Into<String>, id: RecordId, fields: FieldMap) -> Self {
        let entity = entity.into();

        // Precondition
        assert!(!entity.is_empty(), "record must belong to an entity");

        Self { entity, id, fields }
    }

    /// The entity type this record belongs to.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The record's immutable identifier.
    #[must_use]
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// All field values.
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// One field value, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set one field value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Remove one field value, returning it if present.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Consume the record, yielding its field map.
    #[must_use]
    pub fn into_fields(self) -> FieldMap {
        self.fields
    }
}
