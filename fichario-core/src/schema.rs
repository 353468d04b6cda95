//! Declared Entity Shapes
//!
//! An entity spec loader (outside the engine) declares each entity's name,
//! ordered field list with types and defaults, and the cardinality of every
//! relationship name. These types carry that declaration; the engine treats
//! it as read-only input at startup and on each drift check.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{ENTITY_FIELDS_COUNT_MAX, ENTITY_NAME_BYTES_MAX, FIELD_NAME_BYTES_MAX};
use crate::record::Value;

/// Errors from parsing declared-schema strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A field type string is not one of the accepted names.
    #[error("unknown field type: {0}")]
    UnknownFieldType(String),

    /// A cardinality string is not one of `1:1`, `1:N`, `N:1`, `N:N`.
    #[error("unknown cardinality: {0}")]
    UnknownCardinality(String),
}

/// The scalar type a field is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 text.
    Text,
}

impl FieldType {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
        }
    }

    /// All field types.
    #[must_use]
    pub fn all() -> &'static [FieldType] {
        &[Self::Bool, Self::Int, Self::Float, Self::Text]
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "text" => Ok(Self::Text),
            other => Err(SchemaError::UnknownFieldType(other.to_string())),
        }
    }
}

/// One declared field: name, type, and the default written by add-field
/// migrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Declared scalar type.
    pub field_type: FieldType,
    /// Default value for records that predate the field.
    #[serde(default = "Value::null")]
    pub default: Value,
}

impl FieldSpec {
    /// Declare a field with a null default.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();

        // Preconditions
        assert!(!name.is_empty(), "field name must not be empty");
        assert!(
            name.len() <= FIELD_NAME_BYTES_MAX,
            "field name exceeds {FIELD_NAME_BYTES_MAX} bytes"
        );

        Self {
            name,
            field_type,
            default: Value::Null,
        }
    }

    /// Set a non-null default.
    ///
    /// # Panics
    /// Panics if the default does not fit the declared type.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        assert!(
            default.fits(self.field_type),
            "default must fit the declared type"
        );
        self.default = default;
        self
    }
}

/// The declared shape of one entity: a name and an ordered field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    entity: String,
    fields: Vec<FieldSpec>,
}

impl EntitySchema {
    /// Declare an entity with no fields yet.
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();

        // Preconditions
        assert!(!entity.is_empty(), "entity name must not be empty");
        assert!(
            entity.len() <= ENTITY_NAME_BYTES_MAX,
            "entity name exceeds {ENTITY_NAME_BYTES_MAX} bytes"
        );

        Self {
            entity,
            fields: Vec::new(),
        }
    }

    /// Append a declared field.
    ///
    /// # Panics
    /// Panics on a duplicate field name or when the field count limit is
    /// exceeded.
    #[must_use]
    pub fn with_field(mut self, spec: FieldSpec) -> Self {
        assert!(
            self.field(&spec.name).is_none(),
            "duplicate field: {}",
            spec.name
        );
        assert!(
            self.fields.len() < ENTITY_FIELDS_COUNT_MAX,
            "entity exceeds {ENTITY_FIELDS_COUNT_MAX} fields"
        );
        self.fields.push(spec);
        self
    }

    /// The entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The ordered field list.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up one field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether a field with this name is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// An explicit rename directive handed to the migrator.
///
/// Renames are declared, never inferred: without a directive, a vanished
/// field is a removal and a new name is an addition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRename {
    /// Name in the persisted shape.
    pub from: String,
    /// Name in the declared shape.
    pub to: String,
}

impl FieldRename {
    /// Declare that `from` is now called `to`.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();

        // Preconditions
        assert!(!from.is_empty() && !to.is_empty(), "rename names must not be empty");
        assert_ne!(from, to, "rename must change the name");

        Self { from, to }
    }
}

/// Declared multiplicity of a relationship name.
///
/// Any cardinality containing a `1` limits each source to one active target
/// per relationship name; `1:1` additionally makes targets exclusive; `N:N`
/// is unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// `1:1`: one active target per source, one active source per target.
    #[serde(rename = "1:1")]
    OneToOne,
    /// `1:N`: one active target per source.
    #[serde(rename = "1:N")]
    OneToMany,
    /// `N:1`: one active target per source.
    #[serde(rename = "N:1")]
    ManyToOne,
    /// `N:N`: unconstrained.
    #[serde(rename = "N:N")]
    ManyToMany,
}

impl Cardinality {
    /// Canonical notation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "1:1",
            Self::OneToMany => "1:N",
            Self::ManyToOne => "N:1",
            Self::ManyToMany => "N:N",
        }
    }

    /// Whether a source may hold at most one active target for this name.
    #[must_use]
    pub fn limits_source(&self) -> bool {
        !matches!(self, Self::ManyToMany)
    }

    /// Whether a target may be claimed by at most one active source.
    #[must_use]
    pub fn limits_target(&self) -> bool {
        matches!(self, Self::OneToOne)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cardinality {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1:1" => Ok(Self::OneToOne),
            "1:N" => Ok(Self::OneToMany),
            "N:1" => Ok(Self::ManyToOne),
            "N:N" => Ok(Self::ManyToMany),
            other => Err(SchemaError::UnknownCardinality(other.to_string())),
        }
    }
}
