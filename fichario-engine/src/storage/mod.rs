//! Storage Backends
//!
//! One uniform contract ([`StorageBackend`]), three interchangeable media:
//!
//! - [`SimBackend`] - deterministic in-memory storage for simulation tests
//! - [`FlatFileBackend`] - one JSON document per entity, atomic replace
//! - [`SqliteBackend`] - embedded relational database, one table per entity
//!
//! Callers never pick a backend per call; the repository resolves one per
//! entity from configuration and the contract guarantees identical behavior
//! across media.

pub mod backend;
pub mod error;
pub mod flatfile;
pub mod sim;
pub mod sqlite;

pub use backend::{BackendKind, CoercionFailure, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use flatfile::FlatFileBackend;
pub use sim::SimBackend;
pub use sqlite::SqliteBackend;

/// Reject names that cannot safely become file names or SQL identifiers.
///
/// Entity and field names reach the media as path segments and column
/// names; only lowercase letters, digits, and underscore pass. Length
/// limits are enforced where schemas are declared, not here.
pub(crate) fn ensure_safe_name(label: &str, name: &str) -> StorageResult<()> {
    let safe = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if safe {
        Ok(())
    } else {
        Err(StorageError::validation(format!(
            "{label} name must be lowercase letters, digits, or underscore: '{name}'"
        )))
    }
}

/// Reject a written value that does not fit the store's declared field.
///
/// Null always fits. Oversized text is rejected before it reaches a medium.
/// Stored records may still violate the shape after a partially-applied
/// type change; that is flagged by the migration report, not here.
pub(crate) fn ensure_value_fits(
    entity: &str,
    spec: &fichario_core::FieldSpec,
    value: &fichario_core::Value,
) -> StorageResult<()> {
    if !value.fits(spec.field_type) {
        return Err(StorageError::validation(format!(
            "field '{}' of entity '{entity}' expects {}, got {}",
            spec.name,
            spec.field_type,
            value.field_type().map_or("null", |t| t.as_str()),
        )));
    }

    if let Some(text) = value.as_text() {
        if text.len() > fichario_core::TEXT_VALUE_BYTES_MAX {
            return Err(StorageError::validation(format!(
                "field '{}' of entity '{entity}' exceeds {} bytes",
                spec.name,
                fichario_core::TEXT_VALUE_BYTES_MAX,
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_names() {
        assert!(ensure_safe_name("entity", "cliente").is_ok());
        assert!(ensure_safe_name("entity", "tag_events").is_ok());
        assert!(ensure_safe_name("field", "preco2").is_ok());

        assert!(ensure_safe_name("entity", "").is_err());
        assert!(ensure_safe_name("entity", "Cliente").is_err());
        assert!(ensure_safe_name("entity", "../escape").is_err());
        assert!(ensure_safe_name("field", "preco; DROP TABLE x").is_err());
        assert!(ensure_safe_name("field", "preço").is_err());
    }

    #[test]
    fn test_value_fit() {
        use fichario_core::{FieldSpec, FieldType, Value};

        let spec = FieldSpec::new("preco", FieldType::Float);
        assert!(ensure_value_fits("produto", &spec, &Value::Float(2.5)).is_ok());
        assert!(ensure_value_fits("produto", &spec, &Value::Null).is_ok());
        assert!(ensure_value_fits("produto", &spec, &Value::Int(2)).is_err());
        assert!(ensure_value_fits("produto", &spec, &Value::from("2.5")).is_err());
    }
}
