//! TigerStyle Constants
//!
//! All limits use big-endian naming: CATEGORY_SPECIFICS_UNIT_LIMIT
//! Example: RECORD_ID_LENGTH (not ID_LEN), FIELD_NAME_BYTES_MAX.
//!
//! Every constant includes units in the name:
//! - _BYTES_MAX/MIN for size limits
//! - _COUNT_MAX for quantity limits
//! - _MS for milliseconds

// =============================================================================
// Record Identifier
// =============================================================================

/// Total length of a record identifier, including the check symbol.
pub const RECORD_ID_LENGTH: usize = 27;

/// Length of the random body preceding the check symbol.
pub const RECORD_ID_BODY_LENGTH: usize = 26;

/// Crockford Base32 alphabet: digits and uppercase letters excluding I, L, O, U.
pub const RECORD_ID_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Check-symbol alphabet: the body alphabet extended with the five
/// checksum-only symbols, giving one symbol per mod-37 residue.
pub const RECORD_ID_CHECK_ALPHABET: &[u8; 37] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ*~$=U";

/// Modulus of the identifier checksum.
pub const RECORD_ID_CHECKSUM_MODULUS: u64 = 37;

// =============================================================================
// Schema Limits
// =============================================================================

/// Maximum length of an entity name.
pub const ENTITY_NAME_BYTES_MAX: usize = 64;

/// Maximum length of a field name.
pub const FIELD_NAME_BYTES_MAX: usize = 64;

/// Maximum number of fields in one entity schema.
pub const ENTITY_FIELDS_COUNT_MAX: usize = 256;

/// Maximum length of a text field value.
pub const TEXT_VALUE_BYTES_MAX: usize = 1024 * 1024; // 1MB

// =============================================================================
// Ledger Limits
// =============================================================================

/// Maximum length of a tag symbol.
pub const TAG_BYTES_MAX: usize = 64;

/// Maximum length of a relationship name.
pub const RELATIONSHIP_NAME_BYTES_MAX: usize = 64;

/// Maximum length of an actor identifier on ledger events.
pub const ACTOR_BYTES_MAX: usize = 128;

// =============================================================================
// DST (Deterministic Simulation Testing) Limits
// =============================================================================

/// Maximum number of simulation steps.
pub const DST_SIMULATION_STEPS_MAX: u64 = 1_000_000;

/// Maximum probability for fault injection (1.0 = 100%).
pub const DST_FAULT_PROBABILITY_MAX: f64 = 1.0;

/// Maximum time advance per step in milliseconds.
pub const DST_TIME_ADVANCE_MS_MAX: u64 = 86_400_000; // 24 hours

// =============================================================================
// Time Constants
// =============================================================================

/// Milliseconds per second.
pub const TIME_MS_PER_SEC: u64 = 1000;

/// Milliseconds per minute.
pub const TIME_MS_PER_MIN: u64 = 60 * TIME_MS_PER_SEC;

/// Milliseconds per hour.
pub const TIME_MS_PER_HOUR: u64 = 60 * TIME_MS_PER_MIN;
