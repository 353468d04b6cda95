//! Engine Constants
//!
//! TigerStyle: All limits are explicit, all units live in the name.
//! Everything tunable about the engine is declared here, not inline.

// =============================================================================
// Reserved Stores
// =============================================================================
// The engine persists its own bookkeeping through the same backends it offers
// to callers: one shared store per ledger plus one for schema snapshots.
// Entity specs must not claim these names.

/// Shared store holding the append-only tag ledger.
pub const TAG_EVENTS_STORE: &str = "tag_events";

/// Shared store holding the append-only relationship ledger.
pub const RELATIONSHIP_EDGES_STORE: &str = "relationship_edges";

/// Shared store recording each entity's last-known field list and the
/// timestamp of the migration that produced it.
pub const SCHEMA_HISTORY_STORE: &str = "schema_history";

/// Every store name the engine claims for itself.
pub const RESERVED_STORE_NAMES: [&str; 3] = [
    TAG_EVENTS_STORE,
    RELATIONSHIP_EDGES_STORE,
    SCHEMA_HISTORY_STORE,
];

// =============================================================================
// Deadlines
// =============================================================================

/// Default deadline applied to every repository operation (milliseconds).
///
/// On expiry the operation's effect is unknown: it may have completed.
/// Callers retry with idempotent semantics, never assume "did not happen".
pub const OPERATION_TIMEOUT_MS_DEFAULT: u64 = 5_000;

/// Upper bound for a configured operation deadline (milliseconds).
pub const OPERATION_TIMEOUT_MS_MAX: u64 = 300_000; // 5 minutes

/// How long the relational backend waits on a locked database before
/// reporting the backend unavailable (milliseconds).
pub const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Deadline reported by injected timeout faults in simulation (milliseconds).
pub const SIM_INJECTED_TIMEOUT_MS: u64 = 1_000;

// =============================================================================
// On-Disk Layout
// =============================================================================

/// Default data directory when the configuration does not name one.
pub const DATA_DIR_DEFAULT: &str = "./fichario_data";

/// File name of the embedded relational database inside the data directory.
pub const SQLITE_FILE_NAME: &str = "fichario.db";

/// Extension of one flat-file store document (`<entity>.json`).
pub const FLATFILE_EXTENSION: &str = "json";

/// Extension of the scratch file a flat-file write renames into place.
/// A crash mid-write leaves only the scratch file behind, never a
/// half-written store.
pub const FLATFILE_TMP_EXTENSION: &str = "json.tmp";

/// Directory under the data directory receiving pre-migration snapshots
/// (`backups/<entity>.<unix_ms>.json`).
pub const BACKUP_DIR_NAME: &str = "backups";

// =============================================================================
// Consistency Tests
// =============================================================================
