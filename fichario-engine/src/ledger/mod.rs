//! Ledger - Tags and Relationships
//!
//! Two append-only event logs layered over the repository's engine-owned
//! stores. Both follow the same discipline: rows are never mutated,
//! removal appends a closing copy, and every "current state" question is
//! answered by folding the log.
//!
//! | Module     | Store                 | Answers                            |
//! |------------|-----------------------|------------------------------------|
//! | `tag`      | `tag_events`          | which labels a record carries      |
//! | `relation` | `relationship_edges`  | which records point at which       |

pub mod relation;
pub mod tag;

pub use relation::{Edge, RelationError, RelationResult, RelationshipLedger};
pub use tag::{TagError, TagEvent, TagLedger, TagResult};

pub(crate) use relation::relationship_edges_schema;
pub(crate) use tag::tag_events_schema;
