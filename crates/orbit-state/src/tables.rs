//! redb table definitions for the Orbit state store.
//!
//! Row keys are `{collection}␟{canonical key}` (plus `␟{tag}` for values),
//! where `␟` is the ASCII unit separator. Canonical keys are JSON objects
//! with sorted fields, so a collection's rows are contiguous.

use redb::TableDefinition;

/// Separator between the parts of a row key.
pub const SEP: char = '\u{1f}';

/// Document envelopes keyed by `{collection}␟{key}`.
pub const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// Tagged document values keyed by `{collection}␟{key}␟{tag}`.
pub const VALUES: TableDefinition<&str, &[u8]> = TableDefinition::new("values");

/// Monotonic counters keyed by name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
