//! redb table definitions for the context store.

use redb::TableDefinition;

/// Context tree nodes keyed by path (`/context/{id}/app/{name}/...`).
/// Values are JSON.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("context_nodes");

/// Counters keyed by name. `context_id` yields fresh context ids.
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("context_counters");
