//! ContextStore — path-keyed node storage for deployment contexts.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde_json::Value;
use tracing::debug;

use crate::context::AppContext;
use crate::error::{ContextError, ContextResult};
use crate::tables::*;
use crate::types::{ContextId, Handle};

/// Convert any `Display` error into a `ContextError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| ContextError::$variant(e.to_string())
    };
}

const CONTEXT_ID_COUNTER: &str = "context_id";
const ROOT_PREFIX: &str = "/context/";

/// Thread-safe context store backed by redb.
#[derive(Clone)]
pub struct ContextStore {
    db: Arc<Database>,
}

impl ContextStore {
    /// Open (or create) a persistent context store at the given path.
    pub fn open(path: &Path) -> ContextResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "context store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory context store (for testing).
    pub fn open_in_memory() -> ContextResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory context store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> ContextResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Contexts ───────────────────────────────────────────────────

    /// Allocate a fresh context id. Ids are never reused, even after the
    /// context is deleted or the store is reopened.
    pub fn init(&self) -> ContextResult<AppContext> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let id;
        {
            let mut counters = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
            id = counters
                .get(CONTEXT_ID_COUNTER)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0)
                + 1;
            counters
                .insert(CONTEXT_ID_COUNTER, id)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        let id = id.to_string();
        debug!(context_id = %id, "context initialized");
        Ok(AppContext::new(self.clone(), id))
    }

    /// Open an existing context. Fails if its root node is absent.
    pub fn load(&self, id: &str) -> ContextResult<AppContext> {
        if !self.exists(id)? {
            return Err(ContextError::NotFound(format!("context {id}")));
        }
        Ok(AppContext::new(self.clone(), id.to_string()))
    }

    /// Whether the root node of a context exists.
    pub fn exists(&self, id: &str) -> ContextResult<bool> {
        Ok(self.get(&Self::root(id))?.is_some())
    }

    /// Ids of every context with a root node, in key order.
    pub fn list(&self) -> ContextResult<Vec<ContextId>> {
        let mut ids = Vec::new();
        for (path, _) in self.scan(ROOT_PREFIX)? {
            let rest = &path[ROOT_PREFIX.len()..];
            match rest.strip_suffix('/') {
                Some(id) if !id.contains('/') => ids.push(id.to_string()),
                _ => {}
            }
        }
        Ok(ids)
    }

    pub(crate) fn root(id: &str) -> Handle {
        Handle::new(format!("{ROOT_PREFIX}{id}/"))
    }

    // ── Nodes ──────────────────────────────────────────────────────

    pub(crate) fn get(&self, handle: &Handle) -> ContextResult<Option<Value>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(handle.as_str()).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            )),
            None => Ok(None),
        }
    }

    /// Write a node. With `create_only`, an existing node is an error.
    pub(crate) fn put(&self, handle: &Handle, value: &Value, create_only: bool) -> ContextResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            let exists = table
                .get(handle.as_str())
                .map_err(map_err!(Read))?
                .is_some();
            if create_only && exists {
                return Err(ContextError::AlreadyExists(handle.to_string()));
            }
            table
                .insert(handle.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Overwrite an existing node. Fails if it is absent.
    pub(crate) fn replace(&self, handle: &Handle, value: &Value) -> ContextResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            let exists = table
                .get(handle.as_str())
                .map_err(map_err!(Read))?
                .is_some();
            if !exists {
                return Err(ContextError::NotFound(handle.to_string()));
            }
            table
                .insert(handle.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Every node whose path starts with `prefix`, in path order.
    pub(crate) fn scan(&self, prefix: &str) -> ContextResult<Vec<(String, Value)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            let value: Value =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push((key.to_string(), value));
        }
        Ok(results)
    }

    /// Delete every node under `prefix`. Returns the number removed.
    pub(crate) fn delete_prefix(&self, prefix: &str) -> ContextResult<usize> {
        // Collect keys in a read transaction first.
        let keys: Vec<String> = self.scan(prefix)?.into_iter().map(|(key, _)| key).collect();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(keys.len())
    }
}
