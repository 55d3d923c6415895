//! StateStore — redb-backed document persistence for Orbit.
//!
//! Documents live in named collections and are addressed by structured
//! keys. Each document carries one or more tagged JSON values (for example
//! a deployment intent group stores its definition under `data` and its
//! lifecycle trail under `stateInfo`). The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, Table, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const DOCUMENT_SEQ: &str = "documents";

/// Stored alongside every document: its key fields, optional query fields,
/// and the insertion sequence used to order `find` results.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    key: Map<String, Value>,
    #[serde(default)]
    query: Map<String, Value>,
    seq: u64,
}

impl Envelope {
    /// A document matches when every non-wildcard filter field equals the
    /// document's key or query field of the same name.
    fn matches(&self, filter: &Map<String, Value>) -> bool {
        filter.iter().all(|(field, wanted)| {
            is_wildcard(wanted)
                || self.key.get(field).or_else(|| self.query.get(field)) == Some(wanted)
        })
    }
}

fn is_wildcard(value: &Value) -> bool {
    value.is_null() || value.as_str() == Some("")
}

/// Render a key struct as a JSON object. `()` and `None` render as empty.
fn key_map<K: Serialize + ?Sized>(key: &K) -> StateResult<Map<String, Value>> {
    match serde_json::to_value(key).map_err(map_err!(Serialize))? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(StateError::InvalidKey(other.to_string())),
    }
}

/// Canonical string form of a key: JSON with fields in sorted order.
fn canonical(key: &Map<String, Value>) -> StateResult<String> {
    let sorted: BTreeMap<&String, &Value> = key.iter().collect();
    serde_json::to_string(&sorted).map_err(map_err!(Serialize))
}

fn document_row(collection: &str, canonical: &str) -> String {
    format!("{collection}{SEP}{canonical}")
}

fn value_row(document_row: &str, tag: &str) -> String {
    format!("{document_row}{SEP}{tag}")
}

fn next_seq(table: &mut Table<'_, &'static str, u64>) -> StateResult<u64> {
    let next = table
        .get(DOCUMENT_SEQ)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0)
        + 1;
    table.insert(DOCUMENT_SEQ, next).map_err(map_err!(Write))?;
    Ok(next)
}

/// Write the envelope and tagged values of the document at `row`. An
/// existing envelope keeps its sequence and gains the new query fields.
fn write_document(
    txn: &WriteTransaction,
    row: &str,
    key: Map<String, Value>,
    query: Map<String, Value>,
    values: &[(&str, &[u8])],
) -> StateResult<()> {
    let mut documents = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
    let existing: Option<Envelope> = match documents.get(row).map_err(map_err!(Read))? {
        Some(guard) => Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?),
        None => None,
    };
    let envelope = match existing {
        Some(mut envelope) => {
            envelope.query.extend(query);
            envelope
        }
        None => {
            let mut sequences = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
            let seq = next_seq(&mut sequences)?;
            Envelope { key, query, seq }
        }
    };
    let bytes = serde_json::to_vec(&envelope).map_err(map_err!(Serialize))?;
    documents.insert(row, bytes.as_slice()).map_err(map_err!(Write))?;

    let mut table = txn.open_table(VALUES).map_err(map_err!(Table))?;
    for (tag, value) in values {
        table
            .insert(value_row(row, tag).as_str(), *value)
            .map_err(map_err!(Write))?;
    }
    Ok(())
}

/// Remove the envelope at `row` and every tag under it. Returns true if
/// the envelope existed.
fn remove_document(txn: &WriteTransaction, row: &str) -> StateResult<bool> {
    let tag_prefix = format!("{row}{SEP}");
    let mut documents = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
    let existed = documents.remove(row).map_err(map_err!(Write))?.is_some();

    let mut values = txn.open_table(VALUES).map_err(map_err!(Table))?;
    let mut tag_rows = Vec::new();
    for entry in values.range(tag_prefix.as_str()..).map_err(map_err!(Read))? {
        let (key, _) = entry.map_err(map_err!(Read))?;
        let key = key.value();
        if !key.starts_with(&tag_prefix) {
            break;
        }
        tag_rows.push(key.to_string());
    }
    for tag_row in &tag_rows {
        values.remove(tag_row.as_str()).map_err(map_err!(Write))?;
    }
    Ok(existed)
}

/// Thread-safe document store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
        txn.open_table(VALUES).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Raw document operations ────────────────────────────────────

    /// Insert or replace the `tag` value of the document addressed by `key`.
    ///
    /// `query_key` fields are stored next to the key and can be used as
    /// filters by `find`, but do not take part in addressing. Re-inserting
    /// an existing document keeps its original insertion position.
    pub fn insert<K, Q>(
        &self,
        collection: &str,
        key: &K,
        query_key: Option<&Q>,
        tag: &str,
        value: &[u8],
    ) -> StateResult<()>
    where
        K: Serialize + ?Sized,
        Q: Serialize + ?Sized,
    {
        let key = key_map(key)?;
        let query = match query_key {
            Some(query_key) => key_map(query_key)?,
            None => Map::new(),
        };
        let row = document_row(collection, &canonical(&key)?);

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        write_document(&txn, &row, key, query, &[(tag, value)])?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%collection, %tag, "document stored");
        Ok(())
    }

    /// Create the document addressed by `key` with the given tagged values,
    /// unless it already exists. Returns false (and writes nothing) if it
    /// does.
    pub fn insert_new<K: Serialize + ?Sized>(
        &self,
        collection: &str,
        key: &K,
        values: &[(&str, &[u8])],
    ) -> StateResult<bool> {
        let key = key_map(key)?;
        let row = document_row(collection, &canonical(&key)?);

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let exists = {
            let documents = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
            documents.get(row.as_str()).map_err(map_err!(Read))?.is_some()
        };
        if exists {
            txn.abort().map_err(map_err!(Transaction))?;
            debug!(%collection, "document already exists");
            return Ok(false);
        }
        write_document(&txn, &row, key, Map::new(), values)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%collection, tags = values.len(), "document created");
        Ok(true)
    }

    /// Return the `tag` values of every document matching `key`, in
    /// insertion order. Empty string fields in `key` match anything.
    pub fn find<K: Serialize + ?Sized>(
        &self,
        collection: &str,
        key: &K,
        tag: &str,
    ) -> StateResult<Vec<Vec<u8>>> {
        let filter = key_map(key)?;
        let prefix = format!("{collection}{SEP}");

        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let documents = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
        let values = txn.open_table(VALUES).map_err(map_err!(Table))?;

        let mut hits: Vec<(u64, Vec<u8>)> = Vec::new();
        for entry in documents.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (row_guard, document) = entry.map_err(map_err!(Read))?;
            let row = row_guard.value();
            if !row.starts_with(&prefix) {
                break;
            }
            let envelope: Envelope =
                serde_json::from_slice(document.value()).map_err(map_err!(Deserialize))?;
            if !envelope.matches(&filter) {
                continue;
            }
            if let Some(value) = values
                .get(value_row(row, tag).as_str())
                .map_err(map_err!(Read))?
            {
                hits.push((envelope.seq, value.value().to_vec()));
            }
        }
        hits.sort_by_key(|(seq, _)| *seq);
        Ok(hits.into_iter().map(|(_, value)| value).collect())
    }

    /// Remove the document addressed by `key` together with all its tags.
    /// Returns true if it existed.
    pub fn remove<K: Serialize + ?Sized>(&self, collection: &str, key: &K) -> StateResult<bool> {
        let row = document_row(collection, &canonical(&key_map(key)?)?);

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed = remove_document(&txn, &row)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%collection, existed, "document removed");
        Ok(existed)
    }

    /// Remove the document addressed by `key`, but only if its `tag` value
    /// still equals `expected`. Returns false (and removes nothing)
    /// otherwise.
    pub fn remove_if<K: Serialize + ?Sized>(
        &self,
        collection: &str,
        key: &K,
        tag: &str,
        expected: &[u8],
    ) -> StateResult<bool> {
        let row = document_row(collection, &canonical(&key_map(key)?)?);

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let current_matches = {
            let values = txn.open_table(VALUES).map_err(map_err!(Table))?;
            values
                .get(value_row(&row, tag).as_str())
                .map_err(map_err!(Read))?
                .is_some_and(|guard| guard.value() == expected)
        };
        if !current_matches {
            txn.abort().map_err(map_err!(Transaction))?;
            debug!(%collection, %tag, "conditional remove skipped");
            return Ok(false);
        }
        remove_document(&txn, &row)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%collection, %tag, "document removed");
        Ok(true)
    }

    /// Atomically replace the `tag` value of an existing document, but only
    /// if its current bytes equal `expected`. Returns false (and writes
    /// nothing) when the value changed underneath the caller or is absent.
    pub fn swap<K: Serialize + ?Sized>(
        &self,
        collection: &str,
        key: &K,
        tag: &str,
        expected: &[u8],
        value: &[u8],
    ) -> StateResult<bool> {
        let row = value_row(
            &document_row(collection, &canonical(&key_map(key)?)?),
            tag,
        );

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let swapped;
        {
            let mut values = txn.open_table(VALUES).map_err(map_err!(Table))?;
            let current_matches = values
                .get(row.as_str())
                .map_err(map_err!(Read))?
                .is_some_and(|guard| guard.value() == expected);
            if current_matches {
                values
                    .insert(row.as_str(), value)
                    .map_err(map_err!(Write))?;
            }
            swapped = current_matches;
        }
        if swapped {
            txn.commit().map_err(map_err!(Transaction))?;
        } else {
            txn.abort().map_err(map_err!(Transaction))?;
        }
        debug!(%collection, %tag, swapped, "compare-and-swap");
        Ok(swapped)
    }

    /// Deserialize a value returned by `find`.
    pub fn unmarshal<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
        serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
    }

    // ── Typed helpers ──────────────────────────────────────────────

    /// Serialize `value` and store it under `tag`.
    pub fn put<K, T>(&self, collection: &str, key: &K, tag: &str, value: &T) -> StateResult<()>
    where
        K: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        self.insert::<K, ()>(collection, key, None, tag, &bytes)
    }

    /// Like `put`, with additional query fields.
    pub fn put_with_query<K, Q, T>(
        &self,
        collection: &str,
        key: &K,
        query_key: &Q,
        tag: &str,
        value: &T,
    ) -> StateResult<()>
    where
        K: Serialize + ?Sized,
        Q: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        self.insert(collection, key, Some(query_key), tag, &bytes)
    }

    /// `find` followed by `unmarshal` of every hit.
    pub fn find_as<K, T>(&self, collection: &str, key: &K, tag: &str) -> StateResult<Vec<T>>
    where
        K: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.find(collection, key, tag)?
            .iter()
            .map(|bytes| Self::unmarshal(bytes))
            .collect()
    }

    /// First (oldest) match of `find_as`, if any.
    pub fn find_one_as<K, T>(&self, collection: &str, key: &K, tag: &str) -> StateResult<Option<T>>
    where
        K: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        match self.find(collection, key, tag)?.first() {
            Some(bytes) => Ok(Some(Self::unmarshal(bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct ThingKey<'a> {
        thing: &'a str,
        owner: &'a str,
    }

    #[derive(Serialize)]
    struct ThingQuery<'a> {
        color: &'a str,
    }

    fn key<'a>(thing: &'a str, owner: &'a str) -> ThingKey<'a> {
        ThingKey { thing, owner }
    }

    #[test]
    fn insert_and_find_exact() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert::<_, ()>("things", &key("a", "alice"), None, "data", b"\"one\"").unwrap();

        let found = store.find("things", &key("a", "alice"), "data").unwrap();
        assert_eq!(found, vec![b"\"one\"".to_vec()]);
    }

    #[test]
    fn find_missing_returns_empty() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.find("things", &key("a", "alice"), "data").unwrap().is_empty());
    }

    #[test]
    fn empty_fields_are_wildcards() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("things", &key("a", "alice"), "data", &1).unwrap();
        store.put("things", &key("b", "alice"), "data", &2).unwrap();
        store.put("things", &key("c", "bob"), "data", &3).unwrap();

        let alice: Vec<i32> = store.find_as("things", &key("", "alice"), "data").unwrap();
        assert_eq!(alice, vec![1, 2]);

        let everyone: Vec<i32> = store.find_as("things", &key("", ""), "data").unwrap();
        assert_eq!(everyone, vec![1, 2, 3]);
    }

    #[test]
    fn results_follow_insertion_order_not_key_order() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("things", &key("zeta", "o"), "data", &"zeta").unwrap();
        store.put("things", &key("alpha", "o"), "data", &"alpha").unwrap();
        store.put("things", &key("mid", "o"), "data", &"mid").unwrap();
        // Rewriting keeps the original position.
        store.put("things", &key("zeta", "o"), "data", &"zeta2").unwrap();

        let names: Vec<String> = store.find_as("things", &key("", "o"), "data").unwrap();
        assert_eq!(names, vec!["zeta2", "alpha", "mid"]);
    }

    #[test]
    fn query_fields_filter_but_do_not_address() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_with_query("things", &key("a", "o"), &ThingQuery { color: "red" }, "data", &1)
            .unwrap();
        store
            .put_with_query("things", &key("b", "o"), &ThingQuery { color: "blue" }, "data", &2)
            .unwrap();

        #[derive(Serialize)]
        struct ByColor<'a> {
            owner: &'a str,
            color: &'a str,
        }
        let red: Vec<i32> = store
            .find_as("things", &ByColor { owner: "o", color: "red" }, "data")
            .unwrap();
        assert_eq!(red, vec![1]);

        // The exact key still resolves without the query field.
        let exact: Option<i32> = store.find_one_as("things", &key("b", "o"), "data").unwrap();
        assert_eq!(exact, Some(2));
    }

    #[test]
    fn tags_are_independent() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("things", &key("a", "o"), "data", &"definition").unwrap();
        assert!(store.find("things", &key("a", "o"), "status").unwrap().is_empty());

        store.put("things", &key("a", "o"), "status", &"ready").unwrap();
        let status: Option<String> = store.find_one_as("things", &key("a", "o"), "status").unwrap();
        assert_eq!(status.as_deref(), Some("ready"));
    }

    #[test]
    fn collections_do_not_leak_into_each_other() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("app", &key("a", "o"), "data", &1).unwrap();
        store.put("appDependency", &key("a", "o"), "data", &2).unwrap();

        let apps: Vec<i32> = store.find_as("app", &key("", ""), "data").unwrap();
        assert_eq!(apps, vec![1]);
    }

    #[test]
    fn remove_drops_every_tag() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("things", &key("a", "o"), "data", &1).unwrap();
        store.put("things", &key("a", "o"), "status", &2).unwrap();

        assert!(store.remove("things", &key("a", "o")).unwrap());
        assert!(store.find("things", &key("a", "o"), "data").unwrap().is_empty());
        assert!(store.find("things", &key("a", "o"), "status").unwrap().is_empty());
        assert!(!store.remove("things", &key("a", "o")).unwrap());
    }

    #[test]
    fn insert_new_refuses_existing_document() {
        let store = StateStore::open_in_memory().unwrap();
        let values: [(&str, &[u8]); 2] = [("data", b"1"), ("state", b"a")];
        assert!(store.insert_new("things", &key("a", "o"), &values).unwrap());

        let again: [(&str, &[u8]); 2] = [("data", b"2"), ("state", b"b")];
        assert!(!store.insert_new("things", &key("a", "o"), &again).unwrap());
        assert_eq!(store.find("things", &key("a", "o"), "data").unwrap(), vec![b"1".to_vec()]);
        assert_eq!(store.find("things", &key("a", "o"), "state").unwrap(), vec![b"a".to_vec()]);
    }

    #[test]
    fn remove_if_requires_expected_bytes() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("things", &key("a", "o"), "data", &1).unwrap();
        store.insert::<_, ()>("things", &key("a", "o"), None, "state", b"1").unwrap();
        // Another writer moves the value on after it was read.
        assert!(store.swap("things", &key("a", "o"), "state", b"1", b"2").unwrap());

        assert!(!store.remove_if("things", &key("a", "o"), "state", b"1").unwrap());
        assert_eq!(store.find("things", &key("a", "o"), "state").unwrap(), vec![b"2".to_vec()]);

        assert!(store.remove_if("things", &key("a", "o"), "state", b"2").unwrap());
        assert!(store.find("things", &key("a", "o"), "data").unwrap().is_empty());
        assert!(store.find("things", &key("a", "o"), "state").unwrap().is_empty());
    }

    #[test]
    fn swap_succeeds_only_on_expected_bytes() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert::<_, ()>("things", &key("a", "o"), None, "state", b"1").unwrap();

        assert!(!store.swap("things", &key("a", "o"), "state", b"0", b"2").unwrap());
        assert!(store.swap("things", &key("a", "o"), "state", b"1", b"2").unwrap());
        // The first writer moved the value on; a stale expectation loses.
        assert!(!store.swap("things", &key("a", "o"), "state", b"1", b"3").unwrap());

        let found = store.find("things", &key("a", "o"), "state").unwrap();
        assert_eq!(found, vec![b"2".to_vec()]);
    }

    #[test]
    fn swap_on_missing_value_fails() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(!store.swap("things", &key("a", "o"), "state", b"", b"1").unwrap());
    }

    #[test]
    fn non_object_key_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let result = store.put("things", &"plain", "data", &1);
        assert!(matches!(result, Err(StateError::InvalidKey(_))));
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put("things", &key("a", "o"), "data", &"kept").unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let value: Option<String> = store.find_one_as("things", &key("a", "o"), "data").unwrap();
        assert_eq!(value.as_deref(), Some("kept"));

        // Sequence numbers continue after reopening.
        store.put("things", &key("b", "o"), "data", &"later").unwrap();
        let all: Vec<String> = store.find_as("things", &key("", "o"), "data").unwrap();
        assert_eq!(all, vec!["kept", "later"]);
    }
}
