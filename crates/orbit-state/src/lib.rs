//! orbit-state — embedded document store for Orbit.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the catalog the orchestrator reads (controllers, clusters,
//! apps, dependencies, intents) and for the lifecycle trail of each
//! deployment intent group.
//!
//! # Architecture
//!
//! ```text
//! StateStore (collection, key, tag) → JSON document
//!   ├── documents   {collection}␟{canonical key} → envelope (key, query, seq)
//!   ├── values      {collection}␟{canonical key}␟{tag} → JSON bytes
//!   └── sequences   insertion counter (find results keep insertion order)
//! ```
//!
//! Keys are any `Serialize` struct; they are canonicalized to JSON with
//! sorted fields. Empty string fields in a lookup key act as wildcards, so
//! the same key type serves both point reads and listings.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod catalog;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use keys::*;
pub use lifecycle::{ActionEntry, Operation, StateInfo, StateValue, TransitionError};
pub use store::StateStore;
pub use types::*;
