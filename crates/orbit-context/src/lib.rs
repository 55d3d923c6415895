//! orbit-context — deployment context store.
//!
//! A deployment context is the persisted plan of one instantiation
//! attempt: which apps go to which clusters with which resources, plus the
//! ordering and dependency instructions the synchronization service follows.
//!
//! # Architecture
//!
//! ```text
//! /context/{id}/                                 composite app (root)
//!   meta/                                        CompositeAppMeta
//!   instruction/app/{order|dependency}/          app-level instructions
//!   status/  stopflag/                           run-time markers
//!   app/{app}/
//!     instruction/app/dependency/                predecessors of {app}
//!     cluster/{provider+cluster}/
//!       group/                                   optional-group number
//!       instruction/resource/{order|dependency}/
//!       resource/{name+kind}/                    manifest content
//! ```
//!
//! Every node is a row in a redb table keyed by its path; a `Handle` is that
//! path. Every write commits its own transaction, so a crash mid-build
//! leaves an inspectable partial tree that the caller must delete.

pub mod context;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use context::AppContext;
pub use error::{ContextError, ContextResult};
pub use store::ContextStore;
pub use types::*;
