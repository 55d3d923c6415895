//! orbit-orchestrator — instantiation engine for deployment intent groups.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!   ├── LifecycleManager     trail checks + compare-and-set commits (orbit-state)
//!   ├── dependency           app graph, cycle detection
//!   ├── placement            IntentStruc → ClusterList (orbit-placement)
//!   ├── ContextBuilder       ClusterList + manifests → context tree (orbit-context)
//!   └── ControllerScheduler  placement / prune / action / sync (orbit-scheduler)
//! ```
//!
//! Each request runs as one sequential task. Requests for different groups
//! may run concurrently; requests for the same group race on the lifecycle
//! commit and the loser rolls back its context.

pub mod builder;
pub mod config;
pub mod dependency;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;

pub use builder::{AppPlacement, ContextBuilder};
pub use config::OrchestratorConfig;
pub use dependency::{DependencyGraph, check_dependencies};
pub use error::{DependencyError, ErrorKind, LifecycleError, LifecycleResult, OrchestratorError, OrchestratorResult};
pub use lifecycle::{LifecycleManager, Snapshot, StatusReport};
pub use orchestrator::Orchestrator;
