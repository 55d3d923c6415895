//! orbit-scheduler — priority-ordered controller calls.
//!
//! A deployment intent group binds controllers through its group intents.
//! Placement controllers narrow the clusters of a context; action
//! controllers rewrite its resources; the synchronization service applies
//! the result to the clusters.
//!
//! # Architecture
//!
//! ```text
//! ControllerScheduler
//!   ├── plan()          group intents → PriorityQueue per controller type
//!   ├── placement       filter_clusters, ascending priority
//!   ├── prune           one cluster per optional group
//!   ├── action          update_app_context, ascending priority
//!   └── sync            install / uninstall / update
//!         │
//!   ConnectionPool (controller name → cached client)
//!         │
//!   Connector (transport, pluggable)
//! ```
//!
//! Calls are strictly sequential. Each is bounded by a timeout and gated
//! by a `CancelSignal`.

pub mod cancel;
pub mod error;
pub mod pool;
pub mod priority;
pub mod rpc;
pub mod scheduler;

pub use cancel::{CancelHandle, CancelSignal, cancellation};
pub use error::{SchedulerError, SchedulerResult};
pub use pool::ConnectionPool;
pub use priority::PriorityQueue;
pub use rpc::{
    Connector, ControllerClient, EventResponse, EventType, FilterResponse, RpcError, RpcResult, SyncClient,
    TerminateResponse, UpdateResponse,
};
pub use scheduler::{ControllerPlan, ControllerScheduler, ScheduledController, SchedulerConfig, prune_optional_clusters};
