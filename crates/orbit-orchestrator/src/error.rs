//! Orchestrator error types and their mapping onto the public taxonomy.

use thiserror::Error;

use orbit_context::ContextError;
use orbit_placement::PlacementError;
use orbit_scheduler::SchedulerError;
use orbit_state::{StateError, TransitionError};

/// Coarse error categories reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidState,
    Validation,
    RemoteCall,
    Unknown,
}

/// Errors from the inter-app dependency check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("app {app} depends on unknown app {dependency}")]
    UnknownDependency { app: String, dependency: String },

    #[error("cyclic dependency between apps: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
}

/// Errors from lifecycle bookkeeping.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("deployment intent group not found: {0}")]
    NotFound(String),

    #[error("deployment intent group already exists: {0}")]
    AlreadyExists(String),

    #[error("{group}: {source}")]
    Transition {
        group: String,
        #[source]
        source: TransitionError,
    },

    #[error("deployment intent group {0} was modified concurrently")]
    ConcurrentModification(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("context store error: {0}")]
    Context(#[from] ContextError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("placement of app {app} failed: {source}")]
    Placement {
        app: String,
        #[source]
        source: PlacementError,
    },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("context build failed: {0}")]
    Build(String),

    #[error("context store error: {0}")]
    Context(#[from] ContextError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Lifecycle(err) => match err {
                LifecycleError::NotFound(_) => ErrorKind::NotFound,
                LifecycleError::AlreadyExists(_) => ErrorKind::AlreadyExists,
                LifecycleError::Transition { .. } | LifecycleError::ConcurrentModification(_) => {
                    ErrorKind::InvalidState
                }
                LifecycleError::State(err) => state_kind(err),
                LifecycleError::Context(err) => context_kind(err),
            },
            OrchestratorError::Dependency(_) => ErrorKind::Validation,
            OrchestratorError::Placement { source, .. } => match source {
                PlacementError::MalformedName(_) | PlacementError::Unresolved => ErrorKind::Validation,
                PlacementError::Catalog(err) => state_kind(err),
            },
            OrchestratorError::Scheduler(err) => match err {
                SchedulerError::ControllerNotFound(_) => ErrorKind::NotFound,
                SchedulerError::SyncNotRegistered(_)
                | SchedulerError::Remote { .. }
                | SchedulerError::Rejected { .. } => ErrorKind::RemoteCall,
                SchedulerError::Cancelled(_) => ErrorKind::Unknown,
                SchedulerError::Context(err) => context_kind(err),
                SchedulerError::State(err) => state_kind(err),
            },
            OrchestratorError::NotFound(_) => ErrorKind::NotFound,
            OrchestratorError::Build(_) => ErrorKind::Unknown,
            OrchestratorError::Context(err) => context_kind(err),
            OrchestratorError::State(err) => state_kind(err),
        }
    }
}

fn state_kind(err: &StateError) -> ErrorKind {
    match err {
        StateError::NotFound(_) => ErrorKind::NotFound,
        StateError::InvalidKey(_) => ErrorKind::Validation,
        _ => ErrorKind::Unknown,
    }
}

fn context_kind(err: &ContextError) -> ErrorKind {
    match err {
        ContextError::InvalidName(_) | ContextError::InvalidInstruction(_) => ErrorKind::Validation,
        _ => ErrorKind::Unknown,
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
