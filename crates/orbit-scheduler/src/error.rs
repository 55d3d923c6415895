//! Scheduler error types.

use thiserror::Error;

use crate::rpc::RpcError;

/// Errors that can occur while driving controllers.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("controller not found: {0}")]
    ControllerNotFound(String),

    #[error("synchronization controller {0} is not registered")]
    SyncNotRegistered(String),

    #[error("controller {controller} failed: {source}")]
    Remote {
        controller: String,
        #[source]
        source: RpcError,
    },

    #[error("controller {controller} rejected context {context_id}: {message}")]
    Rejected {
        controller: String,
        context_id: String,
        message: String,
    },

    #[error("cancelled before calling controller {0}")]
    Cancelled(String),

    #[error("context store error: {0}")]
    Context(#[from] orbit_context::ContextError),

    #[error("state store error: {0}")]
    State(#[from] orbit_state::StateError),
}

impl SchedulerError {
    /// Name of the controller the error originated from, if any.
    pub fn controller(&self) -> Option<&str> {
        match self {
            SchedulerError::ControllerNotFound(name)
            | SchedulerError::SyncNotRegistered(name)
            | SchedulerError::Cancelled(name) => Some(name),
            SchedulerError::Remote { controller, .. }
            | SchedulerError::Rejected { controller, .. } => Some(controller),
            SchedulerError::Context(_) | SchedulerError::State(_) => None,
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
