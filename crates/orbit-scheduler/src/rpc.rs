//! Remote interfaces of controllers and the synchronization service.
//!
//! The transport is not Orbit's concern: a `Connector` turns a controller
//! registration into clients, and tests plug in in-process fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orbit_state::Controller;

/// Errors returned by remote calls.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("{0} is not implemented by this controller")]
    Unimplemented(String),

    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

impl RpcError {
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, RpcError::Unimplemented(_))
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResponse {
    pub status: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub updated: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminateResponse {
    pub terminated: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResponse {
    pub success: bool,
    pub message: String,
}

/// Lifecycle events announced to action controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Instantiate,
    Terminate,
    Update,
    Stop,
}

/// Calls served by placement and action controllers.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Placement controllers remove clusters from the context.
    async fn filter_clusters(&self, context_id: &str) -> RpcResult<FilterResponse>;

    /// Action controllers rewrite resources of the context.
    async fn update_app_context(
        &self,
        intent: &str,
        context_id: &str,
        from_context_id: Option<&str>,
    ) -> RpcResult<UpdateResponse>;

    async fn terminate_app_context(&self, context_id: &str) -> RpcResult<TerminateResponse>;

    async fn post_event(&self, context_id: &str, event: EventType) -> RpcResult<EventResponse>;
}

/// The service that applies a context to the target clusters.
#[async_trait]
pub trait SyncClient: Send + Sync {
    async fn install_app(&self, context_id: &str) -> RpcResult<()>;

    async fn uninstall_app(&self, context_id: &str) -> RpcResult<()>;

    async fn update_app(&self, from_context_id: &str, to_context_id: &str) -> RpcResult<()>;
}

/// Builds clients for registered controllers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect_controller(&self, controller: &Controller) -> RpcResult<Arc<dyn ControllerClient>>;

    async fn connect_sync(&self, controller: &Controller) -> RpcResult<Arc<dyn SyncClient>>;
}
