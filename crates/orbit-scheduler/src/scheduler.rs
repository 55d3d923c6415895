//! ControllerScheduler — drives controllers over a deployment context.
//!
//! For one deployment intent group the scheduler:
//! - reads the group intents (controller → controller-specific intent)
//! - looks up each controller and splits placement from action controllers
//! - orders each class by ascending priority
//! - calls them one at a time, each call bounded by a timeout
//!
//! Nothing is persisted here beyond what controllers do to the context.
//! Rolling back a failed context is the caller's job.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use orbit_context::AppContext;
use orbit_state::{Controller, ControllerType, DeploymentIntentGroupKey, GENERIC_PLACEMENT_INTENT, StateStore};

use crate::cancel::CancelSignal;
use crate::error::{SchedulerError, SchedulerResult};
use crate::pool::ConnectionPool;
use crate::priority::PriorityQueue;
use crate::rpc::{EventType, RpcError, RpcResult, SyncClient};

/// Timeouts and well-known names used by the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Bound for routine calls (terminate, events, synchronization).
    pub call_timeout: Duration,
    /// Bound for placement and action calls, which may do heavy work.
    pub slow_call_timeout: Duration,
    /// Registration name of the synchronization service.
    pub sync_controller: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            slow_call_timeout: Duration::from_secs(30 * 60),
            sync_controller: "rsync".to_string(),
        }
    }
}

/// A controller together with the intent it is called with.
#[derive(Debug, Clone)]
pub struct ScheduledController {
    pub controller: Controller,
    pub intent: String,
}

impl ScheduledController {
    pub fn name(&self) -> &str {
        self.controller.name()
    }
}

/// Controllers bound to one deployment intent group, in call order.
#[derive(Debug, Clone, Default)]
pub struct ControllerPlan {
    pub placement: Vec<ScheduledController>,
    pub action: Vec<ScheduledController>,
}

pub struct ControllerScheduler {
    state: StateStore,
    pool: ConnectionPool,
    config: SchedulerConfig,
}

impl ControllerScheduler {
    pub fn new(state: StateStore, pool: ConnectionPool, config: SchedulerConfig) -> Self {
        Self { state, pool, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Discover and order the controllers of a deployment intent group.
    ///
    /// Equal priorities keep the order in which the group intents list
    /// them. A controller named twice is called once.
    pub fn plan(&self, group: &DeploymentIntentGroupKey) -> SchedulerResult<ControllerPlan> {
        let mut placement = PriorityQueue::new();
        let mut action = PriorityQueue::new();
        let mut seen = HashSet::new();

        for group_intent in self.state.list_group_intents(group)? {
            for (name, intent) in group_intent.spec.intent {
                if name == GENERIC_PLACEMENT_INTENT {
                    continue;
                }
                if !seen.insert(name.clone()) {
                    warn!(%group, controller = %name, "controller listed twice, ignoring repeat");
                    continue;
                }
                let controller = self
                    .state
                    .get_controller(&name)?
                    .ok_or_else(|| SchedulerError::ControllerNotFound(name.clone()))?;
                let priority = controller.spec.priority;
                let scheduled = ScheduledController { controller, intent };
                match scheduled.controller.spec.kind {
                    ControllerType::Placement => placement.push(priority, scheduled),
                    ControllerType::Action => action.push(priority, scheduled),
                    ControllerType::Other => {
                        warn!(%group, controller = %name, "controller has unknown type, skipping");
                    }
                }
            }
        }

        let plan = ControllerPlan {
            placement: placement.into_ordered(),
            action: action.into_ordered(),
        };
        debug!(
            %group,
            placement = plan.placement.len(),
            action = plan.action.len(),
            "controllers prioritized"
        );
        Ok(plan)
    }

    /// Run placement controllers, prune optional groups, run action
    /// controllers. Stops at the first failure.
    pub async fn instantiate(
        &self,
        group: &DeploymentIntentGroupKey,
        context: &AppContext,
        from_context_id: Option<&str>,
        cancel: &CancelSignal,
    ) -> SchedulerResult<ControllerPlan> {
        let plan = self.plan(group)?;
        self.filter_clusters(&plan, context.id(), cancel).await?;
        prune_optional_clusters(context)?;
        self.update_app_contexts(&plan, context.id(), from_context_id, cancel)
            .await?;
        Ok(plan)
    }

    /// Placement phase: each placement controller filters the clusters of
    /// the context, in priority order.
    pub async fn filter_clusters(
        &self,
        plan: &ControllerPlan,
        context_id: &str,
        cancel: &CancelSignal,
    ) -> SchedulerResult<()> {
        for scheduled in &plan.placement {
            let name = scheduled.name();
            checkpoint(cancel, name)?;
            let client = self.client(&scheduled.controller).await?;
            let response = with_timeout(self.config.slow_call_timeout, client.filter_clusters(context_id))
                .await
                .map_err(|source| remote(name, source))?;
            if !response.status {
                return Err(rejected(name, context_id, response.message));
            }
            info!(%context_id, controller = %name, "placement controller applied");
        }
        Ok(())
    }

    /// Action phase: each action controller updates the context with its
    /// intent, in priority order.
    pub async fn update_app_contexts(
        &self,
        plan: &ControllerPlan,
        context_id: &str,
        from_context_id: Option<&str>,
        cancel: &CancelSignal,
    ) -> SchedulerResult<()> {
        for scheduled in &plan.action {
            let name = scheduled.name();
            checkpoint(cancel, name)?;
            let client = self.client(&scheduled.controller).await?;
            let response = with_timeout(
                self.config.slow_call_timeout,
                client.update_app_context(&scheduled.intent, context_id, from_context_id),
            )
            .await
            .map_err(|source| remote(name, source))?;
            if !response.updated {
                return Err(rejected(name, context_id, response.message));
            }
            info!(%context_id, controller = %name, intent = %scheduled.intent, "action controller applied");
        }
        Ok(())
    }

    /// Ask every action controller to release what it holds for a context.
    /// Controllers that do not implement termination are skipped.
    pub async fn terminate(
        &self,
        group: &DeploymentIntentGroupKey,
        context_id: &str,
        cancel: &CancelSignal,
    ) -> SchedulerResult<()> {
        let plan = self.plan(group)?;
        for scheduled in &plan.action {
            let name = scheduled.name();
            checkpoint(cancel, name)?;
            let client = self.client(&scheduled.controller).await?;
            match with_timeout(self.config.call_timeout, client.terminate_app_context(context_id)).await {
                Ok(response) if response.terminated => {
                    info!(%context_id, controller = %name, "action controller terminated");
                }
                Ok(response) => return Err(rejected(name, context_id, response.message)),
                Err(err) if err.is_unimplemented() => {
                    info!(%context_id, controller = %name, "controller does not implement terminate, skipping");
                }
                Err(err) => return Err(remote(name, err)),
            }
        }
        Ok(())
    }

    /// Announce a lifecycle event to every action controller. Controllers
    /// that do not implement events are skipped.
    pub async fn post_event(
        &self,
        group: &DeploymentIntentGroupKey,
        context_id: &str,
        event: EventType,
        cancel: &CancelSignal,
    ) -> SchedulerResult<()> {
        let plan = self.plan(group)?;
        for scheduled in &plan.action {
            let name = scheduled.name();
            checkpoint(cancel, name)?;
            let client = self.client(&scheduled.controller).await?;
            match with_timeout(self.config.call_timeout, client.post_event(context_id, event)).await {
                Ok(response) if response.success => {
                    debug!(%context_id, controller = %name, ?event, "event delivered");
                }
                Ok(response) => return Err(rejected(name, context_id, response.message)),
                Err(err) if err.is_unimplemented() => {
                    debug!(%context_id, controller = %name, ?event, "controller does not implement events, skipping");
                }
                Err(err) => return Err(remote(name, err)),
            }
        }
        Ok(())
    }

    // ── Synchronization service ────────────────────────────────────

    pub async fn install(&self, context_id: &str) -> SchedulerResult<()> {
        let (name, client) = self.sync_client().await?;
        with_timeout(self.config.call_timeout, client.install_app(context_id))
            .await
            .map_err(|source| remote(&name, source))?;
        info!(%context_id, sync = %name, "install requested");
        Ok(())
    }

    pub async fn uninstall(&self, context_id: &str) -> SchedulerResult<()> {
        let (name, client) = self.sync_client().await?;
        with_timeout(self.config.call_timeout, client.uninstall_app(context_id))
            .await
            .map_err(|source| remote(&name, source))?;
        info!(%context_id, sync = %name, "uninstall requested");
        Ok(())
    }

    pub async fn update(&self, from_context_id: &str, to_context_id: &str) -> SchedulerResult<()> {
        let (name, client) = self.sync_client().await?;
        with_timeout(self.config.call_timeout, client.update_app(from_context_id, to_context_id))
            .await
            .map_err(|source| remote(&name, source))?;
        info!(from = %from_context_id, to = %to_context_id, sync = %name, "update requested");
        Ok(())
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn client(
        &self,
        controller: &Controller,
    ) -> SchedulerResult<Arc<dyn crate::rpc::ControllerClient>> {
        self.pool
            .controller(controller)
            .await
            .map_err(|source| remote(controller.name(), source))
    }

    async fn sync_client(&self) -> SchedulerResult<(String, Arc<dyn SyncClient>)> {
        let name = self.config.sync_controller.clone();
        let controller = self
            .state
            .get_controller(&name)?
            .ok_or_else(|| SchedulerError::SyncNotRegistered(name.clone()))?;
        let client = self
            .pool
            .sync(&controller)
            .await
            .map_err(|source| remote(&name, source))?;
        Ok((name, client))
    }
}

/// Collapse every optional group of every app to its first cluster.
/// Returns the number of clusters removed.
pub fn prune_optional_clusters(context: &AppContext) -> SchedulerResult<usize> {
    let mut removed = 0;
    for app in context.app_names()? {
        for (group, clusters) in context.cluster_group_map(&app)? {
            for cluster in clusters.iter().skip(1) {
                let handle = context.cluster_handle(&app, cluster)?;
                context.delete_cluster(&handle)?;
                removed += 1;
            }
            if let Some(kept) = clusters.first() {
                debug!(context_id = %context.id(), %app, %group, %kept, "optional group pruned");
            }
        }
    }
    Ok(removed)
}

async fn with_timeout<T>(limit: Duration, call: impl Future<Output = RpcResult<T>>) -> RpcResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::Timeout(limit)),
    }
}

fn checkpoint(cancel: &CancelSignal, controller: &str) -> SchedulerResult<()> {
    if cancel.is_cancelled() {
        warn!(%controller, "run cancelled, not calling further controllers");
        return Err(SchedulerError::Cancelled(controller.to_string()));
    }
    Ok(())
}

fn remote(controller: &str, source: RpcError) -> SchedulerError {
    SchedulerError::Remote {
        controller: controller.to_string(),
        source,
    }
}

fn rejected(controller: &str, context_id: &str, message: String) -> SchedulerError {
    SchedulerError::Rejected {
        controller: controller.to_string(),
        context_id: context_id.to_string(),
        message,
    }
}
