//! Orchestrator — instantiate, update, stop, terminate and report on
//! deployment intent groups.
//!
//! ```text
//! instantiate:
//!   lifecycle check ─► load apps/deps/intents ─► dependency check
//!     ─► resolve placement per app ─► init context + build
//!     ─► placement controllers ─► prune ─► action controllers
//!     ─► lifecycle commit ═══════════════► sync install ─► post event
//!   └──────── any failure: delete context ┘  (after the commit: reported,
//!                                             context kept)
//! ```

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use orbit_context::{AppContext, CompositeAppMeta, ContextId, ContextStatus, ContextStore};
use orbit_placement::resolve;
use orbit_scheduler::{CancelSignal, ConnectionPool, ControllerScheduler, EventType, SchedulerConfig};
use orbit_state::{
    DeploymentIntentGroup, DeploymentIntentGroupKey, GENERIC_PLACEMENT_INTENT, Operation, StateStore, StateValue,
};

use crate::builder::{AppPlacement, ContextBuilder};
use crate::dependency::check_dependencies;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::lifecycle::{LifecycleManager, Snapshot, StatusReport};

pub struct Orchestrator {
    state: StateStore,
    contexts: ContextStore,
    lifecycle: LifecycleManager,
    scheduler: ControllerScheduler,
}

impl Orchestrator {
    pub fn new(state: StateStore, contexts: ContextStore, pool: ConnectionPool, config: SchedulerConfig) -> Self {
        Self {
            lifecycle: LifecycleManager::new(state.clone(), contexts.clone()),
            scheduler: ControllerScheduler::new(state.clone(), pool, config),
            state,
            contexts,
        }
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn scheduler(&self) -> &ControllerScheduler {
        &self.scheduler
    }

    // ── Lifecycle bookkeeping ──────────────────────────────────────

    pub fn create(&self, key: &DeploymentIntentGroupKey, group: &DeploymentIntentGroup) -> OrchestratorResult<()> {
        Ok(self.lifecycle.create(key, group)?)
    }

    pub fn approve(&self, key: &DeploymentIntentGroupKey) -> OrchestratorResult<()> {
        self.lifecycle.approve(key)?;
        Ok(())
    }

    pub fn delete(&self, key: &DeploymentIntentGroupKey) -> OrchestratorResult<()> {
        Ok(self.lifecycle.delete(key)?)
    }

    // ── Instantiate / update ───────────────────────────────────────

    /// Build a new context for the group, run its controllers, record it
    /// and hand it to the synchronization service. Returns the context id.
    pub async fn instantiate(
        &self,
        key: &DeploymentIntentGroupKey,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<ContextId> {
        let snapshot = self.lifecycle.check(key, Operation::Instantiate)?;
        let context = self.prepare(key, &snapshot, None, cancel).await?;
        let context_id = context.id().to_string();

        if let Err(err) = self.scheduler.install(&context_id).await {
            error!(group = %key, %context_id, error = %err, "install failed after commit");
            mark(&context, ContextStatus::InstantiateFailed);
            return Err(err.into());
        }
        mark(&context, ContextStatus::Instantiated);
        self.notify(key, &context_id, EventType::Instantiate, cancel).await;

        info!(group = %key, %context_id, "instantiated");
        Ok(context_id)
    }

    /// Replace the live context of an instantiated group with a freshly
    /// built one. Action controllers see the previous context id.
    pub async fn update(
        &self,
        key: &DeploymentIntentGroupKey,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<ContextId> {
        let snapshot = self.lifecycle.check(key, Operation::Update)?;
        let from = snapshot
            .context_id()
            .map(str::to_string)
            .ok_or_else(|| OrchestratorError::NotFound(format!("live context of {key}")))?;

        let context = self.prepare(key, &snapshot, Some(&from), cancel).await?;
        let context_id = context.id().to_string();

        if let Err(err) = self.scheduler.update(&from, &context_id).await {
            error!(group = %key, %from, to = %context_id, error = %err, "update failed after commit");
            mark(&context, ContextStatus::UpdateFailed);
            return Err(err.into());
        }
        mark(&context, ContextStatus::Updated);
        self.notify(key, &context_id, EventType::Update, cancel).await;

        info!(group = %key, %from, to = %context_id, "updated");
        Ok(context_id)
    }

    /// Everything up to and including the lifecycle commit. The context is
    /// deleted if any step fails.
    async fn prepare(
        &self,
        key: &DeploymentIntentGroupKey,
        snapshot: &Snapshot,
        from: Option<&str>,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<AppContext> {
        let group = self
            .state
            .get_deployment_intent_group(key)?
            .ok_or_else(|| OrchestratorError::NotFound(format!("deployment intent group {key}")))?;
        let placements = self.resolve_placements(key)?;

        let meta = CompositeAppMeta {
            project: key.project.clone(),
            composite_app: key.composite_app.clone(),
            version: key.composite_app_version.clone(),
            release: group.spec.version.clone(),
            deployment_intent_group: key.deployment_intent_group.clone(),
            namespace: group.spec.namespace.clone(),
            logical_cloud: group.spec.logical_cloud.clone(),
            level: "0".to_string(),
        };

        let context = self.contexts.init()?;
        let context_id = context.id().to_string();
        info!(group = %key, %context_id, apps = placements.len(), "building context");

        let run = async {
            ContextBuilder::new(&context).build(&meta, &placements)?;
            let status = match from {
                Some(_) => ContextStatus::Updating,
                None => ContextStatus::Instantiating,
            };
            context.set_status(status)?;
            self.scheduler.instantiate(key, &context, from, cancel).await?;
            self.lifecycle
                .commit(key, snapshot, StateValue::Instantiated, &context_id)?;
            Ok::<_, OrchestratorError>(())
        };

        match run.await {
            Ok(()) => Ok(context),
            Err(err) => {
                rollback(&context, &err);
                Err(err)
            }
        }
    }

    /// Load the apps of the group, check their dependencies and resolve
    /// where each one goes. Nothing is written.
    fn resolve_placements(&self, key: &DeploymentIntentGroupKey) -> OrchestratorResult<Vec<AppPlacement>> {
        let apps = self.state.list_apps(key)?;
        let mut dependencies = BTreeMap::new();
        for app in &apps {
            dependencies.insert(app.name().to_string(), self.state.list_app_dependencies(key, app.name())?);
        }
        check_dependencies(&apps, &dependencies)?;

        let placement_intent = self
            .state
            .list_group_intents(key)?
            .into_iter()
            .find_map(|intent| intent.spec.intent.get(GENERIC_PLACEMENT_INTENT).cloned())
            .ok_or_else(|| OrchestratorError::NotFound(format!("generic placement intent of {key}")))?;

        let mut placements = Vec::with_capacity(apps.len());
        for app in apps {
            let intent = self.state.app_intent_for(key, &placement_intent, app.name())?;
            let clusters = resolve(&intent.spec.intent, &self.state).map_err(|source| {
                OrchestratorError::Placement {
                    app: app.name().to_string(),
                    source,
                }
            })?;
            let dependencies = dependencies.remove(app.name()).unwrap_or_default();
            placements.push(AppPlacement {
                app,
                dependencies,
                clusters,
            });
        }
        Ok(placements)
    }

    // ── Terminate / stop ───────────────────────────────────────────

    /// Release the live context: action controllers, then the
    /// synchronization service, then the lifecycle. The context tree is
    /// deleted once the termination is recorded.
    pub async fn terminate(&self, key: &DeploymentIntentGroupKey, cancel: &CancelSignal) -> OrchestratorResult<()> {
        let snapshot = self.lifecycle.check(key, Operation::Terminate)?;
        let context_id = snapshot
            .context_id()
            .map(str::to_string)
            .ok_or_else(|| OrchestratorError::NotFound(format!("live context of {key}")))?;
        let context = self.contexts.load(&context_id).ok();
        if let Some(context) = &context {
            mark(context, ContextStatus::Terminating);
        }

        let released = async {
            self.scheduler.terminate(key, &context_id, cancel).await?;
            self.scheduler.uninstall(&context_id).await?;
            Ok::<_, OrchestratorError>(())
        };
        if let Err(err) = released.await {
            error!(group = %key, %context_id, error = %err, "terminate failed");
            if let Some(context) = &context {
                mark(context, ContextStatus::TerminateFailed);
            }
            return Err(err);
        }

        self.lifecycle
            .commit(key, &snapshot, StateValue::Terminated, &context_id)?;
        if let Some(context) = &context {
            context.delete_composite_app()?;
        }
        self.notify(key, &context_id, EventType::Terminate, cancel).await;

        info!(group = %key, %context_id, "terminated");
        Ok(())
    }

    /// Stop an instantiation or a termination in progress, depending on
    /// the current state.
    pub async fn stop(&self, key: &DeploymentIntentGroupKey, cancel: &CancelSignal) -> OrchestratorResult<StateValue> {
        let current = self.lifecycle.snapshot(key)?;
        let operation = match current.state() {
            Some(StateValue::Terminated) => Operation::StopTerminate,
            _ => Operation::StopInstantiate,
        };
        let snapshot = self.lifecycle.check(key, operation)?;
        let context_id = snapshot.context_id().unwrap_or_default().to_string();
        let target = operation.target().unwrap_or(StateValue::InstantiateStopped);

        self.lifecycle.commit(key, &snapshot, target, &context_id)?;
        if self.contexts.exists(&context_id)? {
            self.contexts.load(&context_id)?.set_stop_flag(true)?;
        }
        self.notify(key, &context_id, EventType::Stop, cancel).await;

        info!(group = %key, %context_id, state = %target, "stopped");
        Ok(target)
    }

    // ── Status ─────────────────────────────────────────────────────

    pub fn status(&self, key: &DeploymentIntentGroupKey) -> OrchestratorResult<StatusReport> {
        Ok(self.lifecycle.status(key)?)
    }

    /// Post-commit event; failures are logged and otherwise ignored.
    async fn notify(&self, key: &DeploymentIntentGroupKey, context_id: &str, event: EventType, cancel: &CancelSignal) {
        if let Err(err) = self.scheduler.post_event(key, context_id, event, cancel).await {
            warn!(group = %key, %context_id, ?event, error = %err, "post event failed");
        }
    }
}

fn rollback(context: &AppContext, cause: &OrchestratorError) {
    match context.delete_composite_app() {
        Ok(removed) => {
            warn!(context_id = %context.id(), removed, error = %cause, "context rolled back");
        }
        Err(err) => {
            error!(context_id = %context.id(), error = %err, cause = %cause, "context rollback failed");
        }
    }
}

/// Record the run-time status of a context. Failures are logged only.
fn mark(context: &AppContext, status: ContextStatus) {
    if let Err(err) = context.set_status(status) {
        warn!(context_id = %context.id(), ?status, error = %err, "failed to record context status");
    }
}
