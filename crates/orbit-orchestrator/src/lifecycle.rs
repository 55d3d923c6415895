//! LifecycleManager — guards and records transitions of deployment intent
//! groups.
//!
//! Every operation follows the same pattern:
//!
//! ```text
//! check(op)  → Snapshot { trail, raw bytes }
//!   ... do the work ...
//! commit(snapshot, state, context_id)
//!   → swap raw bytes for trail + 1 entry, or ConcurrentModification
//! ```
//!
//! The swap happens inside one redb write transaction, so of two requests
//! that passed `check` on the same revision only one can commit.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

use orbit_context::{ContextId, ContextStatus, ContextStore};
use orbit_state::{
    ActionEntry, DeploymentIntentGroup, DeploymentIntentGroupKey, Operation, StateInfo, StateStore, StateValue,
};

use crate::error::{LifecycleError, LifecycleResult};

/// A lifecycle trail as read before an operation, plus the bytes it was
/// read from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub info: StateInfo,
    raw: Vec<u8>,
}

impl Snapshot {
    pub fn state(&self) -> Option<StateValue> {
        self.info.current_state()
    }

    pub fn revision(&self) -> u64 {
        self.info.revision()
    }

    /// Context the current state refers to.
    pub fn context_id(&self) -> Option<&str> {
        self.info.last_context_id().or_else(|| {
            Some(self.info.status_context_id.as_str()).filter(|id| !id.is_empty())
        })
    }
}

/// Lifecycle report of one deployment intent group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub group: String,
    pub state: Option<StateValue>,
    pub revision: u64,
    pub context_id: Option<ContextId>,
    /// Run-time status of the context, while its tree exists.
    pub context_status: Option<ContextStatus>,
    pub actions: Vec<ActionEntry>,
}

#[derive(Clone)]
pub struct LifecycleManager {
    state: StateStore,
    contexts: ContextStore,
}

impl LifecycleManager {
    pub fn new(state: StateStore, contexts: ContextStore) -> Self {
        Self { state, contexts }
    }

    /// Register a deployment intent group with a fresh Created trail.
    pub fn create(&self, key: &DeploymentIntentGroupKey, group: &DeploymentIntentGroup) -> LifecycleResult<()> {
        if !self
            .state
            .create_deployment_intent_group(key, group, &StateInfo::created(now()))?
        {
            return Err(LifecycleError::AlreadyExists(key.to_string()));
        }
        info!(group = %key, "deployment intent group created");
        Ok(())
    }

    pub fn approve(&self, key: &DeploymentIntentGroupKey) -> LifecycleResult<ActionEntry> {
        let snapshot = self.check(key, Operation::Approve)?;
        self.commit(key, &snapshot, StateValue::Approved, "")
    }

    /// Current trail of a group.
    pub fn snapshot(&self, key: &DeploymentIntentGroupKey) -> LifecycleResult<Snapshot> {
        match self.state.get_state_info(key)? {
            Some((info, raw)) => Ok(Snapshot { info, raw }),
            None => Err(LifecycleError::NotFound(key.to_string())),
        }
    }

    /// Read the trail and verify that `operation` is legal.
    pub fn check(&self, key: &DeploymentIntentGroupKey, operation: Operation) -> LifecycleResult<Snapshot> {
        let snapshot = self.snapshot(key)?;
        snapshot
            .info
            .check(operation)
            .map_err(|source| LifecycleError::Transition {
                group: key.to_string(),
                source,
            })?;
        debug!(group = %key, %operation, revision = snapshot.revision(), "transition allowed");
        Ok(snapshot)
    }

    /// Append `state` to the trail read in `snapshot`. Fails if the trail
    /// changed in the meantime.
    pub fn commit(
        &self,
        key: &DeploymentIntentGroupKey,
        snapshot: &Snapshot,
        state: StateValue,
        context_id: &str,
    ) -> LifecycleResult<ActionEntry> {
        let mut info = snapshot.info.clone();
        let entry = info.append(state, context_id, now()).clone();
        if !self.state.swap_state_info(key, &snapshot.raw, &info)? {
            warn!(group = %key, expected = snapshot.revision(), "lifecycle trail changed underneath");
            return Err(LifecycleError::ConcurrentModification(key.to_string()));
        }
        info!(group = %key, state = %entry.state, %context_id, revision = entry.revision, "lifecycle committed");
        Ok(entry)
    }

    pub fn status(&self, key: &DeploymentIntentGroupKey) -> LifecycleResult<StatusReport> {
        let snapshot = self.snapshot(key)?;
        let context_id = snapshot.context_id().map(str::to_string);
        let context_status = match &context_id {
            Some(id) if self.contexts.exists(id)? => self.contexts.load(id)?.status()?,
            _ => None,
        };
        Ok(StatusReport {
            group: key.to_string(),
            state: snapshot.state(),
            revision: snapshot.revision(),
            context_id,
            context_status,
            actions: snapshot.info.actions,
        })
    }

    /// Remove a group. Every context still referenced by its trail is
    /// deleted afterwards. A group without a trail is removed as-is.
    pub fn delete(&self, key: &DeploymentIntentGroupKey) -> LifecycleResult<()> {
        if self.state.get_state_info(key)?.is_none() {
            let removed = self.state.delete_deployment_intent_group(key)?;
            debug!(group = %key, removed, "no lifecycle trail, raw record removal");
            return Ok(());
        }
        let snapshot = self.check(key, Operation::Delete)?;
        self.remove(key, &snapshot)
    }

    /// Remove the group read in `snapshot`. Fails if the trail changed in
    /// the meantime, in which case nothing is removed.
    pub fn remove(&self, key: &DeploymentIntentGroupKey, snapshot: &Snapshot) -> LifecycleResult<()> {
        if !self.state.delete_deployment_intent_group_if(key, &snapshot.raw)? {
            warn!(group = %key, expected = snapshot.revision(), "lifecycle trail changed underneath");
            return Err(LifecycleError::ConcurrentModification(key.to_string()));
        }
        for context_id in snapshot.info.context_ids() {
            if self.contexts.exists(context_id)? {
                let removed = self.contexts.load(context_id)?.delete_composite_app()?;
                debug!(group = %key, %context_id, removed, "stale context disposed");
            }
        }
        info!(group = %key, "deployment intent group deleted");
        Ok(())
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use orbit_state::{DeploymentIntentGroupSpec, Metadata, TransitionError};

    use super::*;

    fn key() -> DeploymentIntentGroupKey {
        DeploymentIntentGroupKey::new("proj", "shop", "v1", "dig")
    }

    fn group() -> DeploymentIntentGroup {
        DeploymentIntentGroup {
            metadata: Metadata::named("dig"),
            spec: DeploymentIntentGroupSpec {
                version: "r1".into(),
                ..Default::default()
            },
        }
    }

    fn manager() -> LifecycleManager {
        LifecycleManager::new(
            StateStore::open_in_memory().unwrap(),
            ContextStore::open_in_memory().unwrap(),
        )
    }

    #[test]
    fn create_twice_fails() {
        let lifecycle = manager();
        lifecycle.create(&key(), &group()).unwrap();
        assert!(matches!(
            lifecycle.create(&key(), &group()),
            Err(LifecycleError::AlreadyExists(_))
        ));
        assert_eq!(lifecycle.snapshot(&key()).unwrap().state(), Some(StateValue::Created));
    }

    #[test]
    fn approve_appends_entry() {
        let lifecycle = manager();
        lifecycle.create(&key(), &group()).unwrap();
        let entry = lifecycle.approve(&key()).unwrap();
        assert_eq!(entry.state, StateValue::Approved);
        assert_eq!(entry.revision, 2);

        assert!(matches!(
            lifecycle.approve(&key()),
            Err(LifecycleError::Transition {
                source: TransitionError::AlreadyApproved,
                ..
            })
        ));
    }

    #[test]
    fn stale_snapshot_is_rejected() {
        let lifecycle = manager();
        lifecycle.create(&key(), &group()).unwrap();
        lifecycle.approve(&key()).unwrap();

        let first = lifecycle.check(&key(), Operation::Instantiate).unwrap();
        let second = lifecycle.check(&key(), Operation::Instantiate).unwrap();
        assert_eq!(first.revision(), second.revision());

        lifecycle.commit(&key(), &first, StateValue::Instantiated, "1").unwrap();
        assert!(matches!(
            lifecycle.commit(&key(), &second, StateValue::Instantiated, "2"),
            Err(LifecycleError::ConcurrentModification(_))
        ));

        let snapshot = lifecycle.snapshot(&key()).unwrap();
        assert_eq!(snapshot.revision(), 3);
        assert_eq!(snapshot.context_id(), Some("1"));
    }

    #[test]
    fn create_never_overwrites_a_moved_trail() {
        let lifecycle = manager();
        lifecycle.create(&key(), &group()).unwrap();
        lifecycle.approve(&key()).unwrap();

        let mut other = group();
        other.spec.version = "r2".into();
        assert!(matches!(
            lifecycle.create(&key(), &other),
            Err(LifecycleError::AlreadyExists(_))
        ));

        let snapshot = lifecycle.snapshot(&key()).unwrap();
        assert_eq!(snapshot.state(), Some(StateValue::Approved));
        assert_eq!(snapshot.revision(), 2);
        let stored = lifecycle.state.get_deployment_intent_group(&key()).unwrap().unwrap();
        assert_eq!(stored.spec.version, "r1");
    }

    #[test]
    fn stale_delete_keeps_group_instantiated_meanwhile() {
        let lifecycle = manager();
        lifecycle.create(&key(), &group()).unwrap();
        lifecycle.approve(&key()).unwrap();

        let deleting = lifecycle.check(&key(), Operation::Delete).unwrap();
        let instantiating = lifecycle.check(&key(), Operation::Instantiate).unwrap();
        lifecycle
            .commit(&key(), &instantiating, StateValue::Instantiated, "9")
            .unwrap();

        assert!(matches!(
            lifecycle.remove(&key(), &deleting),
            Err(LifecycleError::ConcurrentModification(_))
        ));
        assert!(lifecycle.state.get_deployment_intent_group(&key()).unwrap().is_some());
        assert_eq!(
            lifecycle.snapshot(&key()).unwrap().state(),
            Some(StateValue::Instantiated)
        );
    }

    #[test]
    fn commit_after_delete_is_rejected() {
        let lifecycle = manager();
        lifecycle.create(&key(), &group()).unwrap();
        lifecycle.approve(&key()).unwrap();

        let instantiating = lifecycle.check(&key(), Operation::Instantiate).unwrap();
        lifecycle.delete(&key()).unwrap();

        assert!(matches!(
            lifecycle.commit(&key(), &instantiating, StateValue::Instantiated, "9"),
            Err(LifecycleError::ConcurrentModification(_))
        ));
        assert!(lifecycle.state.get_state_info(&key()).unwrap().is_none());
    }

    #[test]
    fn missing_group_is_not_found() {
        let lifecycle = manager();
        assert!(matches!(
            lifecycle.check(&key(), Operation::Approve),
            Err(LifecycleError::NotFound(_))
        ));
    }

    #[test]
    fn delete_requires_termination() {
        let lifecycle = manager();
        lifecycle.create(&key(), &group()).unwrap();
        lifecycle.approve(&key()).unwrap();
        let snapshot = lifecycle.check(&key(), Operation::Instantiate).unwrap();
        lifecycle.commit(&key(), &snapshot, StateValue::Instantiated, "7").unwrap();

        assert!(matches!(
            lifecycle.delete(&key()),
            Err(LifecycleError::Transition {
                source: TransitionError::MustTerminate,
                ..
            })
        ));
    }

    #[test]
    fn delete_disposes_referenced_contexts() {
        let state = StateStore::open_in_memory().unwrap();
        let contexts = ContextStore::open_in_memory().unwrap();
        let lifecycle = LifecycleManager::new(state.clone(), contexts.clone());
        lifecycle.create(&key(), &group()).unwrap();
        lifecycle.approve(&key()).unwrap();

        let ctx = contexts.init().unwrap();
        ctx.create_composite_app().unwrap();
        let snapshot = lifecycle.check(&key(), Operation::Instantiate).unwrap();
        lifecycle.commit(&key(), &snapshot, StateValue::Instantiated, ctx.id()).unwrap();
        let snapshot = lifecycle.check(&key(), Operation::Terminate).unwrap();
        lifecycle.commit(&key(), &snapshot, StateValue::Terminated, ctx.id()).unwrap();

        lifecycle.delete(&key()).unwrap();
        assert!(!contexts.exists(ctx.id()).unwrap());
        assert!(state.get_deployment_intent_group(&key()).unwrap().is_none());
        assert!(state.get_state_info(&key()).unwrap().is_none());
    }

    #[test]
    fn delete_without_trail_is_a_no_op() {
        let lifecycle = manager();
        lifecycle.delete(&key()).unwrap();

        // A record whose trail was lost is still removable.
        lifecycle.state.put_deployment_intent_group(&key(), &group()).unwrap();
        lifecycle.delete(&key()).unwrap();
        assert!(lifecycle.state.get_deployment_intent_group(&key()).unwrap().is_none());
    }
}
