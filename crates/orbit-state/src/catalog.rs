//! Typed catalog accessors over the document store.
//!
//! Thin wrappers that pin each record type to its collection, key shape,
//! and tag. Registration of these records belongs to outer API layers; the
//! orchestrator mostly reads them.

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::keys::{collections::*, *};
use crate::lifecycle::StateInfo;
use crate::store::StateStore;
use crate::types::*;

impl StateStore {
    // ── Controllers ────────────────────────────────────────────────

    /// Insert or update a controller registration.
    pub fn put_controller(&self, controller: &Controller) -> StateResult<()> {
        let key = ControllerKey {
            controller: controller.name().to_string(),
        };
        self.put(CONTROLLER, &key, TAG_DATA, controller)?;
        debug!(controller = %controller.name(), priority = controller.spec.priority, "controller registered");
        Ok(())
    }

    pub fn get_controller(&self, name: &str) -> StateResult<Option<Controller>> {
        let key = ControllerKey {
            controller: name.to_string(),
        };
        self.find_one_as(CONTROLLER, &key, TAG_DATA)
    }

    /// All registered controllers, in registration order.
    pub fn list_controllers(&self) -> StateResult<Vec<Controller>> {
        self.find_as(CONTROLLER, &ControllerKey::default(), TAG_DATA)
    }

    pub fn delete_controller(&self, name: &str) -> StateResult<bool> {
        let key = ControllerKey {
            controller: name.to_string(),
        };
        self.remove(CONTROLLER, &key)
    }

    // ── Clusters ───────────────────────────────────────────────────

    pub fn put_cluster(&self, cluster: &Cluster) -> StateResult<()> {
        let key = ClusterKey {
            cluster_provider: cluster.cluster_provider.clone(),
            cluster: cluster.name().to_string(),
        };
        self.put(CLUSTER, &key, TAG_DATA, cluster)
    }

    pub fn get_cluster(&self, provider: &str, name: &str) -> StateResult<Option<Cluster>> {
        let key = ClusterKey {
            cluster_provider: provider.to_string(),
            cluster: name.to_string(),
        };
        self.find_one_as(CLUSTER, &key, TAG_DATA)
    }

    /// Clusters of one provider, in registration order.
    pub fn list_clusters(&self, provider: &str) -> StateResult<Vec<Cluster>> {
        let key = ClusterKey {
            cluster_provider: provider.to_string(),
            cluster: String::new(),
        };
        self.find_as(CLUSTER, &key, TAG_DATA)
    }

    /// Names of the provider's clusters carrying `label`.
    pub fn clusters_with_label(&self, provider: &str, label: &str) -> StateResult<Vec<String>> {
        Ok(self
            .list_clusters(provider)?
            .into_iter()
            .filter(|cluster| cluster.labels.iter().any(|l| l == label))
            .map(|cluster| cluster.metadata.name)
            .collect())
    }

    // ── Apps ───────────────────────────────────────────────────────

    pub fn put_app(&self, key: &AppKey, app: &App) -> StateResult<()> {
        self.put(APP, key, TAG_DATA, app)
    }

    /// Apps of a composite app, in declaration order.
    pub fn list_apps(&self, group: &DeploymentIntentGroupKey) -> StateResult<Vec<App>> {
        self.find_as(APP, &group.app(""), TAG_DATA)
    }

    pub fn put_app_dependency(&self, key: &AppDependencyKey, dependency: &AppDependency) -> StateResult<()> {
        self.put(APP_DEPENDENCY, key, TAG_DATA, dependency)
    }

    /// Dependencies declared by `app`.
    pub fn list_app_dependencies(
        &self,
        group: &DeploymentIntentGroupKey,
        app: &str,
    ) -> StateResult<Vec<AppDependency>> {
        self.find_as(APP_DEPENDENCY, &group.app_dependency(app, ""), TAG_DATA)
    }

    // ── Deployment intent groups ───────────────────────────────────

    pub fn put_deployment_intent_group(
        &self,
        key: &DeploymentIntentGroupKey,
        group: &DeploymentIntentGroup,
    ) -> StateResult<()> {
        self.put(DEPLOYMENT_INTENT_GROUP, key, TAG_DATA, group)
    }

    /// Store a new group together with its initial lifecycle trail in one
    /// transaction. Returns false if the group already exists.
    pub fn create_deployment_intent_group(
        &self,
        key: &DeploymentIntentGroupKey,
        group: &DeploymentIntentGroup,
        info: &StateInfo,
    ) -> StateResult<bool> {
        let data = serde_json::to_vec(group).map_err(|e| StateError::Serialize(e.to_string()))?;
        let state = serde_json::to_vec(info).map_err(|e| StateError::Serialize(e.to_string()))?;
        self.insert_new(
            DEPLOYMENT_INTENT_GROUP,
            key,
            &[(TAG_DATA, data.as_slice()), (TAG_STATE, state.as_slice())],
        )
    }

    pub fn get_deployment_intent_group(
        &self,
        key: &DeploymentIntentGroupKey,
    ) -> StateResult<Option<DeploymentIntentGroup>> {
        self.find_one_as(DEPLOYMENT_INTENT_GROUP, key, TAG_DATA)
    }

    /// Lifecycle trail and the raw bytes it was decoded from. The bytes are
    /// the expectation to hand back to `swap_state_info`.
    pub fn get_state_info(
        &self,
        key: &DeploymentIntentGroupKey,
    ) -> StateResult<Option<(StateInfo, Vec<u8>)>> {
        match self.find(DEPLOYMENT_INTENT_GROUP, key, TAG_STATE)?.into_iter().next() {
            Some(raw) => Ok(Some((Self::unmarshal(&raw)?, raw))),
            None => Ok(None),
        }
    }

    /// Replace the lifecycle trail only if it still equals `expected`.
    pub fn swap_state_info(
        &self,
        key: &DeploymentIntentGroupKey,
        expected: &[u8],
        info: &StateInfo,
    ) -> StateResult<bool> {
        let bytes = serde_json::to_vec(info).map_err(|e| StateError::Serialize(e.to_string()))?;
        self.swap(DEPLOYMENT_INTENT_GROUP, key, TAG_STATE, expected, &bytes)
    }

    pub fn delete_deployment_intent_group(&self, key: &DeploymentIntentGroupKey) -> StateResult<bool> {
        self.remove(DEPLOYMENT_INTENT_GROUP, key)
    }

    /// Remove the group only if its lifecycle trail still equals `expected`.
    pub fn delete_deployment_intent_group_if(
        &self,
        key: &DeploymentIntentGroupKey,
        expected: &[u8],
    ) -> StateResult<bool> {
        self.remove_if(DEPLOYMENT_INTENT_GROUP, key, TAG_STATE, expected)
    }

    // ── Intents ────────────────────────────────────────────────────

    pub fn put_placement_intent(
        &self,
        key: &GenericPlacementIntentKey,
        intent: &GenericPlacementIntent,
    ) -> StateResult<()> {
        self.put(PLACEMENT_INTENT, key, TAG_DATA, intent)
    }

    pub fn get_placement_intent(
        &self,
        key: &GenericPlacementIntentKey,
    ) -> StateResult<Option<GenericPlacementIntent>> {
        self.find_one_as(PLACEMENT_INTENT, key, TAG_DATA)
    }

    /// Store an app intent, queryable by the app it places.
    pub fn put_app_intent(&self, key: &AppIntentKey, intent: &AppIntent) -> StateResult<()> {
        let query = AppIntentQuery {
            app: intent.spec.app.clone(),
        };
        self.put_with_query(APP_INTENT, key, &query, TAG_DATA, intent)
    }

    /// The app intent placing `app` under a generic placement intent.
    pub fn app_intent_for(
        &self,
        group: &DeploymentIntentGroupKey,
        placement_intent: &str,
        app: &str,
    ) -> StateResult<AppIntent> {
        let key = group.app_intent_by_app(placement_intent, app);
        self.find_one_as(APP_INTENT, &key, TAG_DATA)?
            .ok_or_else(|| StateError::NotFound(format!("app intent for app {app} in {group}")))
    }

    pub fn put_group_intent(&self, key: &GroupIntentKey, intent: &GroupIntent) -> StateResult<()> {
        self.put(GROUP_INTENT, key, TAG_DATA, intent)
    }

    /// Group intents of a deployment intent group, in registration order.
    pub fn list_group_intents(&self, group: &DeploymentIntentGroupKey) -> StateResult<Vec<GroupIntent>> {
        self.find_as(GROUP_INTENT, &group.group_intent(""), TAG_DATA)
    }
}
