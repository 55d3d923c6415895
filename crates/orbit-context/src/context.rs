//! AppContext — operations on one deployment context tree.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{ContextError, ContextResult};
use crate::store::ContextStore;
use crate::types::*;

const LEVEL_META: &str = "meta";
const LEVEL_APP: &str = "app";
const LEVEL_CLUSTER: &str = "cluster";
const LEVEL_GROUP: &str = "group";
const LEVEL_RESOURCE: &str = "resource";
const LEVEL_INSTRUCTION: &str = "instruction";
const LEVEL_STATUS: &str = "status";
const LEVEL_STOP_FLAG: &str = "stopflag";

/// Names become path segments, so they must be non-empty and slash-free.
fn validate_name(name: &str) -> ContextResult<()> {
    if name.is_empty() || name.contains('/') {
        return Err(ContextError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> ContextResult<Value> {
    serde_json::to_value(value).map_err(|e| ContextError::Serialize(e.to_string()))
}

/// Handle to one deployment context.
#[derive(Clone)]
pub struct AppContext {
    store: ContextStore,
    id: ContextId,
}

impl AppContext {
    pub(crate) fn new(store: ContextStore, id: ContextId) -> Self {
        Self { store, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handle of the composite-app root.
    pub fn root(&self) -> Handle {
        ContextStore::root(&self.id)
    }

    // ── Composite app ──────────────────────────────────────────────

    /// Create the root node. A context has exactly one.
    pub fn create_composite_app(&self) -> ContextResult<Handle> {
        let root = self.root();
        self.store.put(&root, &Value::String(self.id.clone()), true)?;
        debug!(context_id = %self.id, "composite app created");
        Ok(root)
    }

    pub fn add_composite_app_meta(&self, meta: &CompositeAppMeta) -> ContextResult<()> {
        self.store.put(&self.root().child(LEVEL_META), &to_value(meta)?, false)
    }

    pub fn composite_app_meta(&self) -> ContextResult<CompositeAppMeta> {
        self.value_as(&self.root().child(LEVEL_META))
    }

    /// Delete the whole tree. Returns the number of nodes removed; zero if
    /// the context was already gone.
    pub fn delete_composite_app(&self) -> ContextResult<usize> {
        let removed = self.store.delete_prefix(self.root().as_str())?;
        debug!(context_id = %self.id, removed, "composite app deleted");
        Ok(removed)
    }

    /// Every node of the tree with its value, in path order.
    pub fn dump(&self) -> ContextResult<Vec<(String, Value)>> {
        self.store.scan(self.root().as_str())
    }

    /// Handles of every node at or below `handle`, in path order.
    pub fn all_handles(&self, handle: &Handle) -> ContextResult<Vec<Handle>> {
        Ok(self
            .store
            .scan(handle.as_str())?
            .into_iter()
            .map(|(path, _)| Handle::new(path))
            .collect())
    }

    // ── Apps ───────────────────────────────────────────────────────

    pub fn add_app(&self, root: &Handle, name: &str) -> ContextResult<Handle> {
        validate_name(name)?;
        let handle = root.named_child(LEVEL_APP, name);
        self.store.put(&handle, &Value::String(name.to_string()), true)?;
        Ok(handle)
    }

    pub fn app_handle(&self, app: &str) -> ContextResult<Handle> {
        self.existing(self.root().named_child(LEVEL_APP, app))
    }

    /// Names of every app node, in key order.
    pub fn app_names(&self) -> ContextResult<Vec<String>> {
        self.child_names(&self.root(), LEVEL_APP)
    }

    // ── Clusters ───────────────────────────────────────────────────

    /// Add a cluster (`provider+cluster`) under an app.
    pub fn add_cluster(&self, app: &Handle, name: &str) -> ContextResult<Handle> {
        validate_name(name)?;
        let handle = app.named_child(LEVEL_CLUSTER, name);
        self.store.put(&handle, &Value::String(name.to_string()), true)?;
        Ok(handle)
    }

    /// Tag a cluster as a member of an optional group.
    pub fn add_cluster_group(&self, cluster: &Handle, group: &str) -> ContextResult<Handle> {
        let handle = cluster.child(LEVEL_GROUP);
        self.store.put(&handle, &Value::String(group.to_string()), false)?;
        Ok(handle)
    }

    pub fn cluster_handle(&self, app: &str, cluster: &str) -> ContextResult<Handle> {
        let app = self.app_handle(app)?;
        self.existing(app.named_child(LEVEL_CLUSTER, cluster))
    }

    /// Clusters of an app, in key order.
    pub fn cluster_names(&self, app: &str) -> ContextResult<Vec<String>> {
        let app = self.app_handle(app)?;
        self.child_names(&app, LEVEL_CLUSTER)
    }

    /// Optional group number → member clusters, for one app. Clusters
    /// without a group tag (mandatory placements) are not included.
    pub fn cluster_group_map(&self, app: &str) -> ContextResult<BTreeMap<String, Vec<String>>> {
        let app_handle = self.app_handle(app)?;
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for cluster in self.child_names(&app_handle, LEVEL_CLUSTER)? {
            let tag = app_handle.named_child(LEVEL_CLUSTER, &cluster).child(LEVEL_GROUP);
            if let Some(Value::String(group)) = self.store.get(&tag)? {
                groups.entry(group).or_default().push(cluster);
            }
        }
        Ok(groups)
    }

    /// Remove a cluster and everything under it.
    pub fn delete_cluster(&self, cluster: &Handle) -> ContextResult<()> {
        let removed = self.store.delete_prefix(cluster.as_str())?;
        debug!(context_id = %self.id, %cluster, removed, "cluster deleted");
        Ok(())
    }

    // ── Resources ──────────────────────────────────────────────────

    /// Add a resource under a cluster. Names are unique per cluster.
    pub fn add_resource(&self, cluster: &Handle, name: &str, content: &str) -> ContextResult<Handle> {
        validate_name(name)?;
        let handle = cluster.named_child(LEVEL_RESOURCE, name);
        self.store.put(&handle, &Value::String(content.to_string()), true)?;
        Ok(handle)
    }

    pub fn resource_handle(&self, app: &str, cluster: &str, resource: &str) -> ContextResult<Handle> {
        let cluster = self.cluster_handle(app, cluster)?;
        self.existing(cluster.named_child(LEVEL_RESOURCE, resource))
    }

    /// Resources of one cluster of an app, in key order.
    pub fn resource_names(&self, app: &str, cluster: &str) -> ContextResult<Vec<String>> {
        let cluster = self.cluster_handle(app, cluster)?;
        self.child_names(&cluster, LEVEL_RESOURCE)
    }

    /// Manifest content of a resource.
    pub fn resource_content(&self, handle: &Handle) -> ContextResult<String> {
        self.value_as(handle)
    }

    // ── Instructions ───────────────────────────────────────────────

    pub fn add_instruction<T: Serialize + ?Sized>(
        &self,
        handle: &Handle,
        level: InstructionLevel,
        kind: InstructionType,
        payload: &T,
    ) -> ContextResult<Handle> {
        let instruction = Self::instruction_handle(handle, level, kind);
        self.store.put(&instruction, &to_value(payload)?, false)?;
        Ok(instruction)
    }

    /// Composite-level app instruction (`order` or `dependency`).
    pub fn app_instruction(&self, kind: InstructionType) -> ContextResult<Value> {
        self.value(&Self::instruction_handle(&self.root(), InstructionLevel::App, kind))
    }

    /// Instruction attached to one app node.
    pub fn app_level_instruction(&self, app: &str, kind: InstructionType) -> ContextResult<Value> {
        let app = self.app_handle(app)?;
        self.value(&Self::instruction_handle(&app, InstructionLevel::App, kind))
    }

    /// Resource instruction of one cluster of an app.
    pub fn resource_instruction(
        &self,
        app: &str,
        cluster: &str,
        kind: InstructionType,
    ) -> ContextResult<Value> {
        let cluster = self.cluster_handle(app, cluster)?;
        self.value(&Self::instruction_handle(&cluster, InstructionLevel::Resource, kind))
    }

    fn instruction_handle(handle: &Handle, level: InstructionLevel, kind: InstructionType) -> Handle {
        handle
            .child(LEVEL_INSTRUCTION)
            .child(level.as_str())
            .child(kind.as_str())
    }

    // ── Generic levels ─────────────────────────────────────────────

    /// Store a value one level below `handle`.
    pub fn add_level_value<T: Serialize + ?Sized>(
        &self,
        handle: &Handle,
        level: &str,
        value: &T,
    ) -> ContextResult<Handle> {
        validate_name(level)?;
        let child = handle.child(level);
        self.store.put(&child, &to_value(value)?, false)?;
        Ok(child)
    }

    pub fn level_handle(&self, handle: &Handle, level: &str) -> ContextResult<Handle> {
        self.existing(handle.child(level))
    }

    pub fn value(&self, handle: &Handle) -> ContextResult<Value> {
        self.store
            .get(handle)?
            .ok_or_else(|| ContextError::NotFound(handle.to_string()))
    }

    pub fn value_as<T: DeserializeOwned>(&self, handle: &Handle) -> ContextResult<T> {
        serde_json::from_value(self.value(handle)?)
            .map_err(|e| ContextError::Deserialize(e.to_string()))
    }

    /// Overwrite the value of an existing node.
    pub fn update_value<T: Serialize + ?Sized>(&self, handle: &Handle, value: &T) -> ContextResult<()> {
        self.store.replace(handle, &to_value(value)?)
    }

    // ── Run-time markers ───────────────────────────────────────────

    pub fn set_status(&self, status: ContextStatus) -> ContextResult<()> {
        self.store
            .put(&self.root().child(LEVEL_STATUS), &to_value(&status)?, false)
    }

    pub fn status(&self) -> ContextResult<Option<ContextStatus>> {
        match self.store.get(&self.root().child(LEVEL_STATUS))? {
            Some(value) => Ok(Some(
                serde_json::from_value(value).map_err(|e| ContextError::Deserialize(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Ask the synchronization service to stop working on this context.
    pub fn set_stop_flag(&self, stop: bool) -> ContextResult<()> {
        self.store
            .put(&self.root().child(LEVEL_STOP_FLAG), &Value::Bool(stop), false)
    }

    pub fn stop_flag(&self) -> ContextResult<bool> {
        Ok(matches!(
            self.store.get(&self.root().child(LEVEL_STOP_FLAG))?,
            Some(Value::Bool(true))
        ))
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn existing(&self, handle: Handle) -> ContextResult<Handle> {
        match self.store.get(&handle)? {
            Some(_) => Ok(handle),
            None => Err(ContextError::NotFound(handle.to_string())),
        }
    }

    /// Distinct names directly below `{parent}{level}/`.
    fn child_names(&self, parent: &Handle, level: &str) -> ContextResult<Vec<String>> {
        let prefix = parent.child(level);
        let mut names: Vec<String> = Vec::new();
        for (path, _) in self.store.scan(prefix.as_str())? {
            let rest = &path[prefix.as_str().len()..];
            let Some((name, _)) = rest.split_once('/') else {
                continue;
            };
            // Paths sharing a prefix are contiguous in key order.
            if names.last().map(String::as_str) != Some(name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (AppContext, Handle) {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = store.init().unwrap();
        let root = ctx.create_composite_app().unwrap();
        (ctx, root)
    }

    #[test]
    fn root_created_once() {
        let (ctx, _) = context();
        assert!(matches!(
            ctx.create_composite_app(),
            Err(ContextError::AlreadyExists(_))
        ));
    }

    #[test]
    fn meta_round_trip() {
        let (ctx, _) = context();
        let meta = CompositeAppMeta {
            project: "proj".into(),
            composite_app: "shop".into(),
            version: "v1".into(),
            release: "r1".into(),
            deployment_intent_group: "dig".into(),
            namespace: "default".into(),
            logical_cloud: "lc".into(),
            level: "0".into(),
        };
        ctx.add_composite_app_meta(&meta).unwrap();
        assert_eq!(ctx.composite_app_meta().unwrap(), meta);
    }

    #[test]
    fn resource_round_trip() {
        let (ctx, root) = context();
        let app = ctx.add_app(&root, "web").unwrap();
        let cluster = ctx.add_cluster(&app, "p1+c1").unwrap();
        ctx.add_resource(&cluster, "web+Deployment", "kind: Deployment").unwrap();
        ctx.add_resource(&cluster, "web+Service", "kind: Service").unwrap();

        let handle = ctx.resource_handle("web", "p1+c1", "web+Service").unwrap();
        assert_eq!(ctx.resource_content(&handle).unwrap(), "kind: Service");
        assert_eq!(
            ctx.resource_names("web", "p1+c1").unwrap(),
            vec!["web+Deployment", "web+Service"]
        );
    }

    #[test]
    fn duplicate_resource_rejected() {
        let (ctx, root) = context();
        let app = ctx.add_app(&root, "web").unwrap();
        let cluster = ctx.add_cluster(&app, "p1+c1").unwrap();
        ctx.add_resource(&cluster, "r", "a").unwrap();
        assert!(matches!(
            ctx.add_resource(&cluster, "r", "b"),
            Err(ContextError::AlreadyExists(_))
        ));
        // Same name under another cluster is fine.
        let other = ctx.add_cluster(&app, "p1+c2").unwrap();
        ctx.add_resource(&other, "r", "b").unwrap();
    }

    #[test]
    fn names_with_slash_rejected() {
        let (ctx, root) = context();
        assert!(matches!(ctx.add_app(&root, "a/b"), Err(ContextError::InvalidName(_))));
        assert!(matches!(ctx.add_app(&root, ""), Err(ContextError::InvalidName(_))));
    }

    #[test]
    fn lookups_of_missing_nodes_fail() {
        let (ctx, root) = context();
        assert!(matches!(ctx.app_handle("web"), Err(ContextError::NotFound(_))));
        ctx.add_app(&root, "web").unwrap();
        assert!(matches!(
            ctx.cluster_handle("web", "p1+c1"),
            Err(ContextError::NotFound(_))
        ));
    }

    #[test]
    fn cluster_names_are_direct_children_only() {
        let (ctx, root) = context();
        let app = ctx.add_app(&root, "web").unwrap();
        let c1 = ctx.add_cluster(&app, "p1+c1").unwrap();
        ctx.add_cluster(&app, "p1+c10").unwrap();
        ctx.add_cluster_group(&c1, "2").unwrap();
        ctx.add_resource(&c1, "r+Pod", "x").unwrap();
        ctx.add_instruction(&c1, InstructionLevel::Resource, InstructionType::Order, &ResourceOrder {
            resources: vec!["r+Pod".into()],
        })
        .unwrap();

        assert_eq!(ctx.cluster_names("web").unwrap(), vec!["p1+c1", "p1+c10"]);
    }

    #[test]
    fn group_map_covers_tagged_clusters() {
        let (ctx, root) = context();
        let app = ctx.add_app(&root, "web").unwrap();
        ctx.add_cluster(&app, "p1+m").unwrap();
        let a = ctx.add_cluster(&app, "p1+a").unwrap();
        let b = ctx.add_cluster(&app, "p1+b").unwrap();
        let c = ctx.add_cluster(&app, "p2+c").unwrap();
        ctx.add_cluster_group(&a, "2").unwrap();
        ctx.add_cluster_group(&b, "2").unwrap();
        ctx.add_cluster_group(&c, "3").unwrap();

        let groups = ctx.cluster_group_map("web").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["2"], vec!["p1+a", "p1+b"]);
        assert_eq!(groups["3"], vec!["p2+c"]);
    }

    #[test]
    fn delete_cluster_removes_subtree() {
        let (ctx, root) = context();
        let app = ctx.add_app(&root, "web").unwrap();
        let c1 = ctx.add_cluster(&app, "p1+c1").unwrap();
        ctx.add_resource(&c1, "r", "x").unwrap();
        ctx.add_cluster(&app, "p1+c2").unwrap();

        ctx.delete_cluster(&c1).unwrap();
        assert_eq!(ctx.cluster_names("web").unwrap(), vec!["p1+c2"]);
        assert!(ctx.resource_handle("web", "p1+c1", "r").is_err());
    }

    #[test]
    fn instructions_round_trip() {
        let (ctx, root) = context();
        let app = ctx.add_app(&root, "web").unwrap();
        ctx.add_instruction(&root, InstructionLevel::App, InstructionType::Order, &AppOrder {
            apps: vec!["web".into()],
        })
        .unwrap();
        ctx.add_instruction(
            &app,
            InstructionLevel::App,
            InstructionType::Dependency,
            &serde_json::json!({"db": "Ready"}),
        )
        .unwrap();

        let order: AppOrder =
            serde_json::from_value(ctx.app_instruction(InstructionType::Order).unwrap()).unwrap();
        assert_eq!(order.apps, vec!["web"]);
        assert_eq!(
            ctx.app_level_instruction("web", InstructionType::Dependency).unwrap()["db"],
            "Ready"
        );
        // The instruction node does not show up as an app.
        assert_eq!(ctx.app_names().unwrap(), vec!["web"]);
    }

    #[test]
    fn instruction_kinds_parse_strictly() {
        assert_eq!("order".parse::<InstructionType>().unwrap(), InstructionType::Order);
        assert_eq!("resource".parse::<InstructionLevel>().unwrap(), InstructionLevel::Resource);
        assert!(matches!(
            "subresource".parse::<InstructionLevel>(),
            Err(ContextError::InvalidInstruction(_))
        ));
        assert!("priority".parse::<InstructionType>().is_err());
    }

    #[test]
    fn update_value_requires_existing_node() {
        let (ctx, root) = context();
        let app = ctx.add_app(&root, "web").unwrap();
        let cluster = ctx.add_cluster(&app, "p1+c1").unwrap();
        let res = ctx.add_resource(&cluster, "r", "old").unwrap();
        ctx.update_value(&res, "new").unwrap();
        assert_eq!(ctx.resource_content(&res).unwrap(), "new");

        let missing = cluster.named_child("resource", "nope");
        assert!(matches!(ctx.update_value(&missing, "x"), Err(ContextError::NotFound(_))));
    }

    #[test]
    fn level_values_and_markers() {
        let (ctx, root) = context();
        let handle = ctx.add_level_value(&root, "owner", "ops").unwrap();
        assert_eq!(ctx.level_handle(&root, "owner").unwrap(), handle);
        assert_eq!(ctx.value(&handle).unwrap(), "ops");

        assert_eq!(ctx.status().unwrap(), None);
        ctx.set_status(ContextStatus::Instantiating).unwrap();
        assert_eq!(ctx.status().unwrap(), Some(ContextStatus::Instantiating));

        assert!(!ctx.stop_flag().unwrap());
        ctx.set_stop_flag(true).unwrap();
        assert!(ctx.stop_flag().unwrap());
    }

    #[test]
    fn delete_composite_app_removes_everything() {
        let (ctx, root) = context();
        let app = ctx.add_app(&root, "web").unwrap();
        let cluster = ctx.add_cluster(&app, "p1+c1").unwrap();
        ctx.add_resource(&cluster, "r", "x").unwrap();

        assert_eq!(ctx.delete_composite_app().unwrap(), 4);
        assert!(ctx.dump().unwrap().is_empty());
        // A second delete is harmless.
        assert_eq!(ctx.delete_composite_app().unwrap(), 0);
    }

    #[test]
    fn all_handles_lists_subtree() {
        let (ctx, root) = context();
        let app = ctx.add_app(&root, "web").unwrap();
        let cluster = ctx.add_cluster(&app, "p1+c1").unwrap();
        let resource = ctx.add_resource(&cluster, "r", "x").unwrap();
        ctx.add_app(&root, "db").unwrap();

        assert_eq!(ctx.all_handles(&app).unwrap(), vec![app.clone(), cluster, resource]);
        assert_eq!(ctx.all_handles(&root).unwrap().len(), 5);
    }
}
