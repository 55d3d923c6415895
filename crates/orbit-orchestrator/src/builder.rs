//! Context builder — materializes resolved placements into a deployment
//! context.
//!
//! ```text
//! root ── meta
//!   ├── instruction/app/order        {"apporder": [apps in declared order]}
//!   ├── instruction/app/dependency   {app: [predecessors]}
//!   └── app/{app}
//!         ├── instruction/app/dependency   [{app, opStatus, wait}]
//!         └── cluster/{provider+cluster}   (+ group/ for optional groups)
//!               ├── instruction/resource/order        {"resorder": [...]}
//!               ├── instruction/resource/dependency   {"resdependency": {"crd-install": [...]}}
//!               └── resource/{name+kind}
//! ```
//!
//! The builder does not clean up after itself; the caller deletes the
//! context when `build` fails.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::debug;

use orbit_context::{AppContext, AppOrder, CompositeAppMeta, Handle, InstructionLevel, InstructionType, ResourceOrder};
use orbit_placement::{ClusterGroup, ClusterList};
use orbit_state::{App, AppDependency, DependencySpec};

use crate::error::{OrchestratorError, OrchestratorResult};

/// One app with everything needed to place it.
#[derive(Debug, Clone)]
pub struct AppPlacement {
    pub app: App,
    pub dependencies: Vec<AppDependency>,
    pub clusters: ClusterList,
}

impl AppPlacement {
    pub fn name(&self) -> &str {
        self.app.name()
    }
}

pub struct ContextBuilder<'a> {
    context: &'a AppContext,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(context: &'a AppContext) -> Self {
        Self { context }
    }

    pub fn build(&self, meta: &CompositeAppMeta, placements: &[AppPlacement]) -> OrchestratorResult<()> {
        let root = self.context.create_composite_app()?;
        self.context.add_composite_app_meta(meta)?;

        for placement in placements {
            self.add_app(&root, placement)?;
        }

        let order = AppOrder {
            apps: placements.iter().map(|p| p.name().to_string()).collect(),
        };
        self.context
            .add_instruction(&root, InstructionLevel::App, InstructionType::Order, &order)?;

        let dependencies: BTreeMap<&str, Vec<&str>> = placements
            .iter()
            .map(|p| {
                let predecessors = p.dependencies.iter().map(|d| d.spec.app.as_str()).collect();
                (p.name(), predecessors)
            })
            .collect();
        self.context.add_instruction(
            &root,
            InstructionLevel::App,
            InstructionType::Dependency,
            &dependencies,
        )?;

        debug!(context_id = %self.context.id(), apps = placements.len(), "context built");
        Ok(())
    }

    fn add_app(&self, root: &Handle, placement: &AppPlacement) -> OrchestratorResult<()> {
        let name = placement.name();
        let app = self.context.add_app(root, name)?;

        let specs: Vec<&DependencySpec> = placement.dependencies.iter().map(|d| &d.spec).collect();
        self.context
            .add_instruction(&app, InstructionLevel::App, InstructionType::Dependency, &specs)?;

        for group in &placement.clusters.mandatory_clusters {
            self.add_group(&app, placement, group, false)?;
        }
        for group in &placement.clusters.optional_clusters {
            self.add_group(&app, placement, group, true)?;
        }

        self.verify(placement)?;
        Ok(())
    }

    fn add_group(
        &self,
        app: &Handle,
        placement: &AppPlacement,
        group: &ClusterGroup,
        optional: bool,
    ) -> OrchestratorResult<()> {
        for cluster in &group.clusters {
            let cluster_name = cluster.qualified();
            let handle = self.context.add_cluster(app, &cluster_name)?;
            if optional {
                self.context.add_cluster_group(&handle, &group.group_number)?;
            }
            self.add_resources(&handle, placement)?;
            debug!(
                context_id = %self.context.id(),
                app = %placement.name(),
                cluster = %cluster_name,
                group = %group.group_number,
                optional,
                "cluster added"
            );
        }
        Ok(())
    }

    fn add_resources(&self, cluster: &Handle, placement: &AppPlacement) -> OrchestratorResult<()> {
        let resources = &placement.app.spec.resources;
        let mut order = Vec::with_capacity(resources.len());
        let mut crds = Vec::new();

        for resource in resources {
            let name = resource.qualified_name();
            self.context.add_resource(cluster, &name, &resource.content)?;
            if resource.is_crd() {
                crds.push(name.clone());
            }
            order.push(name);
        }

        self.context.add_instruction(
            cluster,
            InstructionLevel::Resource,
            InstructionType::Order,
            &ResourceOrder { resources: order },
        )?;
        self.context.add_instruction(
            cluster,
            InstructionLevel::Resource,
            InstructionType::Dependency,
            &json!({ "resdependency": { "crd-install": crds } }),
        )?;
        Ok(())
    }

    /// Read every resource of the app back by name.
    fn verify(&self, placement: &AppPlacement) -> OrchestratorResult<()> {
        let app = placement.name();
        for cluster in placement.clusters.all_clusters() {
            let cluster = cluster.qualified();
            for resource in &placement.app.spec.resources {
                let name = resource.qualified_name();
                let handle = self.context.resource_handle(app, &cluster, &name)?;
                if self.context.resource_content(&handle)? != resource.content {
                    return Err(OrchestratorError::Build(format!(
                        "resource {name} of app {app} on cluster {cluster} does not read back"
                    )));
                }
            }
        }
        Ok(())
    }
}
