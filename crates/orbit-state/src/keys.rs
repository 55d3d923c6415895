//! Collection names, value tags, and structured document keys.
//!
//! Key fields serialize in camelCase. Leaving a field empty turns it into a
//! wildcard for `StateStore::find`, which is how listings are expressed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Collection names.
pub mod collections {
    pub const CONTROLLER: &str = "controller";
    pub const CLUSTER: &str = "cluster";
    pub const APP: &str = "app";
    pub const APP_DEPENDENCY: &str = "appDependency";
    pub const DEPLOYMENT_INTENT_GROUP: &str = "deploymentIntentGroup";
    pub const PLACEMENT_INTENT: &str = "genericPlacementIntent";
    pub const APP_INTENT: &str = "appIntent";
    pub const GROUP_INTENT: &str = "groupIntent";
}

/// Tag holding a record's definition.
pub const TAG_DATA: &str = "data";

/// Tag holding a deployment intent group's lifecycle trail.
pub const TAG_STATE: &str = "stateInfo";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerKey {
    pub controller: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterKey {
    pub cluster_provider: String,
    pub cluster: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppKey {
    pub app: String,
    pub project: String,
    pub composite_app: String,
    pub composite_app_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDependencyKey {
    pub app_dependency: String,
    pub app: String,
    pub project: String,
    pub composite_app: String,
    pub composite_app_version: String,
}

/// Identifies one deployment intent group, the lifecycle-bearing entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentIntentGroupKey {
    pub deployment_intent_group: String,
    pub project: String,
    pub composite_app: String,
    pub composite_app_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericPlacementIntentKey {
    pub generic_placement_intent: String,
    pub project: String,
    pub composite_app: String,
    pub composite_app_version: String,
    pub deployment_intent_group: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIntentKey {
    pub app_intent: String,
    pub generic_placement_intent: String,
    pub project: String,
    pub composite_app: String,
    pub composite_app_version: String,
    pub deployment_intent_group: String,
}

/// Query fields stored with an app intent so it can be found by app name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIntentQuery {
    pub app: String,
}

/// Lookup of an app intent by placement intent and app name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIntentByApp {
    pub generic_placement_intent: String,
    pub project: String,
    pub composite_app: String,
    pub composite_app_version: String,
    pub deployment_intent_group: String,
    pub app: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupIntentKey {
    pub group_intent: String,
    pub project: String,
    pub composite_app: String,
    pub composite_app_version: String,
    pub deployment_intent_group: String,
}

impl DeploymentIntentGroupKey {
    pub fn new(project: &str, composite_app: &str, version: &str, group: &str) -> Self {
        Self {
            deployment_intent_group: group.to_string(),
            project: project.to_string(),
            composite_app: composite_app.to_string(),
            composite_app_version: version.to_string(),
        }
    }

    /// Key of one app of the owning composite app. Empty `app` lists all.
    pub fn app(&self, app: &str) -> AppKey {
        AppKey {
            app: app.to_string(),
            project: self.project.clone(),
            composite_app: self.composite_app.clone(),
            composite_app_version: self.composite_app_version.clone(),
        }
    }

    /// Key of one dependency record of `app`. Empty `name` lists all.
    pub fn app_dependency(&self, app: &str, name: &str) -> AppDependencyKey {
        AppDependencyKey {
            app_dependency: name.to_string(),
            app: app.to_string(),
            project: self.project.clone(),
            composite_app: self.composite_app.clone(),
            composite_app_version: self.composite_app_version.clone(),
        }
    }

    pub fn placement_intent(&self, name: &str) -> GenericPlacementIntentKey {
        GenericPlacementIntentKey {
            generic_placement_intent: name.to_string(),
            project: self.project.clone(),
            composite_app: self.composite_app.clone(),
            composite_app_version: self.composite_app_version.clone(),
            deployment_intent_group: self.deployment_intent_group.clone(),
        }
    }

    pub fn app_intent(&self, placement_intent: &str, name: &str) -> AppIntentKey {
        AppIntentKey {
            app_intent: name.to_string(),
            generic_placement_intent: placement_intent.to_string(),
            project: self.project.clone(),
            composite_app: self.composite_app.clone(),
            composite_app_version: self.composite_app_version.clone(),
            deployment_intent_group: self.deployment_intent_group.clone(),
        }
    }

    pub fn app_intent_by_app(&self, placement_intent: &str, app: &str) -> AppIntentByApp {
        AppIntentByApp {
            generic_placement_intent: placement_intent.to_string(),
            project: self.project.clone(),
            composite_app: self.composite_app.clone(),
            composite_app_version: self.composite_app_version.clone(),
            deployment_intent_group: self.deployment_intent_group.clone(),
            app: app.to_string(),
        }
    }

    pub fn group_intent(&self, name: &str) -> GroupIntentKey {
        GroupIntentKey {
            group_intent: name.to_string(),
            project: self.project.clone(),
            composite_app: self.composite_app.clone(),
            composite_app_version: self.composite_app_version.clone(),
            deployment_intent_group: self.deployment_intent_group.clone(),
        }
    }
}

impl fmt::Display for DeploymentIntentGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.project, self.composite_app, self.composite_app_version, self.deployment_intent_group
        )
    }
}
