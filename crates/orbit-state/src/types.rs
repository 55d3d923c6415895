//! Domain records read by the orchestrator.
//!
//! These are stored as JSON under the `data` tag of their collection and
//! use the camelCase field names of the public API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Group intent entry naming the generic placement intent. Not a controller.
pub const GENERIC_PLACEMENT_INTENT: &str = "genericPlacementIntent";

/// Resource kind whose manifests must be installed before the rest.
pub const CRD_KIND: &str = "CustomResourceDefinition";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Metadata {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
        }
    }
}

// ── Controllers ───────────────────────────────────────────────────

/// Class of a registered controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControllerType {
    Placement,
    Action,
    /// Anything else; kept in the registry but never scheduled.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Controller {
    pub metadata: Metadata,
    pub spec: ControllerSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerSpec {
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub kind: ControllerType,
    /// Lower values are served first.
    pub priority: u32,
}

impl Controller {
    pub fn new(name: &str, host: &str, port: u16, kind: ControllerType, priority: u32) -> Self {
        Self {
            metadata: Metadata::named(name),
            spec: ControllerSpec {
                host: host.to_string(),
                port,
                kind,
                priority,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// `host:port` endpoint of the controller.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.spec.host, self.spec.port)
    }
}

// ── Clusters ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub metadata: Metadata,
    pub cluster_provider: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Cluster {
    pub fn new(provider: &str, name: &str, labels: &[&str]) -> Self {
        Self {
            metadata: Metadata::named(name),
            cluster_provider: provider.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

// ── Apps ──────────────────────────────────────────────────────────

/// One app of a composite app with its already-rendered manifests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: AppSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppSpec {
    #[serde(default)]
    pub resources: Vec<ResourceManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceManifest {
    pub name: String,
    pub kind: String,
    pub content: String,
}

impl App {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

impl ResourceManifest {
    pub fn new(name: &str, kind: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            content: content.to_string(),
        }
    }

    /// Name of the resource node in a deployment context: `name+kind`.
    pub fn qualified_name(&self) -> String {
        format!("{}+{}", self.name, self.kind)
    }

    pub fn is_crd(&self) -> bool {
        self.kind == CRD_KIND
    }
}

// ── App dependencies ──────────────────────────────────────────────

/// Condition the depended-on app must reach before the dependent starts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum OpStatus {
    #[default]
    Ready,
    Deployed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppDependency {
    pub metadata: Metadata,
    pub spec: DependencySpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DependencySpec {
    /// The app depended upon.
    pub app: String,
    #[serde(default)]
    pub op_status: OpStatus,
    /// Seconds to wait after the condition is met.
    #[serde(default)]
    pub wait: u64,
}

impl AppDependency {
    pub fn on(app: &str, op_status: OpStatus, wait: u64) -> Self {
        Self {
            metadata: Metadata::named(&format!("dep-{app}")),
            spec: DependencySpec {
                app: app.to_string(),
                op_status,
                wait,
            },
        }
    }
}

// ── Deployment intent groups ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentIntentGroup {
    pub metadata: Metadata,
    pub spec: DeploymentIntentGroupSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentIntentGroupSpec {
    #[serde(default)]
    pub profile: String,
    /// Release name of this deployment.
    pub version: String,
    #[serde(default)]
    pub logical_cloud: String,
    #[serde(default)]
    pub namespace: String,
}

// ── Intents ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenericPlacementIntent {
    pub metadata: Metadata,
}

/// Per-app placement expression stored under a generic placement intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppIntent {
    pub metadata: Metadata,
    pub spec: AppIntentSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppIntentSpec {
    pub app: String,
    pub intent: IntentStruc,
}

/// Boolean cluster-selection expression.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntentStruc {
    #[serde(rename = "allOf", default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<AllOf>,
    #[serde(rename = "anyOf", default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<AnyOf>,
}

/// Conjunctive entry: an explicit cluster, a cluster label, or a nested
/// list of alternatives.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AllOf {
    #[serde(rename = "clusterProvider", default, skip_serializing_if = "String::is_empty")]
    pub provider_name: String,
    #[serde(rename = "cluster", default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
    #[serde(rename = "clusterLabel", default, skip_serializing_if = "String::is_empty")]
    pub cluster_label_name: String,
    #[serde(rename = "anyOf", default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<AnyOf>,
}

/// Disjunctive entry: an explicit cluster or a cluster label.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnyOf {
    #[serde(rename = "clusterProvider", default, skip_serializing_if = "String::is_empty")]
    pub provider_name: String,
    #[serde(rename = "cluster", default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
    #[serde(rename = "clusterLabel", default, skip_serializing_if = "String::is_empty")]
    pub cluster_label_name: String,
}

/// What a single placement entry selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<'a> {
    Cluster { provider: &'a str, cluster: &'a str },
    Label { provider: &'a str, label: &'a str },
}

impl AnyOf {
    pub fn cluster(provider: &str, cluster: &str) -> Self {
        Self {
            provider_name: provider.to_string(),
            cluster_name: cluster.to_string(),
            ..Self::default()
        }
    }

    pub fn label(provider: &str, label: &str) -> Self {
        Self {
            provider_name: provider.to_string(),
            cluster_label_name: label.to_string(),
            ..Self::default()
        }
    }

    /// An explicit cluster name wins over a label when both are set.
    pub fn selector(&self) -> Selector<'_> {
        if self.cluster_name.is_empty() {
            Selector::Label {
                provider: &self.provider_name,
                label: &self.cluster_label_name,
            }
        } else {
            Selector::Cluster {
                provider: &self.provider_name,
                cluster: &self.cluster_name,
            }
        }
    }
}

impl AllOf {
    pub fn cluster(provider: &str, cluster: &str) -> Self {
        Self {
            provider_name: provider.to_string(),
            cluster_name: cluster.to_string(),
            ..Self::default()
        }
    }

    pub fn label(provider: &str, label: &str) -> Self {
        Self {
            provider_name: provider.to_string(),
            cluster_label_name: label.to_string(),
            ..Self::default()
        }
    }

    pub fn any_of(alternatives: Vec<AnyOf>) -> Self {
        Self {
            any_of: alternatives,
            ..Self::default()
        }
    }

    /// The nested alternatives, when this entry is an `anyOf` list.
    pub fn alternatives(&self) -> Option<&[AnyOf]> {
        (!self.any_of.is_empty()).then_some(self.any_of.as_slice())
    }

    pub fn selector(&self) -> Selector<'_> {
        if self.cluster_name.is_empty() {
            Selector::Label {
                provider: &self.provider_name,
                label: &self.cluster_label_name,
            }
        } else {
            Selector::Cluster {
                provider: &self.provider_name,
                cluster: &self.cluster_name,
            }
        }
    }
}

/// Controller name → controller-specific intent name for one group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupIntent {
    pub metadata: Metadata,
    pub spec: GroupIntentSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupIntentSpec {
    #[serde(default)]
    pub intent: BTreeMap<String, String>,
}
