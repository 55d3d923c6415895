//! Placement results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, PlacementResult};

/// Separator between provider and cluster in a qualified cluster name.
pub const CLUSTER_SEPARATOR: char = '+';

/// A concrete cluster of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    pub provider_name: String,
    pub cluster_name: String,
}

impl ClusterRef {
    pub fn new(provider: &str, cluster: &str) -> Self {
        Self {
            provider_name: provider.to_string(),
            cluster_name: cluster.to_string(),
        }
    }

    /// `provider+cluster`, the cluster's name inside a deployment context.
    pub fn qualified(&self) -> String {
        format!("{}{CLUSTER_SEPARATOR}{}", self.provider_name, self.cluster_name)
    }

    /// Parse a `provider+cluster` name.
    pub fn parse(qualified: &str) -> PlacementResult<Self> {
        match qualified.split_once(CLUSTER_SEPARATOR) {
            Some((provider, cluster))
                if !provider.is_empty()
                    && !cluster.is_empty()
                    && !cluster.contains(CLUSTER_SEPARATOR) =>
            {
                Ok(Self::new(provider, cluster))
            }
            _ => Err(PlacementError::MalformedName(qualified.to_string())),
        }
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{CLUSTER_SEPARATOR}{}", self.provider_name, self.cluster_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGroup {
    pub group_number: String,
    pub clusters: Vec<ClusterRef>,
}

/// Where one app goes: every mandatory cluster, plus one pick per
/// optional group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterList {
    pub mandatory_clusters: Vec<ClusterGroup>,
    pub optional_clusters: Vec<ClusterGroup>,
}

impl ClusterList {
    pub fn is_empty(&self) -> bool {
        self.mandatory_clusters.iter().all(|g| g.clusters.is_empty())
            && self.optional_clusters.iter().all(|g| g.clusters.is_empty())
    }

    /// Every cluster, mandatory first, in resolution order.
    pub fn all_clusters(&self) -> impl Iterator<Item = &ClusterRef> {
        self.mandatory_clusters
            .iter()
            .chain(self.optional_clusters.iter())
            .flat_map(|group| group.clusters.iter())
    }
}
