//! Placement resolver — evaluates an `IntentStruc` against the catalog.

use std::collections::HashSet;

use tracing::{debug, warn};

use orbit_state::{AnyOf, IntentStruc, Selector, StateStore};

use crate::error::{PlacementError, PlacementResult};
use crate::types::{CLUSTER_SEPARATOR, ClusterGroup, ClusterList, ClusterRef};

/// Source of cluster-label memberships.
pub trait ClusterCatalog {
    /// Names of the provider's clusters carrying `label`.
    fn label_members(&self, provider: &str, label: &str) -> PlacementResult<Vec<String>>;
}

impl ClusterCatalog for StateStore {
    fn label_members(&self, provider: &str, label: &str) -> PlacementResult<Vec<String>> {
        Ok(self.clusters_with_label(provider, label)?)
    }
}

/// Resolve a placement expression into mandatory and optional groups.
///
/// Group numbers are assigned from 1 in output order. A cluster is placed
/// at most once. An optional group that already contains a cluster certain
/// to be deployed (a mandatory one, or the first of an earlier optional
/// group) is satisfied and dropped; otherwise clusters claimed by earlier
/// groups are left out of it. Fails with `Unresolved` when nothing at all
/// was selected.
pub fn resolve(intent: &IntentStruc, catalog: &impl ClusterCatalog) -> PlacementResult<ClusterList> {
    let mut resolution = Resolution::default();

    let mut mandatory = Vec::new();
    for entry in intent.all_of.iter().filter(|entry| entry.alternatives().is_none()) {
        mandatory.extend(expand(entry.selector(), catalog)?);
    }
    if let Some(group) = resolution.mandatory(mandatory) {
        resolution.list.mandatory_clusters.push(group);
    }

    for alternatives in intent.all_of.iter().filter_map(|entry| entry.alternatives()) {
        let clusters = expand_all(alternatives, catalog)?;
        if let Some(group) = resolution.optional(clusters) {
            resolution.list.optional_clusters.push(group);
        }
    }

    if !intent.any_of.is_empty() {
        let clusters = expand_all(&intent.any_of, catalog)?;
        if let Some(group) = resolution.optional(clusters) {
            resolution.list.optional_clusters.push(group);
        }
    }

    if resolution.list.is_empty() {
        return Err(PlacementError::Unresolved);
    }
    debug!(
        mandatory = resolution.list.mandatory_clusters.len(),
        optional = resolution.list.optional_clusters.len(),
        "placement resolved"
    );
    Ok(resolution.list)
}

#[derive(Default)]
struct Resolution {
    list: ClusterList,
    /// Clusters present in any group.
    placed: HashSet<ClusterRef>,
    /// Clusters that survive pruning.
    kept: HashSet<ClusterRef>,
    groups: u32,
}

impl Resolution {
    fn mandatory(&mut self, clusters: Vec<ClusterRef>) -> Option<ClusterGroup> {
        let clusters = self.unplaced(clusters);
        self.kept.extend(clusters.iter().cloned());
        self.number(clusters)
    }

    fn optional(&mut self, clusters: Vec<ClusterRef>) -> Option<ClusterGroup> {
        if let Some(cluster) = clusters.iter().find(|cluster| self.kept.contains(*cluster)) {
            debug!(cluster = %cluster.qualified(), "optional group already satisfied");
            return None;
        }
        let clusters = self.unplaced(clusters);
        if let Some(first) = clusters.first() {
            self.kept.insert(first.clone());
        }
        self.number(clusters)
    }

    fn unplaced(&mut self, clusters: Vec<ClusterRef>) -> Vec<ClusterRef> {
        clusters
            .into_iter()
            .filter(|cluster| self.placed.insert(cluster.clone()))
            .collect()
    }

    /// Number a new group, unless it is empty.
    fn number(&mut self, clusters: Vec<ClusterRef>) -> Option<ClusterGroup> {
        if clusters.is_empty() {
            return None;
        }
        self.groups += 1;
        Some(ClusterGroup {
            group_number: self.groups.to_string(),
            clusters,
        })
    }
}

fn expand_all(entries: &[AnyOf], catalog: &impl ClusterCatalog) -> PlacementResult<Vec<ClusterRef>> {
    let mut clusters = Vec::new();
    for entry in entries {
        clusters.extend(expand(entry.selector(), catalog)?);
    }
    Ok(clusters)
}

fn expand(selector: Selector<'_>, catalog: &impl ClusterCatalog) -> PlacementResult<Vec<ClusterRef>> {
    match selector {
        Selector::Cluster { provider, cluster } => {
            validate("provider", provider)?;
            validate("cluster", cluster)?;
            Ok(vec![ClusterRef::new(provider, cluster)])
        }
        Selector::Label { provider, label } => {
            validate("provider", provider)?;
            validate("cluster label", label)?;
            let members = catalog.label_members(provider, label)?;
            if members.is_empty() {
                warn!(%provider, %label, "cluster label matches no clusters");
            }
            members
                .iter()
                .map(|cluster| -> PlacementResult<ClusterRef> {
                    validate("cluster", cluster)?;
                    Ok(ClusterRef::new(provider, cluster))
                })
                .collect()
        }
    }
}

/// Names end up as `provider+cluster` path segments.
fn validate(what: &str, name: &str) -> PlacementResult<()> {
    if name.is_empty() {
        return Err(PlacementError::MalformedName(format!("empty {what} name")));
    }
    if name.contains(CLUSTER_SEPARATOR) || name.contains('/') {
        return Err(PlacementError::MalformedName(format!(
            "{what} name {name:?} contains '{CLUSTER_SEPARATOR}' or '/'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use orbit_state::{AllOf, Cluster};

    use super::*;

    #[derive(Default)]
    struct FakeCatalog {
        labels: HashMap<(String, String), Vec<String>>,
    }

    impl FakeCatalog {
        fn with(mut self, provider: &str, label: &str, clusters: &[&str]) -> Self {
            self.labels.insert(
                (provider.to_string(), label.to_string()),
                clusters.iter().map(|c| c.to_string()).collect(),
            );
            self
        }
    }

    impl ClusterCatalog for FakeCatalog {
        fn label_members(&self, provider: &str, label: &str) -> PlacementResult<Vec<String>> {
            Ok(self
                .labels
                .get(&(provider.to_string(), label.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn names(group: &ClusterGroup) -> Vec<String> {
        group.clusters.iter().map(ClusterRef::qualified).collect()
    }

    #[test]
    fn all_of_forms_one_mandatory_union() {
        let catalog = FakeCatalog::default().with("p1", "edge", &["c2", "c3"]);
        let intent = IntentStruc {
            all_of: vec![
                AllOf::cluster("p1", "c1"),
                AllOf::label("p1", "edge"),
                AllOf::cluster("p1", "c2"),
            ],
            any_of: vec![],
        };

        let list = resolve(&intent, &catalog).unwrap();
        assert_eq!(list.mandatory_clusters.len(), 1);
        assert!(list.optional_clusters.is_empty());
        assert_eq!(list.mandatory_clusters[0].group_number, "1");
        assert_eq!(names(&list.mandatory_clusters[0]), vec!["p1+c1", "p1+c2", "p1+c3"]);
    }

    #[test]
    fn any_of_forms_one_shared_optional_group() {
        let catalog = FakeCatalog::default().with("p2", "gpu", &["g1", "g2"]);
        let intent = IntentStruc {
            all_of: vec![],
            any_of: vec![
                AnyOf::cluster("p1", "c1"),
                AnyOf::cluster("p1", "c2"),
                AnyOf::label("p2", "gpu"),
            ],
        };

        let list = resolve(&intent, &catalog).unwrap();
        assert!(list.mandatory_clusters.is_empty());
        assert_eq!(list.optional_clusters.len(), 1);
        assert_eq!(list.optional_clusters[0].group_number, "1");
        assert_eq!(
            names(&list.optional_clusters[0]),
            vec!["p1+c1", "p1+c2", "p2+g1", "p2+g2"]
        );
    }

    #[test]
    fn nested_any_of_gets_its_own_group() {
        let catalog = FakeCatalog::default();
        let intent = IntentStruc {
            all_of: vec![
                AllOf::cluster("p1", "m1"),
                AllOf::any_of(vec![AnyOf::cluster("p1", "a1"), AnyOf::cluster("p1", "a2")]),
                AllOf::any_of(vec![AnyOf::cluster("p2", "b1")]),
            ],
            any_of: vec![AnyOf::cluster("p3", "x1"), AnyOf::cluster("p3", "x2")],
        };

        let list = resolve(&intent, &catalog).unwrap();
        assert_eq!(names(&list.mandatory_clusters[0]), vec!["p1+m1"]);
        let numbers: Vec<&str> = list
            .optional_clusters
            .iter()
            .map(|g| g.group_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["2", "3", "4"]);
        assert_eq!(names(&list.optional_clusters[0]), vec!["p1+a1", "p1+a2"]);
        assert_eq!(names(&list.optional_clusters[2]), vec!["p3+x1", "p3+x2"]);
    }

    #[test]
    fn any_of_met_by_mandatory_cluster_adds_nothing() {
        let catalog = FakeCatalog::default();
        let intent = IntentStruc {
            all_of: vec![AllOf::cluster("p1", "c1")],
            any_of: vec![AnyOf::cluster("p1", "c1"), AnyOf::cluster("p1", "c2")],
        };

        let list = resolve(&intent, &catalog).unwrap();
        assert!(list.optional_clusters.is_empty());
        let all: Vec<String> = list.all_clusters().map(ClusterRef::qualified).collect();
        assert_eq!(all, vec!["p1+c1"]);
    }

    #[test]
    fn cluster_placed_once() {
        let catalog = FakeCatalog::default();
        let intent = IntentStruc {
            all_of: vec![
                AllOf::cluster("p1", "c1"),
                AllOf::any_of(vec![AnyOf::cluster("p1", "c1")]),
                AllOf::any_of(vec![AnyOf::cluster("p1", "a1"), AnyOf::cluster("p1", "a2")]),
                AllOf::any_of(vec![AnyOf::cluster("p1", "a2"), AnyOf::cluster("p1", "a3")]),
                AllOf::any_of(vec![AnyOf::cluster("p1", "a1"), AnyOf::cluster("p1", "a4")]),
            ],
            any_of: vec![],
        };

        let list = resolve(&intent, &catalog).unwrap();
        // [c1] is met by the mandatory c1 and [a1, a4] by the kept a1; a2
        // already belongs to the first group.
        assert_eq!(list.optional_clusters.len(), 2);
        assert_eq!(list.optional_clusters[0].group_number, "2");
        assert_eq!(names(&list.optional_clusters[0]), vec!["p1+a1", "p1+a2"]);
        assert_eq!(list.optional_clusters[1].group_number, "3");
        assert_eq!(names(&list.optional_clusters[1]), vec!["p1+a3"]);
        assert_eq!(list.all_clusters().count(), 4);
    }

    #[test]
    fn empty_expression_is_unresolved() {
        let catalog = FakeCatalog::default();
        assert!(matches!(
            resolve(&IntentStruc::default(), &catalog),
            Err(PlacementError::Unresolved)
        ));

        let dangling = IntentStruc {
            all_of: vec![AllOf::label("p1", "nobody")],
            any_of: vec![],
        };
        assert!(matches!(resolve(&dangling, &catalog), Err(PlacementError::Unresolved)));
    }

    #[test]
    fn malformed_names_rejected() {
        let catalog = FakeCatalog::default();
        for intent in [
            IntentStruc {
                all_of: vec![AllOf::cluster("p1", "c+1")],
                any_of: vec![],
            },
            IntentStruc {
                all_of: vec![],
                any_of: vec![AnyOf::cluster("", "c1")],
            },
            IntentStruc {
                all_of: vec![AllOf::cluster("p/1", "c1")],
                any_of: vec![],
            },
            IntentStruc {
                all_of: vec![AllOf::label("p1", "")],
                any_of: vec![],
            },
        ] {
            assert!(matches!(
                resolve(&intent, &catalog),
                Err(PlacementError::MalformedName(_))
            ));
        }
    }

    #[test]
    fn state_store_is_a_catalog() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_cluster(&Cluster::new("p1", "c1", &["edge"])).unwrap();
        store.put_cluster(&Cluster::new("p1", "c2", &["core"])).unwrap();

        let intent: IntentStruc =
            serde_json::from_str(r#"{"anyOf":[{"clusterProvider":"p1","clusterLabel":"edge"}]}"#).unwrap();
        let list = resolve(&intent, &store).unwrap();
        assert_eq!(names(&list.optional_clusters[0]), vec!["p1+c1"]);
    }
}
