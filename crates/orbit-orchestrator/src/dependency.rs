//! Inter-app dependency graph.
//!
//! One vertex per app, stored in an arena and addressed by index. Edges
//! point from an app to the apps it depends on. Cycle detection is an
//! iterative three-colour depth-first search started from every vertex,
//! so the verdict does not depend on where the search begins.

use std::collections::{BTreeMap, HashMap};

use orbit_state::{App, AppDependency};

use crate::error::DependencyError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn new<'a>(apps: impl IntoIterator<Item = &'a str>) -> Self {
        let mut graph = Self::default();
        for app in apps {
            if graph.index.contains_key(app) {
                continue;
            }
            graph.index.insert(app.to_string(), graph.names.len());
            graph.names.push(app.to_string());
            graph.edges.push(Vec::new());
        }
        graph
    }

    /// Record that `app` depends on `dependency`. Both must be vertices.
    pub fn add_dependency(&mut self, app: &str, dependency: &str) -> Result<(), DependencyError> {
        let unknown = || DependencyError::UnknownDependency {
            app: app.to_string(),
            dependency: dependency.to_string(),
        };
        let from = *self.index.get(app).ok_or_else(unknown)?;
        let to = *self.index.get(dependency).ok_or_else(unknown)?;
        self.edges[from].push(to);
        Ok(())
    }

    /// A cycle as a closed path of app names (first == last), if any.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut colour = vec![Colour::White; self.names.len()];

        for start in 0..self.names.len() {
            if colour[start] != Colour::White {
                continue;
            }
            // (vertex, next edge to explore)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            colour[start] = Colour::Grey;

            while let Some(top) = stack.last_mut() {
                let vertex = top.0;
                let Some(&target) = self.edges[vertex].get(top.1) else {
                    colour[vertex] = Colour::Black;
                    stack.pop();
                    continue;
                };
                top.1 += 1;
                match colour[target] {
                    Colour::White => {
                        colour[target] = Colour::Grey;
                        stack.push((target, 0));
                    }
                    Colour::Grey => {
                        let from = stack.iter().position(|&(v, _)| v == target).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[from..].iter().map(|&(v, _)| self.names[v].clone()).collect();
                        cycle.push(self.names[target].clone());
                        return Some(cycle);
                    }
                    Colour::Black => {}
                }
            }
        }
        None
    }
}

/// Build the graph of a composite app and fail on unknown or cyclic
/// dependencies.
pub fn check_dependencies(
    apps: &[App],
    dependencies: &BTreeMap<String, Vec<AppDependency>>,
) -> Result<(), DependencyError> {
    let mut graph = DependencyGraph::new(apps.iter().map(App::name));
    for app in apps {
        for dependency in dependencies.get(app.name()).into_iter().flatten() {
            graph.add_dependency(app.name(), &dependency.spec.app)?;
        }
    }
    match graph.find_cycle() {
        Some(cycle) => Err(DependencyError::CyclicDependency(cycle)),
        None => Ok(()),
    }
}
