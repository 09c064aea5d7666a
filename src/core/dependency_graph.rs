use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Marker parent of the top-level application package: the only package
/// with no further dependents.
pub const ROOT_SENTINEL: &str = "root-top-level";

/// One package's entry in the reversed dependency graph: who depends on it,
/// and which caller candidates have already been ruled in or out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageNode {
    /// Direct dependents, self included.
    pub parents: Vec<String>,
    /// Unit keys (`name@source_path`) of functions that must not be
    /// re-selected as fresh candidates for this package.
    pub exclusions: Vec<String>,
}

/// Reversed package-dependency graph: for each package, the set of packages
/// that depend on it. Built once from the raw edge list; the exclusion sets
/// are the only state mutated during search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: HashMap<String, PackageNode>,
    root_package: String,
}

impl DependencyGraph {
    /// Invert a `parent depends-on child` edge list. Each package gains a
    /// self-edge (a function may be called from within its own package) and
    /// the root package's only parent is the sentinel.
    pub fn from_edges(edges: &[(String, String)], root_package: &str) -> Self {
        let mut nodes: HashMap<String, PackageNode> = HashMap::new();
        for (parent, child) in edges {
            let parent = strip_version(parent);
            let child = strip_version(child);
            let node = nodes.entry(child.clone()).or_default();
            if !node.parents.contains(&parent) {
                node.parents.push(parent.clone());
            }
            nodes.entry(parent).or_default();
        }

        for (package, node) in nodes.iter_mut() {
            if !node.parents.contains(package) {
                node.parents.push(package.clone());
            }
        }

        let root_package = strip_version(root_package);
        nodes.insert(
            root_package.clone(),
            PackageNode {
                parents: vec![ROOT_SENTINEL.to_string()],
                exclusions: Vec::new(),
            },
        );

        Self { nodes, root_package }
    }

    /// Parse the raw `parent child` edge text an ecosystem tool emits. The
    /// root package is the parent of the first edge.
    pub fn parse_edge_list(text: &str) -> Option<(Vec<(String, String)>, String)> {
        let mut edges = Vec::new();
        let mut root = None;
        for line in text.lines() {
            let mut words = line.split_whitespace();
            let (Some(parent), Some(child)) = (words.next(), words.next()) else {
                continue;
            };
            if root.is_none() {
                root = Some(strip_version(parent));
            }
            edges.push((parent.to_string(), child.to_string()));
        }
        root.map(|root| (edges, root))
    }

    pub fn root_package(&self) -> &str {
        &self.root_package
    }

    pub fn contains(&self, package: &str) -> bool {
        self.nodes.contains_key(package)
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn parents_of(&self, package: &str) -> &[String] {
        self.nodes
            .get(package)
            .map(|node| node.parents.as_slice())
            .unwrap_or(&[])
    }

    /// Is this package the top-level application package?
    pub fn is_root(&self, package: &str) -> bool {
        self.parents_of(package)
            .iter()
            .any(|p| p == ROOT_SENTINEL)
    }

    pub fn record_exclusion(&mut self, package: &str, unit_key: &str) {
        let node = self.nodes.entry(package.to_string()).or_default();
        if !node.exclusions.iter().any(|k| k == unit_key) {
            node.exclusions.push(unit_key.to_string());
        }
    }

    pub fn excluded(&self, package: &str) -> &[String] {
        self.nodes
            .get(package)
            .map(|node| node.exclusions.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_excluded(&self, package: &str, unit_key: &str) -> bool {
        self.excluded(package).iter().any(|k| k == unit_key)
    }
}

/// Drop the `@version` suffix an ecosystem tool attaches to package names.
fn strip_version(package: &str) -> String {
    match package.find('@') {
        Some(idx) => package[..idx].to_string(),
        None => package.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn inverts_edges_and_appends_self() {
        let graph = DependencyGraph::from_edges(
            &edges(&[
                ("example.com/app", "github.com/acme/mid"),
                ("github.com/acme/mid@v1.2.0", "github.com/acme/leaf@v0.9.1"),
            ]),
            "example.com/app",
        );

        let leaf_parents = graph.parents_of("github.com/acme/leaf");
        assert!(leaf_parents.contains(&"github.com/acme/mid".to_string()));
        assert!(leaf_parents.contains(&"github.com/acme/leaf".to_string()));

        assert!(graph.is_root("example.com/app"));
        assert!(!graph.is_root("github.com/acme/mid"));
        assert_eq!(graph.parents_of("example.com/app"), [ROOT_SENTINEL.to_string()]);
    }

    #[test]
    fn parses_raw_edge_text() {
        let text = "example.com/app github.com/acme/mid@v1.2.0\nexample.com/app github.com/acme/leaf@v0.9.1\ngithub.com/acme/mid@v1.2.0 github.com/acme/leaf@v0.9.1\n";
        let (edges, root) = DependencyGraph::parse_edge_list(text).unwrap();
        assert_eq!(root, "example.com/app");
        assert_eq!(edges.len(), 3);

        let graph = DependencyGraph::from_edges(&edges, &root);
        assert_eq!(
            graph.parents_of("github.com/acme/leaf"),
            [
                "example.com/app".to_string(),
                "github.com/acme/mid".to_string(),
                "github.com/acme/leaf".to_string()
            ]
        );
    }

    #[test]
    fn exclusions_are_deduplicated_and_queryable() {
        let mut graph = DependencyGraph::from_edges(
            &edges(&[("example.com/app", "github.com/acme/leaf")]),
            "example.com/app",
        );
        graph.record_exclusion("github.com/acme/leaf", "DeadEnd@vendor/x/mid/a.go");
        graph.record_exclusion("github.com/acme/leaf", "DeadEnd@vendor/x/mid/a.go");

        assert_eq!(graph.excluded("github.com/acme/leaf").len(), 1);
        assert!(graph.is_excluded("github.com/acme/leaf", "DeadEnd@vendor/x/mid/a.go"));
        assert!(!graph.is_excluded("github.com/acme/leaf", "Other@vendor/x/mid/a.go"));
    }
}
