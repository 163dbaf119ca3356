//! Cycle detection over relation snapshots.
//!
//! Dependency and inheritance relations are both expected to be acyclic; a
//! loop in either cannot be resolved at load time. Detection reports every
//! cycle as a finding with its full path. Findings are warnings, not
//! failures: the graph already holds the offending edges, and the caller
//! decides how loudly to surface them.
//!
//! Detection is a standard three-color DFS, O(V+E). Each back edge yields
//! exactly one finding, so a simple loop A→B→C→A is reported once.

use std::collections::HashMap;
use std::fmt;

use super::RelationGraph;

/// One cycle found in a relation snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFinding {
    /// Relation family the cycle lives in ("dependency" or "inheritance").
    pub relation: &'static str,

    /// The ordered node identities forming the loop, with the entry node
    /// repeated at the end. A loop A→B→C→A is `["A", "B", "C", "A"]`.
    pub path: Vec<String>,
}

impl CycleFinding {
    /// Number of distinct nodes in the loop.
    #[must_use]
    pub fn len(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the cycle is a node referencing itself.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.len() == 1
    }

    /// Whether `identity` takes part in the loop.
    #[must_use]
    pub fn involves(&self, identity: &str) -> bool {
        self.path.iter().any(|node| node == identity)
    }
}

impl fmt::Display for CycleFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_self_loop() {
            write!(f, "{} cycle: '{}' references itself", self.relation, self.path[0])
        } else {
            write!(
                f,
                "{} cycle ({} nodes): {}",
                self.relation,
                self.len(),
                self.path.join(" -> ")
            )
        }
    }
}

/// DFS colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not yet visited.
    White,
    /// On the current DFS stack.
    Gray,
    /// Fully processed.
    Black,
}

/// Find every cycle in the snapshot.
///
/// Roots are visited in sorted order and neighbors in declaration order, so
/// the result is deterministic for a given graph.
#[must_use]
pub fn find_all_cycles(graph: &RelationGraph) -> Vec<CycleFinding> {
    let mut color: HashMap<&str, Color> = graph.node_ids().map(|id| (id, Color::White)).collect();
    let mut stack: Vec<&str> = Vec::new();
    let mut findings = Vec::new();

    for root in graph.node_ids() {
        if color.get(root) == Some(&Color::White) {
            dfs(graph, root, &mut color, &mut stack, &mut findings);
        }
    }
    findings
}

/// Whether the snapshot has any cycle, short-circuiting on the first.
#[must_use]
pub fn has_cycles(graph: &RelationGraph) -> bool {
    let mut color: HashMap<&str, Color> = graph.node_ids().map(|id| (id, Color::White)).collect();

    for root in graph.node_ids() {
        if color.get(root) == Some(&Color::White) && dfs_any(graph, root, &mut color) {
            return true;
        }
    }
    false
}

fn dfs<'g>(
    graph: &'g RelationGraph,
    node: &'g str,
    color: &mut HashMap<&'g str, Color>,
    stack: &mut Vec<&'g str>,
    findings: &mut Vec<CycleFinding>,
) {
    color.insert(node, Color::Gray);
    stack.push(node);

    for neighbor in graph.neighbors(node) {
        match color.get(neighbor.as_str()) {
            Some(Color::White) | None => {
                dfs(graph, neighbor, color, stack, findings);
            }
            Some(Color::Gray) => {
                // Back edge: the loop is the stack suffix starting at the
                // neighbor, closed by repeating the neighbor.
                if let Some(start) = stack.iter().position(|n| *n == neighbor.as_str()) {
                    let mut path: Vec<String> =
                        stack[start..].iter().map(ToString::to_string).collect();
                    path.push(neighbor.clone());
                    findings.push(CycleFinding {
                        relation: graph.label(),
                        path,
                    });
                }
            }
            Some(Color::Black) => {}
        }
    }

    stack.pop();
    color.insert(node, Color::Black);
}

fn dfs_any<'g>(
    graph: &'g RelationGraph,
    node: &'g str,
    color: &mut HashMap<&'g str, Color>,
) -> bool {
    color.insert(node, Color::Gray);
    for neighbor in graph.neighbors(node) {
        match color.get(neighbor.as_str()) {
            Some(Color::White) | None => {
                if dfs_any(graph, neighbor, color) {
                    return true;
                }
            }
            Some(Color::Gray) => return true,
            Some(Color::Black) => {}
        }
    }
    color.insert(node, Color::Black);
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acyclic_graph_has_no_findings() {
        let graph = RelationGraph::from_pairs(
            "dependency",
            &[("sale", "product"), ("sale", "account"), ("product", "uom")],
        );
        assert!(find_all_cycles(&graph).is_empty());
        assert!(!has_cycles(&graph));
    }

    #[test]
    fn three_node_loop_reported_once() {
        let graph =
            RelationGraph::from_pairs("dependency", &[("a", "b"), ("b", "c"), ("c", "a")]);
        let findings = find_all_cycles(&graph);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].path, vec!["a", "b", "c", "a"]);
        assert_eq!(findings[0].len(), 3);
        assert!(has_cycles(&graph));
    }

    #[test]
    fn self_loop_detected() {
        let graph = RelationGraph::from_pairs("inheritance", &[("a.model", "a.model")]);
        let findings = find_all_cycles(&graph);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_self_loop());
        assert_eq!(findings[0].path, vec!["a.model", "a.model"]);
    }

    #[test]
    fn disjoint_loops_each_reported() {
        let graph = RelationGraph::from_pairs(
            "dependency",
            &[("a", "b"), ("b", "a"), ("x", "y"), ("y", "x"), ("m", "n")],
        );
        let findings = find_all_cycles(&graph);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().any(|f| f.involves("a")));
        assert!(findings.iter().any(|f| f.involves("x")));
        assert!(!findings.iter().any(|f| f.involves("m")));
    }

    #[test]
    fn cycle_reachable_from_acyclic_prefix() {
        // m -> a -> b -> a: the loop excludes the entry prefix.
        let graph =
            RelationGraph::from_pairs("dependency", &[("m", "a"), ("a", "b"), ("b", "a")]);
        let findings = find_all_cycles(&graph);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].path, vec!["a", "b", "a"]);
    }

    #[test]
    fn display_formats_path() {
        let finding = CycleFinding {
            relation: "dependency",
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(finding.to_string(), "dependency cycle (2 nodes): a -> b -> a");
    }
}
