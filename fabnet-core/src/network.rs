//! Network Store (component A): an in-memory adjacency view over the loaded
//! subset of the utility network, plus the scope-derived traversable set.

use crate::error::PathFinderError;
use crate::types::{Link, Node, NodeId, Scope};
use std::collections::{HashMap, HashSet};

/// One forward edge out of a node, synthesized from a `Link` row. Bidirected
/// links contribute one `Edge` per direction.
#[derive(Clone, Debug)]
pub struct Edge {
    pub neighbor: NodeId,
    pub link_id: i64,
    pub cost: f64,
    /// True when this edge runs opposite the link's stored `(start, end)`.
    pub reverse: bool,
    pub stored_start: NodeId,
    pub stored_end: NodeId,
}

/// A loaded, scope-filtered view of the network, ready for traversal.
#[derive(Default)]
pub struct NetworkStore {
    nodes: HashMap<NodeId, Node>,
    adjacency: HashMap<NodeId, Vec<Edge>>,
    traversable: HashSet<NodeId>,
    loaded: bool,
}

impl NetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the adjacency and traversable set from already-fetched rows.
    ///
    /// `start_node_id` is unconditionally folded into the traversable set
    /// regardless of scope filters — the start PoC is always in play.
    pub fn load(&mut self, nodes: Vec<Node>, links: &[Link], scope: &Scope, start_node_id: NodeId) {
        self.nodes = nodes.into_iter().map(|n| (n.node_id, n)).collect();
        self.adjacency.clear();

        for link in links {
            if !self.nodes.contains_key(&link.start_node_id)
                || !self.nodes.contains_key(&link.end_node_id)
            {
                continue;
            }
            let cost = link.effective_cost();
            self.adjacency
                .entry(link.start_node_id)
                .or_default()
                .push(Edge {
                    neighbor: link.end_node_id,
                    link_id: link.link_id,
                    cost,
                    reverse: false,
                    stored_start: link.start_node_id,
                    stored_end: link.end_node_id,
                });
            if link.is_bidirected {
                self.adjacency
                    .entry(link.end_node_id)
                    .or_default()
                    .push(Edge {
                        neighbor: link.start_node_id,
                        link_id: link.link_id,
                        cost,
                        reverse: true,
                        stored_start: link.start_node_id,
                        stored_end: link.end_node_id,
                    });
            }
        }

        self.traversable = self
            .nodes
            .values()
            .filter(|n| Self::matches_scope(n, scope))
            .map(|n| n.node_id)
            .collect();
        self.traversable.insert(start_node_id);

        self.loaded = true;
        tracing::info!(
            nodes = self.nodes.len(),
            links = links.len(),
            traversable = self.traversable.len(),
            "network loaded"
        );
    }

    /// The three independent path filters from §4.A: `utility_no > 0` requires
    /// an exact match, `toolset_id > 0` requires an exact match, and a
    /// non-empty `eq_poc_no` is a case-insensitive substring match. Each is a
    /// no-op when unset, matching `load_network_data`'s `0`/`''` defaults.
    fn matches_scope(node: &Node, scope: &Scope) -> bool {
        if let Some(utility_no) = scope.utility_no {
            if utility_no > 0 && node.utility_no != Some(utility_no) {
                return false;
            }
        }
        if let Some(toolset) = scope.toolset.as_deref().and_then(|t| t.parse::<i64>().ok()) {
            if toolset > 0 && node.toolset_id != Some(toolset) {
                return false;
            }
        }
        if let Some(eq_poc_no) = scope.eq_poc_no.as_deref().map(str::trim) {
            if !eq_poc_no.is_empty() {
                let needle = eq_poc_no.to_lowercase();
                let matches = node
                    .eq_poc_no
                    .as_deref()
                    .map(|haystack| haystack.to_lowercase().contains(&needle))
                    .unwrap_or(false);
                if !matches {
                    return false;
                }
            }
        }
        true
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn require_loaded(&self) -> Result<(), PathFinderError> {
        if self.loaded {
            Ok(())
        } else {
            Err(PathFinderError::NotLoaded)
        }
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn node_info(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn neighbors_of(&self, node_id: NodeId) -> &[Edge] {
        self.adjacency
            .get(&node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_traversable(&self, node_id: NodeId) -> bool {
        self.traversable.contains(&node_id)
    }

    pub fn traversable_count(&self) -> usize {
        self.traversable.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NetObjType;

    fn node(id: NodeId, utility_no: Option<i64>) -> Node {
        Node {
            node_id: id,
            data_code: 100,
            utility_no,
            toolset_id: None,
            eq_poc_no: None,
            net_obj_type: NetObjType::Logical,
        }
    }

    fn link(id: i64, start: NodeId, end: NodeId, bidirected: bool) -> Link {
        Link {
            link_id: id,
            start_node_id: start,
            end_node_id: end,
            is_bidirected: bidirected,
            cost: 1.0,
            net_obj_type: NetObjType::Logical,
        }
    }

    #[test]
    fn start_node_always_traversable_even_outside_scope() {
        let mut store = NetworkStore::new();
        let scope = Scope {
            fab: None,
            phase: None,
            model: None,
            toolset: None,
            utility_no: None,
            eq_poc_no: None,
            coverage_target: 0.8,
        };
        store.load(vec![node(1, None), node(2, None)], &[link(1, 1, 2, false)], &scope, 1);
        assert!(store.is_traversable(1));
        assert!(store.is_traversable(2));
    }

    #[test]
    fn bidirected_link_produces_edges_both_ways() {
        let mut store = NetworkStore::new();
        let scope = Scope {
            fab: None,
            phase: None,
            model: None,
            toolset: None,
            utility_no: None,
            eq_poc_no: None,
            coverage_target: 0.8,
        };
        store.load(vec![node(1, None), node(2, None)], &[link(1, 1, 2, true)], &scope, 1);
        assert_eq!(store.neighbors_of(1).len(), 1);
        assert_eq!(store.neighbors_of(2).len(), 1);
        assert!(store.neighbors_of(2)[0].reverse);
        assert!(!store.neighbors_of(1)[0].reverse);
    }

    #[test]
    fn not_loaded_until_load_called() {
        let store = NetworkStore::new();
        assert!(store.require_loaded().is_err());
    }

    #[test]
    fn utility_no_filter_excludes_mismatched_nodes() {
        let mut store = NetworkStore::new();
        let scope = Scope {
            fab: None,
            phase: None,
            model: None,
            toolset: None,
            utility_no: Some(7),
            eq_poc_no: None,
            coverage_target: 0.8,
        };
        store.load(
            vec![node(1, Some(7)), node(2, Some(7)), node(3, Some(9))],
            &[],
            &scope,
            1,
        );
        assert!(store.is_traversable(2));
        assert!(!store.is_traversable(3));
    }

    #[test]
    fn eq_poc_no_filter_is_case_insensitive_substring() {
        let mut store = NetworkStore::new();
        let mut a = node(1, None);
        a.eq_poc_no = Some("EQ-101-POC-A".to_string());
        let mut b = node(2, None);
        b.eq_poc_no = Some("eq-202-poc-b".to_string());
        let scope = Scope {
            fab: None,
            phase: None,
            model: None,
            toolset: None,
            utility_no: None,
            eq_poc_no: Some("101".to_string()),
            coverage_target: 0.8,
        };
        store.load(vec![a, b], &[], &scope, 3);
        assert!(store.is_traversable(1));
        assert!(!store.is_traversable(2));
    }
}
