//! Path Finder (component B): Dijkstra/DFS downstream traversal, endpoint
//! classification, node-flag assignment, and point-to-point queries.

use crate::error::PathFinderError;
use crate::network::NetworkStore;
use crate::types::{Algorithm, DataCode, EndpointKind, NodeFlag, NodeId, PathLink, PathResult};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Parse a comma-separated list of target data codes.
///
/// Non-integer tokens (and the empty string produced by a stray trailing
/// comma) are silently dropped rather than rejected, matching the lenient
/// behavior of the system this was distilled from. `""` and `"0"` both mean
/// "no targets".
pub fn parse_target_codes(raw: &str) -> HashSet<DataCode> {
    if raw.trim().is_empty() || raw.trim() == "0" {
        return HashSet::new();
    }
    raw.split(',')
        .filter_map(|tok| tok.trim().parse::<DataCode>().ok())
        .collect()
}

fn classify_endpoint(
    network: &NetworkStore,
    node_id: NodeId,
    target_codes: &HashSet<DataCode>,
) -> Option<EndpointKind> {
    let edges = network.neighbors_of(node_id);
    if edges.is_empty() {
        return Some(EndpointKind::Leaf);
    }
    if !target_codes.is_empty() {
        if let Some(info) = network.node_info(node_id) {
            if target_codes.contains(&info.data_code) {
                return Some(EndpointKind::Target);
            }
        }
    }
    let has_traversable_neighbor = edges.iter().any(|e| network.is_traversable(e.neighbor));
    if !has_traversable_neighbor {
        return Some(EndpointKind::Boundary);
    }
    None
}

#[derive(Clone, Copy, PartialEq)]
struct HeapEntry(f64, NodeId);

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the lowest cost pops first.
        other.0.total_cmp(&self.0).then(self.1.cmp(&other.1))
    }
}

#[derive(Clone)]
struct Pred {
    from: NodeId,
    link_id: i64,
    stored_start: NodeId,
    stored_end: NodeId,
    reverse: bool,
    edge_cost: f64,
}

/// Traverses a loaded `NetworkStore`.
pub struct PathFinder<'a> {
    network: &'a NetworkStore,
    dfs_path_ceiling: usize,
}

impl<'a> PathFinder<'a> {
    pub fn new(network: &'a NetworkStore) -> Self {
        Self {
            network,
            dfs_path_ceiling: 50_000,
        }
    }

    pub fn with_dfs_ceiling(network: &'a NetworkStore, ceiling: usize) -> Self {
        Self {
            network,
            dfs_path_ceiling: ceiling,
        }
    }

    fn check_start(&self, start: NodeId) -> Result<(), PathFinderError> {
        self.network.require_loaded()?;
        if !self.network.contains(start) {
            return Err(PathFinderError::UnknownStart(start));
        }
        Ok(())
    }

    /// Dijkstra downstream: shortest cost to every reachable classified endpoint.
    pub fn find_shortest(
        &self,
        start: NodeId,
        ignore: Option<NodeId>,
        target_codes: &HashSet<DataCode>,
    ) -> Result<Vec<PathResult>, PathFinderError> {
        self.check_start(start)?;

        let mut dist: HashMap<NodeId, f64> = HashMap::new();
        let mut pred: HashMap<NodeId, Pred> = HashMap::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut heap = BinaryHeap::new();
        let mut endpoints: Vec<(NodeId, EndpointKind)> = Vec::new();

        dist.insert(start, 0.0);
        heap.push(HeapEntry(0.0, start));

        while let Some(HeapEntry(d, u)) = heap.pop() {
            if Some(u) == ignore {
                continue;
            }
            if visited.contains(&u) {
                continue;
            }
            visited.insert(u);

            if u != start {
                if let Some(kind) = classify_endpoint(self.network, u, target_codes) {
                    endpoints.push((u, kind));
                }
            }

            for edge in self.network.neighbors_of(u) {
                if Some(edge.neighbor) == ignore
                    || visited.contains(&edge.neighbor)
                    || !self.network.is_traversable(edge.neighbor)
                {
                    continue;
                }
                let nd = d + edge.cost;
                let better = dist.get(&edge.neighbor).map(|&cur| nd < cur).unwrap_or(true);
                if better {
                    dist.insert(edge.neighbor, nd);
                    pred.insert(
                        edge.neighbor,
                        Pred {
                            from: u,
                            link_id: edge.link_id,
                            stored_start: edge.stored_start,
                            stored_end: edge.stored_end,
                            reverse: edge.reverse,
                            edge_cost: edge.cost,
                        },
                    );
                    heap.push(HeapEntry(nd, edge.neighbor));
                }
            }
        }

        let mut results = Vec::with_capacity(endpoints.len());
        for (end, kind) in endpoints {
            results.push(reconstruct(
                Algorithm::DijkstraDownstream,
                start,
                end,
                kind,
                &pred,
                dist[&end],
            ));
        }
        Ok(results)
    }

    /// DFS enumeration of every simple path from `start` to a classified endpoint.
    ///
    /// When the classified endpoint is not `Leaf`, enumeration continues past it
    /// to find deeper paths too. Bounded by `dfs_path_ceiling`.
    pub fn find_all(
        &self,
        start: NodeId,
        ignore: Option<NodeId>,
        target_codes: &HashSet<DataCode>,
    ) -> Result<Vec<PathResult>, PathFinderError> {
        self.check_start(start)?;

        let mut results = Vec::new();
        let mut visited = HashSet::new();
        let mut path_nodes = vec![start];
        let mut path_links: Vec<PathLink> = Vec::new();

        visited.insert(start);
        self.dfs_visit(
            start,
            ignore,
            target_codes,
            &mut visited,
            &mut path_nodes,
            &mut path_links,
            &mut results,
        );

        if results.len() >= self.dfs_path_ceiling {
            tracing::warn!(
                ceiling = self.dfs_path_ceiling,
                "DFS downstream hit its path-count ceiling; results are truncated"
            );
        }
        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs_visit(
        &self,
        u: NodeId,
        ignore: Option<NodeId>,
        target_codes: &HashSet<DataCode>,
        visited: &mut HashSet<NodeId>,
        path_nodes: &mut Vec<NodeId>,
        path_links: &mut Vec<PathLink>,
        results: &mut Vec<PathResult>,
    ) {
        if results.len() >= self.dfs_path_ceiling {
            return;
        }

        if u != path_nodes[0] {
            if let Some(kind) = classify_endpoint(self.network, u, target_codes) {
                results.push(build_path_result(
                    Algorithm::DfsDownstream,
                    path_nodes,
                    path_links,
                    kind,
                ));
                if kind == EndpointKind::Leaf {
                    return;
                }
            }
        }

        for edge in self.network.neighbors_of(u) {
            if results.len() >= self.dfs_path_ceiling {
                return;
            }
            if Some(edge.neighbor) == ignore
                || visited.contains(&edge.neighbor)
                || !self.network.is_traversable(edge.neighbor)
            {
                continue;
            }
            visited.insert(edge.neighbor);
            path_nodes.push(edge.neighbor);
            path_links.push(PathLink {
                seq: path_links.len() as u32 + 1,
                link_id: edge.link_id,
                start_node_id: edge.stored_start,
                end_node_id: edge.stored_end,
                cost: edge.cost,
                reverse: edge.reverse,
            });

            self.dfs_visit(
                edge.neighbor,
                ignore,
                target_codes,
                visited,
                path_nodes,
                path_links,
                results,
            );

            path_links.pop();
            path_nodes.pop();
            visited.remove(&edge.neighbor);
        }
    }

    /// First path found by breadth-first search, capped at `max_depth` hops.
    /// Not guaranteed to be the cheapest path — just the first one BFS reaches.
    pub fn find_any_between(
        &self,
        start: NodeId,
        end: NodeId,
        ignore: Option<NodeId>,
        max_depth: usize,
    ) -> Result<Option<PathResult>, PathFinderError> {
        self.check_start(start)?;
        if !self.network.contains(end) {
            return Err(PathFinderError::UnknownEnd(end));
        }

        let mut visited = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        visited.insert(start);
        queue.push_back((start, vec![start], Vec::<PathLink>::new(), 0usize));

        while let Some((u, nodes, links, depth)) = queue.pop_front() {
            if u == end {
                let total_cost = links.iter().map(|l| l.cost).sum();
                return Ok(Some(PathResult {
                    algorithm: Algorithm::DfsDownstream,
                    start_node_id: start,
                    end_node_id: end,
                    end_kind: EndpointKind::Target,
                    nodes,
                    links,
                    total_cost,
                }));
            }
            if depth >= max_depth {
                continue;
            }
            for edge in self.network.neighbors_of(u) {
                if Some(edge.neighbor) == ignore || visited.contains(&edge.neighbor) {
                    continue;
                }
                visited.insert(edge.neighbor);
                let mut next_nodes = nodes.clone();
                next_nodes.push(edge.neighbor);
                let mut next_links = links.clone();
                next_links.push(PathLink {
                    seq: next_links.len() as u32 + 1,
                    link_id: edge.link_id,
                    start_node_id: edge.stored_start,
                    end_node_id: edge.stored_end,
                    cost: edge.cost,
                    reverse: edge.reverse,
                });
                queue.push_back((edge.neighbor, next_nodes, next_links, depth + 1));
            }
        }
        Ok(None)
    }

    /// Dijkstra between two specific nodes, terminating as soon as `end` is popped.
    pub fn find_shortest_between(
        &self,
        start: NodeId,
        end: NodeId,
        ignore: Option<NodeId>,
    ) -> Result<Option<PathResult>, PathFinderError> {
        self.check_start(start)?;
        if !self.network.contains(end) {
            return Err(PathFinderError::UnknownEnd(end));
        }

        let mut dist: HashMap<NodeId, f64> = HashMap::new();
        let mut pred: HashMap<NodeId, Pred> = HashMap::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut heap = BinaryHeap::new();

        dist.insert(start, 0.0);
        heap.push(HeapEntry(0.0, start));

        while let Some(HeapEntry(d, u)) = heap.pop() {
            if Some(u) == ignore || visited.contains(&u) {
                continue;
            }
            visited.insert(u);

            if u == end {
                return Ok(Some(reconstruct(
                    Algorithm::DijkstraDownstream,
                    start,
                    end,
                    EndpointKind::Target,
                    &pred,
                    d,
                )));
            }

            for edge in self.network.neighbors_of(u) {
                if Some(edge.neighbor) == ignore || visited.contains(&edge.neighbor) {
                    continue;
                }
                let nd = d + edge.cost;
                let better = dist.get(&edge.neighbor).map(|&cur| nd < cur).unwrap_or(true);
                if better {
                    dist.insert(edge.neighbor, nd);
                    pred.insert(
                        edge.neighbor,
                        Pred {
                            from: u,
                            link_id: edge.link_id,
                            stored_start: edge.stored_start,
                            stored_end: edge.stored_end,
                            reverse: edge.reverse,
                            edge_cost: edge.cost,
                        },
                    );
                    heap.push(HeapEntry(nd, edge.neighbor));
                }
            }
        }
        Ok(None)
    }
}

fn reconstruct(
    algorithm: Algorithm,
    start: NodeId,
    end: NodeId,
    kind: EndpointKind,
    pred: &HashMap<NodeId, Pred>,
    total_cost: f64,
) -> PathResult {
    let mut nodes = vec![end];
    let mut links_rev = Vec::new();
    let mut cur = end;
    while cur != start {
        let p = &pred[&cur];
        links_rev.push(PathLink {
            seq: 0,
            link_id: p.link_id,
            start_node_id: p.stored_start,
            end_node_id: p.stored_end,
            cost: p.edge_cost,
            reverse: p.reverse,
        });
        cur = p.from;
        nodes.push(cur);
    }
    nodes.reverse();
    links_rev.reverse();
    for (i, l) in links_rev.iter_mut().enumerate() {
        l.seq = i as u32 + 1;
    }
    PathResult {
        algorithm,
        start_node_id: start,
        end_node_id: end,
        end_kind: kind,
        nodes,
        links: links_rev,
        total_cost,
    }
}

fn build_path_result(
    algorithm: Algorithm,
    path_nodes: &[NodeId],
    path_links: &[PathLink],
    kind: EndpointKind,
) -> PathResult {
    PathResult {
        algorithm,
        start_node_id: path_nodes[0],
        end_node_id: *path_nodes.last().unwrap(),
        end_kind: kind,
        nodes: path_nodes.to_vec(),
        links: path_links.to_vec(),
        total_cost: path_links.iter().map(|l| l.cost).sum(),
    }
}

/// Assign per-path-local node flags (§4.B) across a batch of downstream results
/// from the same operation. The key's first element is the index of the path
/// within `paths`, standing in for a caller-assigned path id.
pub fn assign_node_flags(paths: &[PathResult]) -> HashMap<(usize, NodeId), NodeFlag> {
    let mut occurrence_count: HashMap<NodeId, usize> = HashMap::new();
    for path in paths {
        let mut seen_in_this_path = HashSet::new();
        for &n in &path.nodes {
            if seen_in_this_path.insert(n) {
                *occurrence_count.entry(n).or_insert(0) += 1;
            }
        }
    }

    let mut flags = HashMap::new();
    for (idx, path) in paths.iter().enumerate() {
        let last = path.nodes.len() - 1;
        for (i, &n) in path.nodes.iter().enumerate() {
            let flag = if i == 0 {
                NodeFlag::Start
            } else if i == last {
                match path.end_kind {
                    EndpointKind::Leaf => NodeFlag::Leaf,
                    EndpointKind::Target => NodeFlag::End,
                    EndpointKind::Boundary => NodeFlag::Frontier,
                }
            } else if occurrence_count.get(&n).copied().unwrap_or(0) > 1 {
                NodeFlag::Convergence
            } else {
                NodeFlag::Intermediate
            };
            flags.insert((idx, n), flag);
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Link, NetObjType, Node, Scope};

    fn node(id: NodeId, data_code: DataCode) -> Node {
        Node {
            node_id: id,
            data_code,
            utility_no: None,
            toolset_id: None,
            eq_poc_no: None,
            net_obj_type: NetObjType::Logical,
        }
    }

    fn link(id: i64, start: NodeId, end: NodeId, cost: f64, bidirected: bool) -> Link {
        Link {
            link_id: id,
            start_node_id: start,
            end_node_id: end,
            is_bidirected: bidirected,
            cost,
            net_obj_type: NetObjType::Logical,
        }
    }

    fn scope() -> Scope {
        Scope {
            fab: None,
            phase: None,
            model: None,
            toolset: None,
            utility_no: None,
            eq_poc_no: None,
            coverage_target: 0.8,
        }
    }

    #[test]
    fn parse_target_codes_is_lenient() {
        let codes = parse_target_codes("15000, oops,,200");
        assert_eq!(codes, HashSet::from([15000, 200]));
        assert!(parse_target_codes("").is_empty());
        assert!(parse_target_codes("0").is_empty());
    }

    #[test]
    fn trivial_shortest_path_s1() {
        let mut net = NetworkStore::new();
        net.load(
            vec![node(1, 1), node(2, 1), node(3, 15000)],
            &[link(1, 1, 2, 1.0, false), link(2, 2, 3, 2.0, false)],
            &scope(),
            1,
        );
        let pf = PathFinder::new(&net);
        let targets = parse_target_codes("15000");
        let results = pf.find_shortest(1, None, &targets).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.end_node_id, 3);
        assert_eq!(r.total_cost, 3.0);
        assert_eq!(r.links.len(), 2);
        assert_eq!(r.links[0].seq, 1);
        assert_eq!(r.links[1].seq, 2);
    }

    #[test]
    fn bidirected_traversal_preserves_orientation_s2() {
        let mut net = NetworkStore::new();
        net.load(vec![node(1, 1), node(2, 1)], &[link(1, 1, 2, 1.0, true)], &scope(), 2);
        let pf = PathFinder::new(&net);
        let results = pf.find_shortest(2, None, &HashSet::new()).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.end_node_id, 1);
        assert_eq!(r.links[0].start_node_id, 1);
        assert_eq!(r.links[0].end_node_id, 2);
        assert!(r.links[0].reverse);
    }

    #[test]
    fn filter_boundary_stops_expansion_s3() {
        let mut net = NetworkStore::new();
        let mut nodes = vec![node(1, 1), node(2, 1), node(3, 1)];
        nodes[0].utility_no = Some(1);
        nodes[1].utility_no = Some(1);
        nodes[2].utility_no = Some(99);
        let mut scope = scope();
        scope.utility_no = Some(1);
        net.load(nodes, &[link(1, 1, 2, 1.0, false), link(2, 2, 3, 1.0, false)], &scope, 1);
        let pf = PathFinder::new(&net);
        let results = pf.find_shortest(1, None, &HashSet::new()).unwrap();
        // node 3's utility_no fails the scope filter, so it is never relaxed into;
        // node 2 becomes the endpoint since its only neighbor is untraversable.
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.end_node_id, 2);
        assert_eq!(r.end_kind, EndpointKind::Boundary);
        assert_eq!(r.nodes, vec![1, 2]);
    }

    #[test]
    fn leaf_endpoint_detected_s4() {
        let mut net = NetworkStore::new();
        net.load(
            vec![node(1, 1), node(2, 1), node(3, 1)],
            &[link(1, 1, 2, 1.0, false), link(2, 1, 3, 1.0, false)],
            &scope(),
            1,
        );
        let pf = PathFinder::new(&net);
        let results = pf.find_shortest(1, None, &HashSet::new()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.end_kind == EndpointKind::Leaf));
    }

    #[test]
    fn no_self_endpoint() {
        let mut net = NetworkStore::new();
        net.load(vec![node(1, 1)], &[], &scope(), 1);
        let pf = PathFinder::new(&net);
        let results = pf.find_shortest(1, None, &HashSet::new()).unwrap();
        assert!(results.iter().all(|r| r.end_node_id != 1));
    }

    #[test]
    fn unknown_start_is_an_error() {
        let net = NetworkStore::new();
        let pf = PathFinder::new(&net);
        let err = pf.find_shortest(1, None, &HashSet::new());
        assert!(matches!(err, Err(PathFinderError::NotLoaded)));
    }

    #[test]
    fn dfs_enumerates_all_simple_paths() {
        let mut net = NetworkStore::new();
        net.load(
            vec![node(1, 1), node(2, 1), node(3, 1), node(4, 1)],
            &[
                link(1, 1, 2, 1.0, false),
                link(2, 1, 3, 1.0, false),
                link(3, 2, 4, 1.0, false),
                link(4, 3, 4, 1.0, false),
            ],
            &scope(),
            1,
        );
        let pf = PathFinder::new(&net);
        let results = pf.find_all(1, None, &HashSet::new()).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn node_flags_mark_convergence() {
        let mut net = NetworkStore::new();
        net.load(
            vec![node(1, 1), node(2, 1), node(3, 1), node(4, 1)],
            &[
                link(1, 1, 2, 1.0, false),
                link(2, 1, 3, 1.0, false),
                link(3, 2, 4, 1.0, false),
                link(4, 3, 4, 1.0, false),
            ],
            &scope(),
            1,
        );
        let pf = PathFinder::new(&net);
        let results = pf.find_all(1, None, &HashSet::new()).unwrap();
        let flags = assign_node_flags(&results);
        let convergence_count = flags.values().filter(|f| **f == NodeFlag::Convergence).count();
        assert_eq!(convergence_count, 2); // node 4 appears in both paths
    }
}
