//! Coverage Tracker (component D): a bitset over the in-scope node/link
//! universe, updated as paths are discovered.

use crate::types::NodeId;
use fixedbitset::FixedBitSet;
use std::collections::{HashMap, HashSet};

fn to_hex(bits: &FixedBitSet) -> String {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for i in bits.ones() {
        bytes[i / 8] |= 1 << (i % 8);
    }
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(hex: &str, len: usize) -> FixedBitSet {
    let mut bits = FixedBitSet::with_capacity(len);
    for (byte_idx, chunk) in hex.as_bytes().chunks(2).enumerate() {
        if let Ok(s) = std::str::from_utf8(chunk) {
            if let Ok(byte) = u8::from_str_radix(s, 16) {
                for bit in 0..8 {
                    let idx = byte_idx * 8 + bit;
                    if idx < len && (byte >> bit) & 1 == 1 {
                        bits.insert(idx);
                    }
                }
            }
        }
    }
    bits
}

/// A snapshot of coverage state, exportable for debugging/replay (§4.D).
pub struct CoverageSnapshot {
    pub node_bits_hex: String,
    pub link_bits_hex: String,
}

/// Tracks which in-scope nodes and links have been seen by at least one
/// successful path discovery this run.
pub struct CoverageTracker {
    node_index: HashMap<NodeId, usize>,
    link_index: HashMap<(NodeId, NodeId), usize>,
    node_ids_sorted: Vec<NodeId>,
    link_pairs_sorted: Vec<(NodeId, NodeId)>,
    node_bits: FixedBitSet,
    link_bits: FixedBitSet,
    seen_hashes: HashSet<String>,
}

impl CoverageTracker {
    /// Build the universe from already-fetched scope rows (§4.D `Initialize`).
    pub fn initialize(mut node_ids: Vec<NodeId>, mut link_pairs: Vec<(NodeId, NodeId)>) -> Self {
        node_ids.sort_unstable();
        node_ids.dedup();
        link_pairs = link_pairs
            .into_iter()
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        link_pairs.sort_unstable();
        link_pairs.dedup();

        let node_index = node_ids.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let link_index = link_pairs.iter().enumerate().map(|(i, &p)| (p, i)).collect();

        Self {
            node_bits: FixedBitSet::with_capacity(node_ids.len()),
            link_bits: FixedBitSet::with_capacity(link_pairs.len()),
            node_index,
            link_index,
            node_ids_sorted: node_ids,
            link_pairs_sorted: link_pairs,
            seen_hashes: HashSet::new(),
        }
    }

    pub fn total_nodes(&self) -> usize {
        self.node_ids_sorted.len()
    }

    pub fn total_links(&self) -> usize {
        self.link_pairs_sorted.len()
    }

    /// Record a newly discovered path. Returns `(is_new, coverage_fraction)`;
    /// `is_new` is false when `path_hash` was already accounted for.
    pub fn update(&mut self, path_hash: &str, path_nodes: &[NodeId]) -> (bool, f64) {
        if !self.seen_hashes.insert(path_hash.to_string()) {
            return (false, self.fraction());
        }

        for &n in path_nodes {
            if let Some(&idx) = self.node_index.get(&n) {
                self.node_bits.insert(idx);
            }
        }
        for pair in path_nodes.windows(2) {
            let key = (pair[0].min(pair[1]), pair[0].max(pair[1]));
            if let Some(&idx) = self.link_index.get(&key) {
                self.link_bits.insert(idx);
            }
        }
        (true, self.fraction())
    }

    /// Pooled coverage fraction: `(coveredNodes + coveredLinks) / (totalNodes + totalLinks)`.
    pub fn fraction(&self) -> f64 {
        let total = self.total_nodes() + self.total_links();
        if total == 0 {
            return 0.0;
        }
        (self.node_bits.count_ones(..) + self.link_bits.count_ones(..)) as f64 / total as f64
    }

    pub fn node_fraction(&self) -> f64 {
        if self.total_nodes() == 0 {
            return 0.0;
        }
        self.node_bits.count_ones(..) as f64 / self.total_nodes() as f64
    }

    pub fn link_fraction(&self) -> f64 {
        if self.total_links() == 0 {
            return 0.0;
        }
        self.link_bits.count_ones(..) as f64 / self.total_links() as f64
    }

    pub fn uncovered_nodes(&self, limit: usize) -> Vec<NodeId> {
        (0..self.node_ids_sorted.len())
            .filter(|i| !self.node_bits.contains(*i))
            .take(limit)
            .map(|i| self.node_ids_sorted[i])
            .collect()
    }

    pub fn uncovered_links(&self, limit: usize) -> Vec<(NodeId, NodeId)> {
        (0..self.link_pairs_sorted.len())
            .filter(|i| !self.link_bits.contains(*i))
            .take(limit)
            .map(|i| self.link_pairs_sorted[i])
            .collect()
    }

    /// Group all uncovered nodes by a caller-supplied key (data_code, utility_no,
    /// fab, ...) and flag buckets with more than five members as actionable (§4.D).
    pub fn gap_report_by(&self, key_fn: impl Fn(NodeId) -> String) -> Vec<GapBucket> {
        let mut buckets: HashMap<String, usize> = HashMap::new();
        for &node_id in self
            .node_ids_sorted
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.node_bits.contains(*i))
            .map(|(_, n)| n)
        {
            *buckets.entry(key_fn(node_id)).or_insert(0) += 1;
        }
        let mut out: Vec<GapBucket> = buckets
            .into_iter()
            .map(|(key, count)| GapBucket {
                actionable: count > 5,
                key,
                count,
            })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count));
        out
    }

    pub fn export_snapshot(&self) -> CoverageSnapshot {
        CoverageSnapshot {
            node_bits_hex: to_hex(&self.node_bits),
            link_bits_hex: to_hex(&self.link_bits),
        }
    }

    pub fn import_snapshot(&mut self, snapshot: &CoverageSnapshot) {
        self.node_bits = from_hex(&snapshot.node_bits_hex, self.total_nodes());
        self.link_bits = from_hex(&snapshot.link_bits_hex, self.total_links());
    }
}

#[derive(Debug, Clone)]
pub struct GapBucket {
    pub key: String,
    pub count: usize,
    pub actionable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_is_monotonic_and_dedupes_by_hash() {
        let mut tracker = CoverageTracker::initialize(vec![1, 2, 3, 4, 5], vec![(1, 2), (2, 3), (3, 4), (4, 5)]);
        let (is_new, frac1) = tracker.update("h1", &[1, 2, 3]);
        assert!(is_new);
        assert!(frac1 > 0.0);
        let (is_new2, frac2) = tracker.update("h1", &[1, 2, 3]);
        assert!(!is_new2);
        assert_eq!(frac1, frac2);
    }

    #[test]
    fn coverage_cutoff_s5() {
        // 10 nodes, 5 links; a path covering 7 nodes + 3 links -> 10/15 = 0.667.
        let nodes: Vec<NodeId> = (1..=10).collect();
        let links: Vec<(NodeId, NodeId)> = (1..=5).map(|i| (i, i + 10)).collect();
        let mut tracker = CoverageTracker::initialize(nodes, links);
        // fabricate a path whose consecutive pairs hit exactly 3 of the 5 link pairs
        let path_nodes = vec![1, 11, 2, 12, 3, 13, 4, 5, 6, 7];
        let (_, frac) = tracker.update("hash-1", &path_nodes);
        assert!((frac - 10.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn hex_snapshot_roundtrips() {
        let mut tracker = CoverageTracker::initialize(vec![1, 2, 3], vec![(1, 2)]);
        tracker.update("h", &[1, 2]);
        let snap = tracker.export_snapshot();
        let mut restored = CoverageTracker::initialize(vec![1, 2, 3], vec![(1, 2)]);
        restored.import_snapshot(&snap);
        assert_eq!(restored.node_fraction(), tracker.node_fraction());
        assert_eq!(restored.link_fraction(), tracker.link_fraction());
    }

    #[test]
    fn empty_universe_yields_zero_fraction() {
        let tracker = CoverageTracker::initialize(vec![], vec![]);
        assert_eq!(tracker.fraction(), 0.0);
    }
}
