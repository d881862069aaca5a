//! Path Repository (component C): canonical-path dedup by hash, and the
//! `AttemptPath` linking contract described in §4.C.

use crate::store::Store;
use crate::types::*;
use anyhow::Result;
use uuid::Uuid;

/// Per-run aggregates folded into a new `PathDefinition` row. Computed by the
/// caller, which has access to the loaded `NetworkStore`/PoC data the
/// repository itself does not hold.
#[derive(Debug, Clone, Default)]
pub struct PathAggregates {
    pub data_codes_scope: Vec<DataCode>,
    pub utilities_scope: Vec<UtilityNo>,
    pub references_scope: Vec<String>,
}

/// The authoritative path-hash format (§6): MD5 over a `|`-joined ASCII form
/// of the sorted node-id list, the sorted link-id list, the source type, and
/// the scope tag. Do not alter — two implementations must agree byte-for-byte.
pub fn compute_path_hash(nodes: &[NodeId], links: &[LinkId], source_type: SourceType, scope_tag: &str) -> String {
    let mut sorted_nodes = nodes.to_vec();
    sorted_nodes.sort_unstable();
    let mut sorted_links = links.to_vec();
    sorted_links.sort_unstable();

    let ascii = format!(
        "{}|{}|{}|{}",
        sorted_nodes.iter().map(i64::to_string).collect::<Vec<_>>().join(","),
        sorted_links.iter().map(i64::to_string).collect::<Vec<_>>().join(","),
        source_type.as_str(),
        scope_tag,
    );
    format!("{:x}", md5::compute(ascii.as_bytes()))
}

pub struct PathRepository<'a> {
    store: &'a dyn Store,
}

impl<'a> PathRepository<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Record a sampler pick before a path has been found for it.
    pub async fn store_attempt_pick(&self, run_id: Uuid, from_poc: &Poc, to_poc: &Poc, picked_at: Timestamp) -> Result<i64> {
        self.store
            .insert_attempt_pick(&AttemptPath {
                id: None,
                run_id,
                path_definition_id: None,
                start_node_id: from_poc.node_id,
                end_node_id: to_poc.node_id,
                cost: None,
                picked_at,
                tested_at: None,
                notes: None,
            })
            .await
    }

    /// Dedupe-by-hash, insert if new, and link the run's latest open attempt
    /// to the resulting `PathDefinition` id.
    pub async fn store_path(
        &self,
        run_id: Uuid,
        scope_tag: &str,
        source_type: SourceType,
        result: &PathResult,
        aggregates: PathAggregates,
        tested_at: Timestamp,
    ) -> Result<i64> {
        let link_ids: Vec<LinkId> = result.links.iter().map(|l| l.link_id).collect();
        let path_hash = compute_path_hash(&result.nodes, &link_ids, source_type, scope_tag);

        let path_definition_id = match self.store.find_path_definition_by_hash(&path_hash).await? {
            Some(existing) => existing.id.expect("persisted path definition carries an id"),
            None => {
                let def = PathDefinition {
                    id: None,
                    path_hash,
                    source_type,
                    scope: scope_tag.to_string(),
                    node_count: result.nodes.len() as u32,
                    link_count: result.links.len() as u32,
                    // Placeholder pending real link geometry, matching the original's own formula.
                    total_length_mm: result.nodes.len() as f64 * 1000.0,
                    nodes: result.nodes.clone(),
                    links: result.links.clone(),
                    data_codes_scope: aggregates.data_codes_scope,
                    utilities_scope: aggregates.utilities_scope,
                    references_scope: aggregates.references_scope,
                };
                self.store.insert_path_definition(&def).await?
            }
        };

        if let Some(attempt) = self.store.latest_open_attempt(run_id).await? {
            let attempt_id = attempt.id.expect("loaded attempt carries an id");
            self.store
                .link_attempt_to_path(attempt_id, path_definition_id, result.total_cost, tested_at)
                .await?;
        }

        Ok(path_definition_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::MemoryStore;
    use crate::types::{Algorithm, EndpointKind};

    fn poc(id: i64, node_id: NodeId) -> Poc {
        Poc {
            id,
            equipment_id: 1,
            node_id,
            code: format!("POC-{id}"),
            utility_no: None,
            reference: None,
            flow: None,
            markers: None,
            is_used: true,
            is_loopback: false,
            is_active: true,
        }
    }

    fn result(nodes: Vec<NodeId>) -> PathResult {
        PathResult {
            algorithm: Algorithm::DijkstraDownstream,
            start_node_id: nodes[0],
            end_node_id: *nodes.last().unwrap(),
            end_kind: EndpointKind::Target,
            nodes,
            links: vec![],
            total_cost: 5.0,
        }
    }

    #[test]
    fn hash_ignores_input_order() {
        let a = compute_path_hash(&[3, 1, 2], &[20, 10], SourceType::Random, "M15|_|_|_");
        let b = compute_path_hash(&[1, 2, 3], &[10, 20], SourceType::Random, "M15|_|_|_");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_differs_by_scope() {
        let a = compute_path_hash(&[1, 2], &[], SourceType::Random, "M15|_|_|_");
        let b = compute_path_hash(&[1, 2], &[], SourceType::Random, "M16|_|_|_");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn store_path_dedupes_and_links_open_attempt() {
        let store = MemoryStore::new();
        let repo = PathRepository::new(&store);
        let run_id = Uuid::new_v4();

        let from = poc(1, 1);
        let to = poc(2, 2);
        repo.store_attempt_pick(run_id, &from, &to, 1000).await.unwrap();

        let r = result(vec![1, 2]);
        let id1 = repo
            .store_path(run_id, "M15|_|_|_", SourceType::Random, &r, PathAggregates::default(), 2000)
            .await
            .unwrap();

        repo.store_attempt_pick(run_id, &from, &to, 3000).await.unwrap();
        let id2 = repo
            .store_path(run_id, "M15|_|_|_", SourceType::Random, &r, PathAggregates::default(), 4000)
            .await
            .unwrap();

        assert_eq!(id1, id2);
    }
}
