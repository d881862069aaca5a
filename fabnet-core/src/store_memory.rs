use crate::store::Store;
use crate::types::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

struct Inner {
    nodes: HashMap<NodeId, Node>,
    links: Vec<Link>,
    toolsets: HashMap<String, Toolset>,
    equipment: HashMap<i64, Equipment>,
    pocs: HashMap<i64, Poc>,
    poc_by_node: HashMap<NodeId, i64>,
    connections: HashSet<(i64, i64)>,
    path_definitions: HashMap<i64, PathDefinition>,
    path_definitions_by_hash: HashMap<String, i64>,
    path_tags: HashMap<i64, (PathTagOutcome, f64, String)>,
    attempts: HashMap<i64, AttemptPath>,
    runs: HashMap<Uuid, Run>,
    validation_errors: Vec<ValidationError>,
    review_flags: Vec<ReviewFlag>,
    run_summaries: HashMap<Uuid, RunSummary>,
    next_path_definition_id: i64,
    next_attempt_id: i64,
}

fn poc_matches_scope(inner: &Inner, poc: &Poc, scope: &Scope) -> bool {
    let Some(equipment) = inner.equipment.get(&poc.equipment_id) else {
        return scope.toolset.is_none() && scope.fab.is_none();
    };
    if let Some(toolset) = &scope.toolset {
        return &equipment.toolset_code == toolset;
    }
    if let Some(fab) = &scope.fab {
        return inner
            .toolsets
            .get(&equipment.toolset_code)
            .map(|t| &t.fab == fab)
            .unwrap_or(false);
    }
    true
}

/// In-memory implementation of `Store`, for tests and fixture-driven runs.
///
/// `load_nodes` ignores scope entirely (callers seed exactly the rows a test
/// needs, and the Network Store's traversable-set logic, §4.A, applies the
/// real node filtering once nodes are loaded); the coverage-universe queries
/// honor `scope.toolset`/`scope.fab` via `poc_matches_scope` since the Sampler
/// depends on them being accurate per-scope fractions.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                nodes: HashMap::new(),
                links: Vec::new(),
                toolsets: HashMap::new(),
                equipment: HashMap::new(),
                pocs: HashMap::new(),
                poc_by_node: HashMap::new(),
                connections: HashSet::new(),
                path_definitions: HashMap::new(),
                path_definitions_by_hash: HashMap::new(),
                path_tags: HashMap::new(),
                attempts: HashMap::new(),
                runs: HashMap::new(),
                validation_errors: Vec::new(),
                review_flags: Vec::new(),
                run_summaries: HashMap::new(),
                next_path_definition_id: 1,
                next_attempt_id: 1,
            }),
        }
    }

    pub async fn seed_node(&self, node: Node) {
        self.inner.write().await.nodes.insert(node.node_id, node);
    }

    pub async fn seed_link(&self, link: Link) {
        self.inner.write().await.links.push(link);
    }

    pub async fn seed_toolset(&self, toolset: Toolset) {
        self.inner
            .write()
            .await
            .toolsets
            .insert(toolset.code.clone(), toolset);
    }

    pub async fn seed_equipment(&self, equipment: Equipment) {
        self.inner.write().await.equipment.insert(equipment.id, equipment);
    }

    pub async fn seed_poc(&self, poc: Poc) {
        let mut w = self.inner.write().await;
        w.poc_by_node.insert(poc.node_id, poc.id);
        w.pocs.insert(poc.id, poc);
    }

    pub async fn seed_connection(&self, from_poc_id: i64, to_poc_id: i64) {
        self.inner.write().await.connections.insert((from_poc_id, to_poc_id));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_nodes(&self, _scope: &Scope) -> Result<Vec<Node>> {
        let r = self.inner.read().await;
        Ok(r.nodes.values().cloned().collect())
    }

    async fn load_links(&self, node_ids: &[NodeId]) -> Result<Vec<Link>> {
        let r = self.inner.read().await;
        let set: HashSet<NodeId> = node_ids.iter().copied().collect();
        Ok(r.links
            .iter()
            .filter(|l| set.contains(&l.start_node_id) || set.contains(&l.end_node_id))
            .cloned()
            .collect())
    }

    async fn load_toolsets(&self, scope: &Scope) -> Result<Vec<Toolset>> {
        let r = self.inner.read().await;
        Ok(r.toolsets
            .values()
            .filter(|t| scope.fab.as_deref().map_or(true, |fab| fab == t.fab))
            .filter(|t| t.is_active)
            .cloned()
            .collect())
    }

    async fn load_equipment(&self, toolset_code: &str) -> Result<Vec<Equipment>> {
        let r = self.inner.read().await;
        Ok(r.equipment
            .values()
            .filter(|e| e.toolset_code == toolset_code && e.is_active)
            .cloned()
            .collect())
    }

    async fn load_pocs(&self, equipment_id: i64) -> Result<Vec<Poc>> {
        let r = self.inner.read().await;
        Ok(r.pocs
            .values()
            .filter(|p| p.equipment_id == equipment_id && p.is_active)
            .cloned()
            .collect())
    }

    async fn poc_by_node(&self, node_id: NodeId) -> Result<Option<Poc>> {
        let r = self.inner.read().await;
        Ok(r.poc_by_node.get(&node_id).and_then(|id| r.pocs.get(id)).cloned())
    }

    async fn connection_is_valid(&self, from_poc_id: i64, to_poc_id: i64) -> Result<bool> {
        let r = self.inner.read().await;
        Ok(r.connections.contains(&(from_poc_id, to_poc_id)))
    }

    async fn connections_valid_batch(&self, pairs: &[(i64, i64)]) -> Result<HashSet<(i64, i64)>> {
        let r = self.inner.read().await;
        Ok(pairs
            .iter()
            .copied()
            .filter(|p| r.connections.contains(p))
            .collect())
    }

    async fn coverage_nodes(&self, scope: &Scope) -> Result<Vec<NodeId>> {
        let r = self.inner.read().await;
        let mut v: Vec<NodeId> = r
            .pocs
            .values()
            .filter(|p| p.is_active && poc_matches_scope(&r, p, scope))
            .map(|p| p.node_id)
            .collect();
        v.sort_unstable();
        v.dedup();
        Ok(v)
    }

    async fn coverage_links(&self, scope: &Scope) -> Result<Vec<(NodeId, NodeId)>> {
        let r = self.inner.read().await;
        let mut v: Vec<(NodeId, NodeId)> = r
            .connections
            .iter()
            .filter_map(|(from, to)| {
                let pf = r.pocs.get(from)?;
                let pt = r.pocs.get(to)?;
                if !poc_matches_scope(&r, pf, scope) || !poc_matches_scope(&r, pt, scope) {
                    return None;
                }
                let a = pf.node_id;
                let b = pt.node_id;
                Some((a.min(b), a.max(b)))
            })
            .collect();
        v.sort_unstable();
        v.dedup();
        Ok(v)
    }

    async fn find_path_definition_by_hash(&self, hash: &str) -> Result<Option<PathDefinition>> {
        let r = self.inner.read().await;
        Ok(r.path_definitions_by_hash
            .get(hash)
            .and_then(|id| r.path_definitions.get(id))
            .cloned())
    }

    async fn insert_path_definition(&self, def: &PathDefinition) -> Result<i64> {
        let mut w = self.inner.write().await;
        let id = w.next_path_definition_id;
        w.next_path_definition_id += 1;
        let mut stored = def.clone();
        stored.id = Some(id);
        w.path_definitions_by_hash.insert(stored.path_hash.clone(), id);
        w.path_definitions.insert(id, stored);
        Ok(id)
    }

    async fn insert_attempt_pick(&self, attempt: &AttemptPath) -> Result<i64> {
        let mut w = self.inner.write().await;
        let id = w.next_attempt_id;
        w.next_attempt_id += 1;
        let mut stored = attempt.clone();
        stored.id = Some(id);
        w.attempts.insert(id, stored);
        Ok(id)
    }

    async fn link_attempt_to_path(
        &self,
        attempt_id: i64,
        path_definition_id: i64,
        cost: f64,
        tested_at: Timestamp,
    ) -> Result<()> {
        let mut w = self.inner.write().await;
        let attempt = w
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| anyhow!("attempt not found: {attempt_id}"))?;
        attempt.path_definition_id = Some(path_definition_id);
        attempt.cost = Some(cost);
        attempt.tested_at = Some(tested_at);
        Ok(())
    }

    async fn latest_open_attempt(&self, run_id: Uuid) -> Result<Option<AttemptPath>> {
        let r = self.inner.read().await;
        Ok(r.attempts
            .values()
            .filter(|a| a.run_id == run_id && a.path_definition_id.is_none())
            .max_by_key(|a| a.id)
            .cloned())
    }

    async fn path_definitions_for_run(&self, run_id: Uuid) -> Result<Vec<PathDefinition>> {
        let r = self.inner.read().await;
        let ids: HashSet<i64> = r
            .attempts
            .values()
            .filter(|a| a.run_id == run_id)
            .filter_map(|a| a.path_definition_id)
            .collect();
        Ok(ids
            .into_iter()
            .filter_map(|id| r.path_definitions.get(&id).cloned())
            .collect())
    }

    async fn insert_run(&self, run: &Run) -> Result<()> {
        self.inner.write().await.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
        ended_at: Option<Timestamp>,
    ) -> Result<()> {
        let mut w = self.inner.write().await;
        let run = w.runs.get_mut(&run_id).ok_or_else(|| anyhow!("run not found: {run_id}"))?;
        run.status = status;
        if ended_at.is_some() {
            run.ended_at = ended_at;
        }
        Ok(())
    }

    async fn update_run_totals(
        &self,
        run_id: Uuid,
        total_nodes: u32,
        total_links: u32,
        total_coverage: f64,
    ) -> Result<()> {
        let mut w = self.inner.write().await;
        let run = w.runs.get_mut(&run_id).ok_or_else(|| anyhow!("run not found: {run_id}"))?;
        run.total_nodes = total_nodes;
        run.total_links = total_links;
        run.total_coverage = total_coverage;
        Ok(())
    }

    async fn insert_validation_error(&self, error: &ValidationError) -> Result<()> {
        self.inner.write().await.validation_errors.push(error.clone());
        Ok(())
    }

    async fn insert_path_tag(
        &self,
        path_definition_id: i64,
        outcome: PathTagOutcome,
        confidence: f64,
        source: &str,
    ) -> Result<()> {
        self.inner
            .write()
            .await
            .path_tags
            .insert(path_definition_id, (outcome, confidence, source.to_string()));
        Ok(())
    }

    async fn insert_review_flag(&self, flag: &ReviewFlag) -> Result<()> {
        self.inner.write().await.review_flags.push(flag.clone());
        Ok(())
    }

    async fn insert_run_summary(&self, summary: &RunSummary) -> Result<()> {
        self.inner
            .write()
            .await
            .run_summaries
            .insert(summary.run_id, summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NetObjType;

    fn node(id: NodeId) -> Node {
        Node {
            node_id: id,
            data_code: 1,
            utility_no: None,
            toolset_id: None,
            eq_poc_no: None,
            net_obj_type: NetObjType::Logical,
        }
    }

    #[tokio::test]
    async fn seeded_nodes_roundtrip() {
        let store = MemoryStore::new();
        store.seed_node(node(1)).await;
        store.seed_node(node(2)).await;
        let scope = Scope {
            fab: None,
            phase: None,
            model: None,
            toolset: None,
            utility_no: None,
            eq_poc_no: None,
            coverage_target: 0.8,
        };
        let nodes = store.load_nodes(&scope).await.unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[tokio::test]
    async fn path_definition_dedupes_by_hash() {
        let store = MemoryStore::new();
        let def = PathDefinition {
            id: None,
            path_hash: "abc".to_string(),
            source_type: SourceType::Random,
            scope: "M15|_|_|_".to_string(),
            node_count: 2,
            link_count: 1,
            total_length_mm: 2000.0,
            nodes: vec![1, 2],
            links: vec![],
            data_codes_scope: vec![],
            utilities_scope: vec![],
            references_scope: vec![],
        };
        let id1 = store.insert_path_definition(&def).await.unwrap();
        let found = store.find_path_definition_by_hash("abc").await.unwrap();
        assert_eq!(found.unwrap().id, Some(id1));
    }
}
