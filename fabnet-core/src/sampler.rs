//! Sampler (component E): hierarchical bias-mitigated draw of fab/PoC pairs,
//! plus the intelligent coverage strategy that resolves a run's effective
//! scope and target before the draw loop starts.

use crate::error::SamplerError;
use crate::store::Store;
use crate::types::{CoverageStrategy, Equipment, ExpandedScope, NodeId, Poc, Scope, Toolset};
use anyhow::Result;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};

const MAX_TOOLSET_ATTEMPTS: u32 = 10;
const TOOLSET_RESET_FRACTION: f64 = 0.8;
const USED_POC_PREFERENCE: f64 = 0.7;
const DEDUP_RETRIES: u32 = 3;

/// A drawn, distinct pair of PoCs, ready for `PathFinder::find_shortest_between`.
#[derive(Debug, Clone)]
pub struct SampledPair {
    pub from_poc: Poc,
    pub to_poc: Poc,
}

fn weighted_pick<'a, T>(rng: &mut StdRng, items: &'a [T], usage: impl Fn(&T) -> u32) -> &'a T {
    let weights: Vec<f64> = items.iter().map(|i| 1.0 / (1.0 + usage(i) as f64)).collect();
    let dist = WeightedIndex::new(&weights).expect("non-empty, positive weights");
    &items[dist.sample(rng)]
}

/// Compare a run's scope against the factory-wide PoC universe and decide
/// which of the four coverage strategies applies (§4.E).
pub async fn resolve_coverage_strategy(store: &dyn Store, scope: &Scope) -> Result<ExpandedScope> {
    let factory_wide = Scope {
        fab: None,
        phase: None,
        model: None,
        toolset: None,
        utility_no: None,
        eq_poc_no: None,
        coverage_target: scope.coverage_target,
    };
    let factory_total = store.coverage_nodes(&factory_wide).await?.len().max(1);
    let scope_total = store.coverage_nodes(scope).await?.len();
    let potential = scope_total as f64 / factory_total as f64;

    if potential >= scope.coverage_target {
        tracing::info!(potential, target = scope.coverage_target, "coverage strategy: standard");
        return Ok(ExpandedScope {
            base: scope.clone(),
            toolsets: Vec::new(),
            strategy: CoverageStrategy::Standard,
        });
    }

    let is_critical = match &scope.toolset {
        Some(code) => store.load_equipment(code).await?.len() > 100,
        None => false,
    };
    if is_critical {
        let adjusted = scope.coverage_target.min(potential * 0.8);
        let mut base = scope.clone();
        base.coverage_target = adjusted;
        tracing::warn!(potential, adjusted, "coverage strategy: intensive (critical toolset)");
        return Ok(ExpandedScope {
            base,
            toolsets: Vec::new(),
            strategy: CoverageStrategy::Intensive,
        });
    }

    if let Some((toolsets, achieved)) = try_grouped(store, scope, factory_total).await? {
        tracing::info!(?toolsets, achieved, "coverage strategy: grouped");
        return Ok(ExpandedScope {
            base: scope.clone(),
            toolsets,
            strategy: CoverageStrategy::Grouped,
        });
    }

    let mut widened = scope.clone();
    widened.toolset = None;
    let fab_total = store.coverage_nodes(&widened).await?.len();
    let fab_potential = fab_total as f64 / factory_total as f64;
    widened.coverage_target = fab_potential * 0.9;
    tracing::warn!(fab_potential, adjusted = widened.coverage_target, "coverage strategy: adaptive");
    Ok(ExpandedScope {
        base: widened,
        toolsets: Vec::new(),
        strategy: CoverageStrategy::Adaptive,
    })
}

async fn try_grouped(
    store: &dyn Store,
    scope: &Scope,
    factory_total: usize,
) -> Result<Option<(Vec<String>, f64)>> {
    let mut related = store
        .load_toolsets(&Scope {
            fab: scope.fab.clone(),
            phase: None,
            model: None,
            toolset: None,
            utility_no: None,
            eq_poc_no: None,
            coverage_target: scope.coverage_target,
        })
        .await?;
    related.retain(|t| t.is_active);
    if let Some(phase) = &scope.phase {
        related.retain(|t| t.phase.as_deref() == Some(phase.as_str()));
    }
    if let Some(model) = &scope.model {
        related.retain(|t| t.model_no.as_deref() == Some(model.as_str()));
    }
    related.sort_by(|a, b| a.code.cmp(&b.code));

    let mut covered: HashSet<NodeId> = HashSet::new();
    let mut chosen = Vec::new();
    for t in &related {
        let nodes = store
            .coverage_nodes(&Scope {
                fab: None,
                phase: None,
                model: None,
                toolset: Some(t.code.clone()),
                utility_no: scope.utility_no,
                eq_poc_no: scope.eq_poc_no.clone(),
                coverage_target: scope.coverage_target,
            })
            .await?;
        covered.extend(nodes);
        chosen.push(t.code.clone());
        let potential = covered.len() as f64 / factory_total as f64;
        if potential >= scope.coverage_target {
            return Ok(Some((chosen, potential)));
        }
    }
    Ok(None)
}

async fn candidate_toolsets(store: &dyn Store, expanded: &ExpandedScope) -> Result<Vec<Toolset>> {
    let mut toolsets = store.load_toolsets(&expanded.base).await?;
    if !expanded.toolsets.is_empty() {
        let allowed: HashSet<&str> = expanded.toolsets.iter().map(String::as_str).collect();
        toolsets.retain(|t| allowed.contains(t.code.as_str()));
    } else if let Some(code) = &expanded.base.toolset {
        toolsets.retain(|t| &t.code == code);
    }
    Ok(toolsets)
}

/// Draws equipment/PoC pairs against a resolved scope, tracking usage counts
/// and per-run seen-pairs so repeated draws converge on full coverage rather
/// than oversampling the same few hot nodes.
pub struct Sampler<'a> {
    store: &'a dyn Store,
    toolsets: Vec<Toolset>,
    rng: StdRng,
    fab_usage: HashMap<String, u32>,
    toolset_usage: HashMap<String, u32>,
    equipment_usage: HashMap<i64, u32>,
    poc_usage: HashMap<i64, u32>,
    toolset_failures: HashMap<String, u32>,
    seen_pairs: HashSet<(NodeId, NodeId)>,
}

impl<'a> Sampler<'a> {
    /// Build a sampler over the already-resolved `ExpandedScope`, with a
    /// reproducible generator seeded from `run_id` (§4.E "Reproducibility").
    pub async fn seeded(store: &'a dyn Store, expanded: &ExpandedScope, run_id: uuid::Uuid) -> Result<Self> {
        let bits = run_id.as_u128();
        let seed = (bits as u64) ^ ((bits >> 64) as u64);
        Self::new(store, expanded, StdRng::seed_from_u64(seed)).await
    }

    /// Build a sampler seeded from OS entropy, for production runs.
    pub async fn from_entropy(store: &'a dyn Store, expanded: &ExpandedScope) -> Result<Self> {
        Self::new(store, expanded, StdRng::from_entropy()).await
    }

    async fn new(store: &'a dyn Store, expanded: &ExpandedScope, rng: StdRng) -> Result<Self> {
        let toolsets = candidate_toolsets(store, expanded).await?;
        Ok(Self {
            store,
            toolsets,
            rng,
            fab_usage: HashMap::new(),
            toolset_usage: HashMap::new(),
            equipment_usage: HashMap::new(),
            poc_usage: HashMap::new(),
            toolset_failures: HashMap::new(),
            seen_pairs: HashSet::new(),
        })
    }

    fn maybe_reset_failed_toolsets(&mut self) {
        let total = self.toolsets.len();
        if total == 0 {
            return;
        }
        let failed = self
            .toolsets
            .iter()
            .filter(|t| self.toolset_failures.get(&t.code).copied().unwrap_or(0) >= MAX_TOOLSET_ATTEMPTS)
            .count();
        if failed as f64 / total as f64 >= TOOLSET_RESET_FRACTION {
            tracing::warn!(total, failed, "resetting exhausted-toolset set to avoid livelock");
            self.toolset_failures.clear();
        }
    }

    fn record_toolset_failure(&mut self, toolset_code: &str) {
        *self.toolset_failures.entry(toolset_code.to_string()).or_insert(0) += 1;
    }

    fn is_failed(&self, toolset_code: &str) -> bool {
        self.toolset_failures.get(toolset_code).copied().unwrap_or(0) >= MAX_TOOLSET_ATTEMPTS
    }

    async fn pick_poc(&mut self, equipment: &Equipment) -> Result<Option<Poc>> {
        let pocs = self.store.load_pocs(equipment.id).await?;
        let (used, unused): (Vec<Poc>, Vec<Poc>) = pocs.into_iter().partition(|p| p.is_used);
        let pool = if !used.is_empty() && (unused.is_empty() || self.rng.gen_bool(USED_POC_PREFERENCE)) {
            &used
        } else if !unused.is_empty() {
            &unused
        } else {
            return Ok(None);
        };
        let poc_usage = &self.poc_usage;
        Ok(Some(weighted_pick(&mut self.rng, pool, |p| poc_usage.get(&p.id).copied().unwrap_or(0)).clone()))
    }

    /// One full draw: fab → toolset → equipment pair → PoC pair → dedup.
    /// Returns `Ok(None)` on a dry draw the orchestrator should simply retry;
    /// fails with `SamplerError::DrawExhausted` only once the whole scope is spent.
    pub async fn draw(&mut self) -> Result<Option<SampledPair>> {
        self.maybe_reset_failed_toolsets();

        let mut fabs: Vec<String> = self
            .toolsets
            .iter()
            .filter(|t| !self.is_failed(&t.code))
            .map(|t| t.fab.clone())
            .collect();
        fabs.sort();
        fabs.dedup();
        if fabs.is_empty() {
            return Err(SamplerError::DrawExhausted.into());
        }
        let fab_usage = &self.fab_usage;
        let fab = weighted_pick(&mut self.rng, &fabs, |f| fab_usage.get(f).copied().unwrap_or(0)).clone();

        let candidates: Vec<Toolset> = self
            .toolsets
            .iter()
            .filter(|t| t.fab == fab && !self.is_failed(&t.code))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(SamplerError::DrawExhausted.into());
        }
        let toolset_usage = &self.toolset_usage;
        let toolset = weighted_pick(&mut self.rng, &candidates, |t| toolset_usage.get(&t.code).copied().unwrap_or(0)).clone();

        let equipment = self.store.load_equipment(&toolset.code).await?;
        if equipment.len() < 2 {
            self.record_toolset_failure(&toolset.code);
            return Ok(None);
        }

        let equipment_usage = &self.equipment_usage;
        let eq1 = weighted_pick(&mut self.rng, &equipment, |e| equipment_usage.get(&e.id).copied().unwrap_or(0)).clone();
        let remaining: Vec<Equipment> = equipment.into_iter().filter(|e| e.id != eq1.id).collect();
        let equipment_usage = &self.equipment_usage;
        let eq2 = weighted_pick(&mut self.rng, &remaining, |e| equipment_usage.get(&e.id).copied().unwrap_or(0)).clone();

        for _ in 0..DEDUP_RETRIES {
            let poc1 = self.pick_poc(&eq1).await?;
            let poc2 = self.pick_poc(&eq2).await?;
            let (Some(p1), Some(p2)) = (poc1, poc2) else {
                self.record_toolset_failure(&toolset.code);
                return Ok(None);
            };
            let key = (p1.node_id.min(p2.node_id), p1.node_id.max(p2.node_id));
            if self.seen_pairs.insert(key) {
                *self.fab_usage.entry(fab.clone()).or_insert(0) += 1;
                *self.toolset_usage.entry(toolset.code.clone()).or_insert(0) += 1;
                *self.equipment_usage.entry(eq1.id).or_insert(0) += 1;
                *self.equipment_usage.entry(eq2.id).or_insert(0) += 1;
                *self.poc_usage.entry(p1.id).or_insert(0) += 1;
                *self.poc_usage.entry(p2.id).or_insert(0) += 1;
                tracing::debug!(toolset = %toolset.code, from = p1.node_id, to = p2.node_id, "pair drawn");
                return Ok(Some(SampledPair { from_poc: p1, to_poc: p2 }));
            }
        }

        self.record_toolset_failure(&toolset.code);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::MemoryStore;
    use crate::types::NetObjType;

    fn scope() -> Scope {
        Scope {
            fab: None,
            phase: None,
            model: None,
            toolset: None,
            utility_no: None,
            eq_poc_no: None,
            coverage_target: 0.5,
        }
    }

    async fn seed_basic(store: &MemoryStore) {
        store
            .seed_toolset(Toolset {
                code: "TS-01".into(),
                fab: "M15".into(),
                phase: None,
                model_no: None,
                phase_no: None,
                is_active: true,
            })
            .await;
        for (eq_id, node_base) in [(1, 10), (2, 20)] {
            store
                .seed_equipment(Equipment {
                    id: eq_id,
                    toolset_code: "TS-01".into(),
                    guid: uuid::Uuid::new_v4(),
                    node_id: node_base,
                    data_code: 15000,
                    is_active: true,
                })
                .await;
            store
                .seed_poc(Poc {
                    id: eq_id,
                    equipment_id: eq_id,
                    node_id: node_base + 1,
                    code: "POC-1".into(),
                    utility_no: Some(1),
                    reference: None,
                    flow: None,
                    markers: None,
                    is_used: true,
                    is_loopback: false,
                    is_active: true,
                })
                .await;
            store
                .seed_node(crate::types::Node {
                    node_id: node_base + 1,
                    data_code: 1,
                    utility_no: Some(1),
                    toolset_id: None,
                    eq_poc_no: None,
                    net_obj_type: NetObjType::Poc,
                })
                .await;
        }
    }

    #[tokio::test]
    async fn draws_a_pair_from_two_equipments() {
        let store = MemoryStore::new();
        seed_basic(&store).await;
        let expanded = ExpandedScope {
            base: scope(),
            toolsets: Vec::new(),
            strategy: CoverageStrategy::Standard,
        };
        let mut sampler = Sampler::seeded(&store, &expanded, uuid::Uuid::new_v4()).await.unwrap();
        let pair = sampler.draw().await.unwrap();
        assert!(pair.is_some());
        let pair = pair.unwrap();
        assert_ne!(pair.from_poc.node_id, pair.to_poc.node_id);
    }

    #[tokio::test]
    async fn insufficient_equipment_yields_dry_draw() {
        let store = MemoryStore::new();
        store
            .seed_toolset(Toolset {
                code: "TS-02".into(),
                fab: "M16".into(),
                phase: None,
                model_no: None,
                phase_no: None,
                is_active: true,
            })
            .await;
        store
            .seed_equipment(Equipment {
                id: 1,
                toolset_code: "TS-02".into(),
                guid: uuid::Uuid::new_v4(),
                node_id: 1,
                data_code: 15000,
                is_active: true,
            })
            .await;
        let expanded = ExpandedScope {
            base: scope(),
            toolsets: Vec::new(),
            strategy: CoverageStrategy::Standard,
        };
        let mut sampler = Sampler::seeded(&store, &expanded, uuid::Uuid::new_v4()).await.unwrap();
        let pair = sampler.draw().await.unwrap();
        assert!(pair.is_none());
    }

    #[tokio::test]
    async fn seeded_draws_are_deterministic() {
        let store = MemoryStore::new();
        seed_basic(&store).await;
        let run_id = uuid::Uuid::new_v4();
        let expanded = ExpandedScope {
            base: scope(),
            toolsets: Vec::new(),
            strategy: CoverageStrategy::Standard,
        };
        let mut s1 = Sampler::seeded(&store, &expanded, run_id).await.unwrap();
        let mut s2 = Sampler::seeded(&store, &expanded, run_id).await.unwrap();
        let p1 = s1.draw().await.unwrap();
        let p2 = s2.draw().await.unwrap();
        assert_eq!(p1.map(|p| p.from_poc.id), p2.map(|p| p.from_poc.id));
    }
}
