//! Orchestrator (component G): `execute_run`, the single entry point that
//! wires the Network Store, Sampler, Path Repository, Coverage Tracker, and
//! Validator into one run.

use crate::coverage::CoverageTracker;
use crate::error::SamplerError;
use crate::network::NetworkStore;
use crate::pathfinder::PathFinder;
use crate::repository::{PathAggregates, PathRepository};
use crate::sampler::{resolve_coverage_strategy, Sampler};
use crate::store::Store;
use crate::types::*;
use crate::validator::Validator;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

fn now_ms() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Civil calendar date from a Unix day count (Howard Hinnant's
/// `civil_from_days`), used only to render the `YYYYMMDD` run-tag prefix
/// without pulling in a date-handling dependency the core has no other use for.
fn civil_from_days(days_since_epoch: i64) -> (i64, u32, u32) {
    let z = days_since_epoch + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Deterministic run tag (§6): `YYYYMMDD_APPROACH_METHOD_COV(NNP)[_FAB][_PHASE][_TOOLSET]`
/// for RANDOM, `YYYYMMDD_APPROACH_METHOD_SCENARIO` for SCENARIO.
fn generate_tag(config: &RunConfig, started_at: Timestamp) -> String {
    let (y, m, d) = civil_from_days(started_at / 86_400_000);
    let date = format!("{y:04}{m:02}{d:02}");
    let method = config.method.to_uppercase();

    match config.approach {
        RunApproach::Scenario => {
            let scenario = config.scenario_code.clone().unwrap_or_else(|| "UNSPECIFIED".to_string());
            format!("{date}_SCENARIO_{method}_{scenario}")
        }
        RunApproach::Random => {
            let cov = (config.coverage_target * 100.0).round() as i64;
            let mut tag = format!("{date}_RANDOM_{method}_COV{cov}P");
            if let Some(fab) = &config.fab {
                tag.push('_');
                tag.push_str(fab);
            }
            if let Some(phase) = &config.phase_no {
                tag.push('_');
                tag.push_str(phase);
            }
            if let Some(toolset) = &config.toolset {
                tag.push('_');
                tag.push_str(toolset);
            }
            tag
        }
    }
}

/// Union of per-toolset coverage universes for a `grouped`/`adaptive`-expanded
/// scope; a single-toolset scope just delegates to the store directly.
async fn coverage_universe(store: &dyn Store, expanded: &ExpandedScope) -> Result<(Vec<NodeId>, Vec<(NodeId, NodeId)>)> {
    if expanded.toolsets.is_empty() {
        return Ok((store.coverage_nodes(&expanded.base).await?, store.coverage_links(&expanded.base).await?));
    }
    let mut nodes = HashSet::new();
    let mut links = HashSet::new();
    for code in &expanded.toolsets {
        let scoped = Scope {
            fab: None,
            phase: None,
            model: None,
            toolset: Some(code.clone()),
            utility_no: expanded.base.utility_no,
            eq_poc_no: expanded.base.eq_poc_no.clone(),
            coverage_target: expanded.base.coverage_target,
        };
        nodes.extend(store.coverage_nodes(&scoped).await?);
        links.extend(store.coverage_links(&scoped).await?);
    }
    Ok((nodes.into_iter().collect(), links.into_iter().collect()))
}

/// Top-level facade wiring the core's components together, mirroring the
/// teacher's `Arc<dyn Store>`-holding engine.
pub struct Orchestrator {
    store: Arc<dyn Store>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn execute_run(&self, config: RunConfig) -> Result<RunSummary> {
        let run_id = Uuid::now_v7();
        let started_at = now_ms();
        let scope = Scope {
            fab: config.fab.clone(),
            phase: config.phase_no.clone(),
            model: config.model_no.clone(),
            toolset: config.toolset.clone(),
            utility_no: None,
            eq_poc_no: None,
            coverage_target: config.coverage_target,
        };
        let tag = config.tag.clone().unwrap_or_else(|| generate_tag(&config, started_at));

        let span = tracing::info_span!("run", run_id = %run_id, tag = %tag);
        let _enter = span.enter();
        tracing::info!(approach = ?config.approach, method = %config.method, "run starting");

        let run = Run {
            id: run_id,
            approach: config.approach,
            method: config.method.clone(),
            scope: scope.clone(),
            coverage_target: config.coverage_target,
            tag,
            status: RunStatus::Running,
            started_at,
            ended_at: None,
            total_coverage: 0.0,
            total_nodes: 0,
            total_links: 0,
        };
        self.store.insert_run(&run).await?;

        match self.run_body(run_id, &config, &scope, started_at).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                tracing::error!(error = %err, "run failed");
                let _ = self.store.update_run_status(run_id, RunStatus::Failed, Some(now_ms())).await;
                Err(err)
            }
        }
    }

    async fn run_body(&self, run_id: Uuid, config: &RunConfig, scope: &Scope, started_at: Timestamp) -> Result<RunSummary> {
        let store = self.store.as_ref();
        let source_type = match config.approach {
            RunApproach::Random => SourceType::Random,
            RunApproach::Scenario => SourceType::Scenario,
        };

        let expanded = resolve_coverage_strategy(store, scope).await?;
        tracing::info!(strategy = ?expanded.strategy, target = expanded.base.coverage_target, "coverage strategy resolved");

        let (coverage_node_ids, coverage_link_pairs) = coverage_universe(store, &expanded).await?;
        let mut tracker = CoverageTracker::initialize(coverage_node_ids, coverage_link_pairs);
        self.store
            .update_run_totals(run_id, tracker.total_nodes() as u32, tracker.total_links() as u32, 0.0)
            .await?;

        let network_nodes = self.store.load_nodes(&expanded.base).await?;
        let node_ids: Vec<NodeId> = network_nodes.iter().map(|n| n.node_id).collect();
        let network_links = self.store.load_links(&node_ids).await?;
        let mut network = NetworkStore::new();
        // No single node is force-anchored: the loop below queries many
        // different (from, to) pairs across the run, not one fixed start.
        network.load(network_nodes, &network_links, &expanded.base, 0);

        let mut sampler = Sampler::seeded(store, &expanded, run_id).await?;
        let repository = PathRepository::new(store);
        let scope_tag = expanded.base.tag();

        let max_attempts = config.max_attempts;
        let timeout = Duration::from_secs(config.timeout_seconds);
        let deadline = Instant::now() + timeout;

        let mut attempts: u32 = 0;
        let mut paths_found: u32 = 0;
        let mut unique_paths: u32 = 0;
        let mut total_reviews: u32 = 0;
        let mut exhausted = false;

        while tracker.fraction() < expanded.base.coverage_target && attempts < max_attempts && Instant::now() < deadline {
            let pair = match sampler.draw().await {
                Ok(Some(pair)) => pair,
                Ok(None) => continue,
                Err(err) => {
                    if err.downcast_ref::<SamplerError>().map(|e| matches!(e, SamplerError::DrawExhausted)).unwrap_or(false) {
                        tracing::error!(error = %err, "sampler exhausted every toolset; ending run early");
                        exhausted = true;
                        break;
                    }
                    return Err(err);
                }
            };

            attempts += 1;
            let picked_at = now_ms();
            repository.store_attempt_pick(run_id, &pair.from_poc, &pair.to_poc, picked_at).await?;

            let pf = PathFinder::new(&network);
            let found = pf.find_shortest_between(pair.from_poc.node_id, pair.to_poc.node_id, None)?;

            match found {
                Some(result) => {
                    paths_found += 1;
                    let aggregates = PathAggregates {
                        data_codes_scope: result
                            .nodes
                            .iter()
                            .filter_map(|n| network.node_info(*n).map(|info| info.data_code))
                            .collect(),
                        utilities_scope: result
                            .nodes
                            .iter()
                            .filter_map(|n| network.node_info(*n).and_then(|info| info.utility_no))
                            .collect(),
                        references_scope: [&pair.from_poc, &pair.to_poc]
                            .into_iter()
                            .filter_map(|p| p.reference.clone())
                            .collect(),
                    };
                    repository
                        .store_path(run_id, &scope_tag, source_type, &result, aggregates, now_ms())
                        .await?;

                    let hash = crate::repository::compute_path_hash(
                        &result.nodes,
                        &result.links.iter().map(|l| l.link_id).collect::<Vec<_>>(),
                        source_type,
                        &scope_tag,
                    );
                    let before = tracker.fraction();
                    let (is_new, after) = tracker.update(&hash, &result.nodes);
                    if is_new {
                        unique_paths += 1;
                    }
                    tracing::debug!(from = pair.from_poc.node_id, to = pair.to_poc.node_id, delta = after - before, coverage = after, "coverage updated");
                }
                None => {
                    if pair.from_poc.is_used && pair.to_poc.is_used && pair.from_poc.utility_no.is_some() && pair.from_poc.utility_no == pair.to_poc.utility_no {
                        let flag = ReviewFlag {
                            id: None,
                            run_id,
                            flag_type: "CONNECTIVITY_ISSUE".to_string(),
                            severity: Severity::Medium,
                            status: ReviewFlagStatus::Open,
                            reason: format!(
                                "no path found between node {} and node {} despite matching utility {:?}",
                                pair.from_poc.node_id, pair.to_poc.node_id, pair.from_poc.utility_no
                            ),
                            object_type: ObjectType::Poc,
                            object_id: Some(pair.from_poc.id),
                            object_guid: None,
                            created_at: now_ms(),
                            notes: None,
                        };
                        self.store.insert_review_flag(&flag).await?;
                        total_reviews += 1;
                    }
                }
            }
        }

        let achieved_coverage = tracker.fraction();
        let ended_at = now_ms();
        self.store.update_run_status(run_id, RunStatus::Done, Some(ended_at)).await?;
        self.store
            .update_run_totals(run_id, tracker.total_nodes() as u32, tracker.total_links() as u32, achieved_coverage)
            .await?;
        tracing::info!(achieved_coverage, attempts, paths_found, unique_paths, "run completed");

        let validator = Validator::new(store);
        let outcomes = validator.validate_run(run_id).await?;
        let total_errors: u32 = outcomes.iter().map(|o| o.errors.len() as u32).sum();

        let completion_status = if achieved_coverage >= expanded.base.coverage_target {
            CompletionStatus::Completed
        } else if exhausted || attempts >= max_attempts || Instant::now() >= deadline {
            CompletionStatus::Partial
        } else {
            CompletionStatus::Completed
        };

        let summary = RunSummary {
            run_id,
            total_attempts: attempts,
            total_paths_found: paths_found,
            unique_paths,
            total_errors,
            total_reviews,
            target_coverage: expanded.base.coverage_target,
            achieved_coverage,
            coverage_efficiency: if expanded.base.coverage_target > 0.0 {
                achieved_coverage / expanded.base.coverage_target
            } else {
                0.0
            },
            success_rate: if attempts > 0 { paths_found as f64 / attempts as f64 } else { 0.0 },
            completion_status,
            execution_time_seconds: (ended_at - started_at) as f64 / 1000.0,
        };
        self.store.insert_run_summary(&summary).await?;
        tracing::info!(completion_status = ?summary.completion_status, "run summary written");

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::MemoryStore;
    use crate::types::{Flow, NetObjType};

    async fn seed_small_network(store: &MemoryStore) {
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
            let poc_node = node_base + 1;
            store
                .seed_poc(Poc {
                    id: eq_id,
                    equipment_id: eq_id,
                    node_id: poc_node,
                    code: "POC-1".into(),
                    utility_no: Some(1),
                    reference: Some("R".into()),
                    flow: Some(Flow::Out),
                    markers: Some("m".into()),
                    is_used: true,
                    is_loopback: false,
                    is_active: true,
                })
                .await;
            store
                .seed_node(Node {
                    node_id: poc_node,
                    data_code: 1,
                    utility_no: Some(1),
                    toolset_id: None,
                    eq_poc_no: None,
                    net_obj_type: NetObjType::Poc,
                })
                .await;
        }
        store.seed_connection(1, 2).await;
        store
            .seed_link(Link {
                link_id: 1,
                start_node_id: 11,
                end_node_id: 21,
                is_bidirected: true,
                cost: 1.0,
                net_obj_type: NetObjType::Poc,
            })
            .await;
    }

    #[tokio::test]
    async fn run_finds_a_path_and_reaches_coverage() {
        let memory = MemoryStore::new();
        seed_small_network(&memory).await;
        let store: Arc<dyn Store> = Arc::new(memory);

        let orchestrator = Orchestrator::new(store.clone());
        let config = RunConfig {
            approach: RunApproach::Random,
            method: "standard".into(),
            execution_mode: "unattended".into(),
            fab: Some("M15".into()),
            toolset: Some("TS-01".into()),
            phase_no: None,
            model_no: None,
            scenario_code: None,
            scenario_file: None,
            coverage_target: 0.5,
            max_attempts: 20,
            timeout_seconds: 5,
            tag: None,
        };
        let summary = orchestrator.execute_run(config).await.unwrap();
        assert!(summary.total_attempts > 0);
        assert_eq!(summary.completion_status, CompletionStatus::Completed);
    }
}
