//! Validator (component F): five ordered checks over a persisted
//! `PathDefinition`, each contributing zero or more typed `ValidationError`s,
//! aggregated into one `OverallStatus` and written back as a `tb_path_tags` row.

use crate::store::Store;
use crate::types::*;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use uuid::Uuid;

const MAX_REASONABLE_PATH_LENGTH: usize = 100;

/// The result of validating one `PathDefinition`.
#[derive(Debug, Clone)]
pub struct PathValidationOutcome {
    pub overall: OverallStatus,
    pub errors: Vec<ValidationError>,
}

fn overall_status(errors: &[ValidationError]) -> OverallStatus {
    if errors.iter().any(|e| e.severity == Severity::Critical) {
        OverallStatus::CriticalFailure
    } else if errors.iter().any(|e| e.severity == Severity::High) {
        OverallStatus::Failed
    } else if !errors.is_empty() {
        OverallStatus::Warning
    } else {
        OverallStatus::Passed
    }
}

fn base_error(run_id: Uuid, path_definition_id: Option<i64>, severity: Severity, scope: ErrorScope, error_type: &str) -> ValidationError {
    ValidationError {
        id: None,
        run_id,
        path_definition_id,
        severity,
        error_scope: scope,
        error_type: error_type.to_string(),
        object_type: ObjectType::Path,
        object_id: None,
        object_guid: None,
        error_message: String::new(),
        object_utility_no: None,
        object_flow: None,
        object_is_loopback: None,
    }
}

/// Runs the five ordered checks against persisted paths, using an injected
/// Store so it can run against a fixture or a live database identically.
pub struct Validator<'a> {
    store: &'a dyn Store,
    /// `(from_utility, to_utility) -> compatible`; empty means nothing is
    /// pre-approved, matching the original's unconfigured default (§4.I).
    compatibility: HashMap<(UtilityNo, UtilityNo), bool>,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            compatibility: HashMap::new(),
        }
    }

    pub fn with_compatibility(store: &'a dyn Store, compatibility: HashMap<(UtilityNo, UtilityNo), bool>) -> Self {
        Self { store, compatibility }
    }

    /// Validate every unique `PathDefinition` an orchestrator run has produced.
    pub async fn validate_run(&self, run_id: Uuid) -> Result<Vec<PathValidationOutcome>> {
        let defs = self.store.path_definitions_for_run(run_id).await?;
        let mut outcomes = Vec::with_capacity(defs.len());
        for def in &defs {
            outcomes.push(self.validate_path(run_id, def).await?);
        }
        Ok(outcomes)
    }

    /// Run all five checks against one path and persist the result.
    pub async fn validate_path(&self, run_id: Uuid, def: &PathDefinition) -> Result<PathValidationOutcome> {
        let path_definition_id = def.id;
        let mut errors = Vec::new();

        self.check_connectivity(run_id, def, &mut errors).await?;
        self.check_utility_consistency(run_id, def, &mut errors).await?;
        self.check_poc_properties(run_id, def, &mut errors).await?;
        self.check_path_continuity(run_id, def, &mut errors);
        self.check_flow_direction(run_id, def, &mut errors).await?;

        let overall = overall_status(&errors);
        for error in &errors {
            self.store.insert_validation_error(error).await?;
        }

        let outcome_tag = match overall {
            OverallStatus::Passed => PathTagOutcome::ValidatedOk,
            OverallStatus::Warning => PathTagOutcome::ValidatedWarn,
            OverallStatus::Failed => PathTagOutcome::ValidatedFail,
            OverallStatus::CriticalFailure => PathTagOutcome::ValidatedCrit,
        };
        let id = path_definition_id.ok_or_else(|| anyhow!("path definition has no persisted id"))?;
        self.store.insert_path_tag(id, outcome_tag, 1.0, "SYSTEM").await?;

        if !errors.is_empty() {
            tracing::warn!(path_hash = %def.path_hash, overall = ?overall, errors = errors.len(), "validator found issues");
        }

        Ok(PathValidationOutcome { overall, errors })
    }

    /// Check 1: node count, start/end match, and consecutive PoC connections
    /// (resolved in one batched lookup rather than N+1).
    async fn check_connectivity(&self, run_id: Uuid, def: &PathDefinition, errors: &mut Vec<ValidationError>) -> Result<()> {
        if def.nodes.len() < 2 {
            errors.push(ValidationError {
                error_message: format!("path has fewer than 2 nodes ({})", def.nodes.len()),
                ..base_error(run_id, def.id, Severity::High, ErrorScope::Connectivity, "PATH_TOO_SHORT")
            });
            return Ok(());
        }

        let start_poc = self.store.poc_by_node(def.nodes[0]).await?;
        let end_poc = self.store.poc_by_node(*def.nodes.last().unwrap()).await?;
        if start_poc.as_ref().map(|p| p.node_id) != Some(def.nodes[0]) {
            errors.push(ValidationError {
                error_message: format!("start node {} has no PoC", def.nodes[0]),
                object_id: Some(def.nodes[0]),
                object_type: ObjectType::Node,
                ..base_error(run_id, def.id, Severity::High, ErrorScope::Connectivity, "START_NOT_POC")
            });
        }
        let last_node = *def.nodes.last().unwrap();
        if end_poc.as_ref().map(|p| p.node_id) != Some(last_node) {
            errors.push(ValidationError {
                error_message: format!("end node {last_node} has no PoC"),
                object_id: Some(last_node),
                object_type: ObjectType::Node,
                ..base_error(run_id, def.id, Severity::High, ErrorScope::Connectivity, "END_NOT_POC")
            });
        }

        let mut pairs = Vec::new();
        let mut poc_pairs = Vec::new();
        for window in def.nodes.windows(2) {
            let (a, b) = (window[0], window[1]);
            let pa = self.store.poc_by_node(a).await?;
            let pb = self.store.poc_by_node(b).await?;
            if let (Some(pa), Some(pb)) = (pa, pb) {
                pairs.push((pa.id, pb.id));
                poc_pairs.push((a, b, pa.id, pb.id));
            }
        }
        let valid = self.store.connections_valid_batch(&pairs).await?;
        for (a, b, pa_id, pb_id) in poc_pairs {
            if !valid.contains(&(pa_id, pb_id)) {
                errors.push(ValidationError {
                    error_message: format!("no valid PoC connection from node {a} to node {b}"),
                    object_id: Some(a),
                    object_type: ObjectType::Node,
                    ..base_error(run_id, def.id, Severity::High, ErrorScope::Connectivity, "INVALID_POC_CONNECTION")
                });
            }
        }
        Ok(())
    }

    /// Check 2: utility-number transitions against the configured compatibility
    /// table; a start/end mismatch alone is a WARNING rather than an error.
    async fn check_utility_consistency(&self, run_id: Uuid, def: &PathDefinition, errors: &mut Vec<ValidationError>) -> Result<()> {
        let mut utilities = Vec::with_capacity(def.nodes.len());
        for &n in &def.nodes {
            let u = self.store.poc_by_node(n).await?.and_then(|p| p.utility_no);
            utilities.push(u);
        }

        for pair in utilities.windows(2) {
            if let (Some(u), Some(v)) = (pair[0], pair[1]) {
                if u != v && !self.compatibility.get(&(u, v)).copied().unwrap_or(false) {
                    errors.push(ValidationError {
                        error_message: format!("incompatible utility transition {u} -> {v}"),
                        object_utility_no: Some(u),
                        ..base_error(run_id, def.id, Severity::Medium, ErrorScope::Utility, "UTILITY_MISMATCH")
                    });
                }
            }
        }

        if let (Some(Some(start_u)), Some(Some(end_u))) = (utilities.first(), utilities.last()) {
            if start_u != end_u && !self.compatibility.get(&(*start_u, *end_u)).copied().unwrap_or(false) {
                errors.push(ValidationError {
                    error_message: format!("start utility {start_u} differs from end utility {end_u}"),
                    object_utility_no: Some(*start_u),
                    ..base_error(run_id, def.id, Severity::Warning, ErrorScope::Utility, "START_END_UTILITY_MISMATCH")
                });
            }
        }
        Ok(())
    }

    /// Check 3: start/end PoC property completeness.
    async fn check_poc_properties(&self, run_id: Uuid, def: &PathDefinition, errors: &mut Vec<ValidationError>) -> Result<()> {
        for &node_id in [def.nodes.first(), def.nodes.last()].into_iter().flatten() {
            let Some(poc) = self.store.poc_by_node(node_id).await? else {
                errors.push(ValidationError {
                    error_message: format!("node {node_id} has no PoC to validate properties against"),
                    object_id: Some(node_id),
                    object_type: ObjectType::Node,
                    ..base_error(run_id, def.id, Severity::High, ErrorScope::Qa, "POC_MISSING")
                });
                continue;
            };
            let mut warn = |error_type: &str, message: String| {
                errors.push(ValidationError {
                    error_message: message,
                    object_id: Some(poc.id),
                    object_type: ObjectType::Poc,
                    object_utility_no: poc.utility_no,
                    object_flow: poc.flow,
                    object_is_loopback: Some(poc.is_loopback),
                    ..base_error(run_id, def.id, Severity::Warning, ErrorScope::Qa, error_type)
                });
            };
            if poc.utility_no.is_none() {
                warn("POC_MISSING_UTILITY", format!("PoC {} has no utility_no", poc.id));
            }
            if poc.markers.is_none() {
                warn("POC_MISSING_MARKERS", format!("PoC {} has no markers", poc.id));
            }
            if poc.reference.is_none() {
                warn("POC_MISSING_REFERENCE", format!("PoC {} has no reference", poc.id));
            }
            if poc.flow.is_none() {
                warn("POC_MISSING_FLOW", format!("PoC {} has no flow", poc.id));
            }
            if !poc.is_used {
                warn("POC_UNUSED", format!("PoC {} is not marked used", poc.id));
            }
            if poc.is_loopback {
                warn("POC_LOOPBACK", format!("PoC {} is a loopback", poc.id));
            }
        }
        Ok(())
    }

    /// Check 4: duplicate-node and excessive-length continuity rules.
    fn check_path_continuity(&self, run_id: Uuid, def: &PathDefinition, errors: &mut Vec<ValidationError>) {
        for window in def.nodes.windows(2) {
            if window[0] == window[1] {
                errors.push(ValidationError {
                    error_message: format!("node {} repeats consecutively", window[0]),
                    object_id: Some(window[0]),
                    object_type: ObjectType::Node,
                    ..base_error(run_id, def.id, Severity::Medium, ErrorScope::Connectivity, "CONSECUTIVE_DUPLICATE_NODE")
                });
            }
        }
        if def.nodes.len() > MAX_REASONABLE_PATH_LENGTH {
            errors.push(ValidationError {
                error_message: format!("path has {} nodes, exceeding the {MAX_REASONABLE_PATH_LENGTH}-node guideline", def.nodes.len()),
                ..base_error(run_id, def.id, Severity::Warning, ErrorScope::Qa, "PATH_LENGTH_WARNING")
            });
        }
    }

    /// Check 5: flow-direction transitions between consecutive PoCs.
    async fn check_flow_direction(&self, run_id: Uuid, def: &PathDefinition, errors: &mut Vec<ValidationError>) -> Result<()> {
        let mut flows = Vec::with_capacity(def.nodes.len());
        for &n in &def.nodes {
            let f = self.store.poc_by_node(n).await?.and_then(|p| p.flow);
            flows.push(f);
        }
        for (i, pair) in flows.windows(2).enumerate() {
            if let (Some(from), Some(to)) = (pair[0], pair[1]) {
                match (from, to) {
                    (Flow::Out, Flow::In) => {}
                    (Flow::In, Flow::Out) => {
                        errors.push(ValidationError {
                            error_message: format!("flow reverses IN -> OUT at node {}", def.nodes[i]),
                            object_id: Some(def.nodes[i]),
                            object_type: ObjectType::Node,
                            object_flow: Some(from),
                            ..base_error(run_id, def.id, Severity::Warning, ErrorScope::Flow, "FLOW_REVERSED")
                        });
                    }
                    _ => {
                        errors.push(ValidationError {
                            error_message: format!("unexpected flow pair at node {}", def.nodes[i]),
                            object_id: Some(def.nodes[i]),
                            object_type: ObjectType::Node,
                            object_flow: Some(from),
                            ..base_error(run_id, def.id, Severity::Medium, ErrorScope::Flow, "FLOW_INCONSISTENT")
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::MemoryStore;

    fn poc(id: i64, node_id: NodeId, flow: Option<Flow>, utility_no: Option<UtilityNo>) -> Poc {
        Poc {
            id,
            equipment_id: 1,
            node_id,
            code: format!("POC-{id}"),
            utility_no,
            reference: Some("ref".to_string()),
            flow,
            markers: Some("m".to_string()),
            is_used: true,
            is_loopback: false,
            is_active: true,
        }
    }

    fn def(nodes: Vec<NodeId>) -> PathDefinition {
        PathDefinition {
            id: Some(1),
            path_hash: "h".to_string(),
            source_type: SourceType::Random,
            scope: "_|_|_|_".to_string(),
            node_count: nodes.len() as u32,
            link_count: nodes.len().saturating_sub(1) as u32,
            total_length_mm: 0.0,
            nodes,
            links: vec![],
            data_codes_scope: vec![],
            utilities_scope: vec![],
            references_scope: vec![],
        }
    }

    #[tokio::test]
    async fn clean_path_yields_passed() {
        let store = MemoryStore::new();
        store.seed_poc(poc(1, 1, Some(Flow::Out), Some(10))).await;
        store.seed_poc(poc(2, 2, Some(Flow::In), Some(10))).await;
        store.seed_connection(1, 2).await;

        let validator = Validator::new(&store);
        let outcome = validator.validate_path(Uuid::new_v4(), &def(vec![1, 2])).await.unwrap();
        assert_eq!(outcome.overall, OverallStatus::Passed);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn missing_connection_is_high_severity() {
        let store = MemoryStore::new();
        store.seed_poc(poc(1, 1, Some(Flow::Out), Some(10))).await;
        store.seed_poc(poc(2, 2, Some(Flow::In), Some(10))).await;
        // no seed_connection: the pair is unregistered

        let validator = Validator::new(&store);
        let outcome = validator.validate_path(Uuid::new_v4(), &def(vec![1, 2])).await.unwrap();
        assert_eq!(outcome.overall, OverallStatus::Failed);
        assert!(outcome.errors.iter().any(|e| e.error_type == "INVALID_POC_CONNECTION"));
    }

    #[tokio::test]
    async fn consecutive_duplicate_node_is_medium() {
        let store = MemoryStore::new();
        store.seed_poc(poc(1, 1, Some(Flow::Out), Some(10))).await;
        store.seed_poc(poc(2, 3, Some(Flow::In), Some(10))).await;
        store.seed_connection(1, 2).await;

        let validator = Validator::new(&store);
        let outcome = validator.validate_path(Uuid::new_v4(), &def(vec![1, 2, 2, 3])).await.unwrap();
        assert!(outcome.errors.iter().any(|e| e.error_type == "CONSECUTIVE_DUPLICATE_NODE" && e.severity == Severity::Medium));
    }

    #[tokio::test]
    async fn too_short_path_is_high_severity() {
        let store = MemoryStore::new();
        let validator = Validator::new(&store);
        let outcome = validator.validate_path(Uuid::new_v4(), &def(vec![1])).await.unwrap();
        assert_eq!(outcome.overall, OverallStatus::Failed);
    }
}
