use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

// ─── Scalar aliases ───────────────────────────────────────────

/// Network node identifier, as loaded from `nw_nodes.node_id`.
pub type NodeId = i64;

/// Network link identifier, as loaded from `nw_links.id`.
pub type LinkId = i64;

/// Opaque class tag on a node (e.g. `15000` conventionally means "equipment").
pub type DataCode = i64;

/// Opaque utility identifier (nitrogen, process water, ...).
pub type UtilityNo = i64;

/// Epoch milliseconds (UTC).
pub type Timestamp = i64;

// ─── Network graph ────────────────────────────────────────────

/// Logical classification of a network object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetObjType {
    Logical,
    Poc,
    Virtual,
}

/// A vertex in the utility network graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub data_code: DataCode,
    pub utility_no: Option<UtilityNo>,
    pub toolset_id: Option<i64>,
    pub eq_poc_no: Option<String>,
    pub net_obj_type: NetObjType,
}

/// A directed (or bidirected) edge between two nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub link_id: LinkId,
    pub start_node_id: NodeId,
    pub end_node_id: NodeId,
    pub is_bidirected: bool,
    pub cost: f64,
    pub net_obj_type: NetObjType,
}

impl Link {
    /// Cost as stored, with the zero-cost-means-unit-cost substitution applied.
    pub fn effective_cost(&self) -> f64 {
        if self.cost <= 0.0 {
            1.0
        } else {
            self.cost
        }
    }
}

// ─── Sampling universe ────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Toolset {
    pub code: String,
    pub fab: String,
    pub phase: Option<String>,
    pub model_no: Option<String>,
    pub phase_no: Option<String>,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: i64,
    pub toolset_code: String,
    pub guid: Uuid,
    pub node_id: NodeId,
    pub data_code: DataCode,
    pub is_active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    In,
    Out,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Poc {
    pub id: i64,
    pub equipment_id: i64,
    pub node_id: NodeId,
    pub code: String,
    pub utility_no: Option<UtilityNo>,
    pub reference: Option<String>,
    pub flow: Option<Flow>,
    pub markers: Option<String>,
    pub is_used: bool,
    pub is_loopback: bool,
    pub is_active: bool,
}

// ─── Scope ────────────────────────────────────────────────────

/// The filter context for one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub fab: Option<String>,
    pub phase: Option<String>,
    pub model: Option<String>,
    pub toolset: Option<String>,
    /// Path filter: `Some(n) if n > 0` restricts the traversable set to nodes
    /// whose `utility_no` equals `n` (§4.A).
    pub utility_no: Option<i64>,
    /// Path filter: substring match against `Node::eq_poc_no`, case-insensitive.
    pub eq_poc_no: Option<String>,
    pub coverage_target: f64,
}

impl Scope {
    /// A stable string for path-hash scope tagging (§6), e.g. `"M15|PHASE1|_|TS-01"`.
    pub fn tag(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.fab.as_deref().unwrap_or("_"),
            self.phase.as_deref().unwrap_or("_"),
            self.model.as_deref().unwrap_or("_"),
            self.toolset.as_deref().unwrap_or("_"),
        )
    }
}

/// A scope that has been widened to cover more than one toolset (§4.E "grouped"/"adaptive").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpandedScope {
    pub base: Scope,
    pub toolsets: Vec<String>,
    pub strategy: CoverageStrategy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverageStrategy {
    Standard,
    Intensive,
    Grouped,
    Adaptive,
}

// ─── Path finder results ──────────────────────────────────────

/// Why a node terminated a traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointKind {
    /// A true graph leaf: no outgoing neighbors at all.
    Leaf,
    /// Matched one of the caller's target data codes.
    Target,
    /// No traversable neighbor under the active scope filters.
    Boundary,
}

/// Per-path-local role of a node, assigned after all paths for an operation are found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeFlag {
    /// Start of the path.
    Start,
    /// Terminal leaf.
    Leaf,
    /// Terminal target/generic endpoint.
    End,
    /// Terminal filter boundary.
    Frontier,
    /// Intermediate node shared by more than one path.
    Convergence,
    /// Intermediate node on exactly one path.
    Intermediate,
}

/// One link as emitted in a discovered path, in traversal order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathLink {
    pub seq: u32,
    pub link_id: LinkId,
    pub start_node_id: NodeId,
    pub end_node_id: NodeId,
    pub cost: f64,
    /// True when the link was traversed opposite its stored `(start, end)` orientation.
    pub reverse: bool,
}

/// The algorithm that produced a `PathResult`, persisted as `nw_paths.algorithm`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    DijkstraDownstream,
    DfsDownstream,
}

/// One discovered path from a start node to a classified endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub algorithm: Algorithm,
    pub start_node_id: NodeId,
    pub end_node_id: NodeId,
    pub end_kind: EndpointKind,
    pub nodes: Vec<NodeId>,
    pub links: Vec<PathLink>,
    pub total_cost: f64,
}

impl PathResult {
    pub fn utilities(&self, lookup: impl Fn(NodeId) -> Option<UtilityNo>) -> HashSet<UtilityNo> {
        self.nodes.iter().filter_map(|n| lookup(*n)).collect()
    }
}

// ─── Persistence entities ─────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Random,
    Scenario,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Random => "RANDOM",
            SourceType::Scenario => "SCENARIO",
        }
    }
}

/// A canonical, deduplicated path, identified by `path_hash`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathDefinition {
    pub id: Option<i64>,
    pub path_hash: String,
    pub source_type: SourceType,
    pub scope: String,
    pub node_count: u32,
    pub link_count: u32,
    pub total_length_mm: f64,
    pub nodes: Vec<NodeId>,
    pub links: Vec<PathLink>,
    pub data_codes_scope: Vec<DataCode>,
    pub utilities_scope: Vec<UtilityNo>,
    pub references_scope: Vec<String>,
}

/// One sampler invocation: a pick, and (if resolved) the path it found.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptPath {
    pub id: Option<i64>,
    pub run_id: Uuid,
    pub path_definition_id: Option<i64>,
    pub start_node_id: NodeId,
    pub end_node_id: NodeId,
    pub cost: Option<f64>,
    pub picked_at: Timestamp,
    pub tested_at: Option<Timestamp>,
    pub notes: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunApproach {
    Random,
    Scenario,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Done,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Completed,
    Partial,
    Failed,
}

/// The caller's only inbound configuration surface (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub approach: RunApproach,
    pub method: String,
    pub execution_mode: String,
    pub fab: Option<String>,
    pub toolset: Option<String>,
    pub phase_no: Option<String>,
    pub model_no: Option<String>,
    pub scenario_code: Option<String>,
    pub scenario_file: Option<String>,
    pub coverage_target: f64,
    pub max_attempts: u32,
    pub timeout_seconds: u64,
    pub tag: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            approach: RunApproach::Random,
            method: "standard".to_string(),
            execution_mode: "unattended".to_string(),
            fab: None,
            toolset: None,
            phase_no: None,
            model_no: None,
            scenario_code: None,
            scenario_file: None,
            coverage_target: 0.8,
            max_attempts: 10_000,
            timeout_seconds: 3_600,
            tag: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub approach: RunApproach,
    pub method: String,
    pub scope: Scope,
    pub coverage_target: f64,
    pub tag: String,
    pub status: RunStatus,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub total_coverage: f64,
    pub total_nodes: u32,
    pub total_links: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorScope {
    Connectivity,
    Flow,
    Material,
    Qa,
    Utility,
    Scenario,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    Node,
    Link,
    Poc,
    Path,
}

/// A typed finding emitted by the Validator (§4.F).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub id: Option<i64>,
    pub run_id: Uuid,
    pub path_definition_id: Option<i64>,
    pub severity: Severity,
    pub error_scope: ErrorScope,
    pub error_type: String,
    pub object_type: ObjectType,
    pub object_id: Option<i64>,
    pub object_guid: Option<Uuid>,
    pub error_message: String,
    pub object_utility_no: Option<UtilityNo>,
    pub object_flow: Option<Flow>,
    pub object_is_loopback: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Passed,
    Warning,
    Failed,
    CriticalFailure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewFlagStatus {
    Open,
    Acknowledged,
    Resolved,
    Dismissed,
}

/// An operator-facing signal requiring human triage (distinct from a `ValidationError`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub id: Option<i64>,
    pub run_id: Uuid,
    pub flag_type: String,
    pub severity: Severity,
    pub status: ReviewFlagStatus,
    pub reason: String,
    pub object_type: ObjectType,
    pub object_id: Option<i64>,
    pub object_guid: Option<Uuid>,
    pub created_at: Timestamp,
    pub notes: Option<String>,
}

/// The per-path outcome tag written by the Validator (`tb_path_tags`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathTagOutcome {
    ValidatedOk,
    ValidatedWarn,
    ValidatedFail,
    ValidatedCrit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total_attempts: u32,
    pub total_paths_found: u32,
    pub unique_paths: u32,
    pub total_errors: u32,
    pub total_reviews: u32,
    pub target_coverage: f64,
    pub achieved_coverage: f64,
    pub coverage_efficiency: f64,
    pub success_rate: f64,
    pub completion_status: CompletionStatus,
    pub execution_time_seconds: f64,
}
