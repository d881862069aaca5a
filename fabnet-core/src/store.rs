use crate::types::*;
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence trait for everything the core reads or writes.
///
/// The Orchestrator, Sampler, Coverage Tracker, and Path Repository operate
/// exclusively through this trait, so a run can be driven against an
/// in-memory fixture (`MemoryStore`) in tests or against Postgres
/// (`PostgresStore`) in production without touching their logic.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Network (component A) ──

    async fn load_nodes(&self, scope: &Scope) -> Result<Vec<Node>>;
    async fn load_links(&self, node_ids: &[NodeId]) -> Result<Vec<Link>>;

    // ── Sampling universe (component E) ──

    async fn load_toolsets(&self, scope: &Scope) -> Result<Vec<Toolset>>;
    async fn load_equipment(&self, toolset_code: &str) -> Result<Vec<Equipment>>;
    async fn load_pocs(&self, equipment_id: i64) -> Result<Vec<Poc>>;
    async fn poc_by_node(&self, node_id: NodeId) -> Result<Option<Poc>>;
    async fn connection_is_valid(&self, from_poc_id: i64, to_poc_id: i64) -> Result<bool>;

    /// Batched counterpart of `connection_is_valid`, used by the Validator's
    /// connectivity check so an N-node path costs one round-trip, not N-1.
    /// Returns the subset of `pairs` that resolve to a valid connection.
    async fn connections_valid_batch(
        &self,
        pairs: &[(i64, i64)],
    ) -> Result<std::collections::HashSet<(i64, i64)>>;

    // ── Coverage universe (component D) ──

    async fn coverage_nodes(&self, scope: &Scope) -> Result<Vec<NodeId>>;
    async fn coverage_links(&self, scope: &Scope) -> Result<Vec<(NodeId, NodeId)>>;

    // ── Path repository (component C) ──

    async fn find_path_definition_by_hash(&self, hash: &str) -> Result<Option<PathDefinition>>;
    async fn insert_path_definition(&self, def: &PathDefinition) -> Result<i64>;
    async fn insert_attempt_pick(&self, attempt: &AttemptPath) -> Result<i64>;
    async fn link_attempt_to_path(
        &self,
        attempt_id: i64,
        path_definition_id: i64,
        cost: f64,
        tested_at: Timestamp,
    ) -> Result<()>;
    async fn latest_open_attempt(&self, run_id: Uuid) -> Result<Option<AttemptPath>>;
    async fn path_definitions_for_run(&self, run_id: Uuid) -> Result<Vec<PathDefinition>>;

    // ── Run lifecycle ──

    async fn insert_run(&self, run: &Run) -> Result<()>;
    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
        ended_at: Option<Timestamp>,
    ) -> Result<()>;
    async fn update_run_totals(
        &self,
        run_id: Uuid,
        total_nodes: u32,
        total_links: u32,
        total_coverage: f64,
    ) -> Result<()>;

    // ── Validation (component F) ──

    async fn insert_validation_error(&self, error: &ValidationError) -> Result<()>;
    async fn insert_path_tag(
        &self,
        path_definition_id: i64,
        outcome: PathTagOutcome,
        confidence: f64,
        source: &str,
    ) -> Result<()>;

    // ── Review flags ──

    async fn insert_review_flag(&self, flag: &ReviewFlag) -> Result<()>;

    // ── Run summary ──

    async fn insert_run_summary(&self, summary: &RunSummary) -> Result<()>;
}
