use crate::store::Store;
use crate::types::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

/// Convert an epoch-ms i64 to a `chrono::DateTime<chrono::Utc>` for TIMESTAMPTZ binding.
fn epoch_ms_to_datetime(epoch_ms: i64) -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    let secs = epoch_ms / 1000;
    let nanos = ((epoch_ms % 1000) * 1_000_000) as u32;
    chrono::Utc
        .timestamp_opt(secs, nanos)
        .single()
        .unwrap_or_else(chrono::Utc::now)
}

fn net_obj_type_str(t: NetObjType) -> &'static str {
    match t {
        NetObjType::Logical => "LOGICAL",
        NetObjType::Poc => "POC",
        NetObjType::Virtual => "VIRTUAL",
    }
}

fn parse_net_obj_type(s: &str) -> NetObjType {
    match s {
        "POC" => NetObjType::Poc,
        "VIRTUAL" => NetObjType::Virtual,
        _ => NetObjType::Logical,
    }
}

fn flow_str(f: Flow) -> &'static str {
    match f {
        Flow::In => "IN",
        Flow::Out => "OUT",
    }
}

fn parse_flow(s: &str) -> Option<Flow> {
    match s {
        "IN" => Some(Flow::In),
        "OUT" => Some(Flow::Out),
        _ => None,
    }
}

fn source_type_str(s: SourceType) -> &'static str {
    s.as_str()
}

fn parse_source_type(s: &str) -> SourceType {
    match s {
        "SCENARIO" => SourceType::Scenario,
        _ => SourceType::Random,
    }
}

fn run_approach_str(a: RunApproach) -> &'static str {
    match a {
        RunApproach::Random => "RANDOM",
        RunApproach::Scenario => "SCENARIO",
    }
}

fn run_status_str(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Running => "RUNNING",
        RunStatus::Done => "DONE",
        RunStatus::Failed => "FAILED",
    }
}

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Low => "LOW",
        Severity::Medium => "MEDIUM",
        Severity::High => "HIGH",
        Severity::Critical => "CRITICAL",
        Severity::Warning => "WARNING",
        Severity::Error => "ERROR",
    }
}

fn error_scope_str(s: ErrorScope) -> &'static str {
    match s {
        ErrorScope::Connectivity => "CONNECTIVITY",
        ErrorScope::Flow => "FLOW",
        ErrorScope::Material => "MATERIAL",
        ErrorScope::Qa => "QA",
        ErrorScope::Utility => "UTILITY",
        ErrorScope::Scenario => "SCENARIO",
    }
}

fn object_type_str(o: ObjectType) -> &'static str {
    match o {
        ObjectType::Node => "NODE",
        ObjectType::Link => "LINK",
        ObjectType::Poc => "POC",
        ObjectType::Path => "PATH",
    }
}

fn review_flag_status_str(s: ReviewFlagStatus) -> &'static str {
    match s {
        ReviewFlagStatus::Open => "OPEN",
        ReviewFlagStatus::Acknowledged => "ACKNOWLEDGED",
        ReviewFlagStatus::Resolved => "RESOLVED",
        ReviewFlagStatus::Dismissed => "DISMISSED",
    }
}

fn path_tag_outcome_str(o: PathTagOutcome) -> &'static str {
    match o {
        PathTagOutcome::ValidatedOk => "VALIDATED_OK",
        PathTagOutcome::ValidatedWarn => "VALIDATED_WARN",
        PathTagOutcome::ValidatedFail => "VALIDATED_FAIL",
        PathTagOutcome::ValidatedCrit => "VALIDATED_CRIT",
    }
}

fn completion_status_str(c: CompletionStatus) -> &'static str {
    match c {
        CompletionStatus::Completed => "COMPLETED",
        CompletionStatus::Partial => "PARTIAL",
        CompletionStatus::Failed => "FAILED",
    }
}

/// PostgreSQL-backed implementation of `Store`.
pub struct PostgresStore {
    pool: sqlx::PgPool,
}

impl PostgresStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run fabnet-core migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn load_nodes(&self, scope: &Scope) -> Result<Vec<Node>> {
        let toolset_id: Option<i64> = scope.toolset.as_ref().and_then(|t| t.parse().ok());
        let utility_no = scope.utility_no.filter(|n| *n > 0);
        let eq_poc_no = scope
            .eq_poc_no
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let rows = sqlx::query(
            r#"
            SELECT node_id, data_code, utility_no, toolset_id, eq_poc_no, net_obj_type
            FROM nw_nodes
            WHERE ($1::BIGINT IS NULL OR toolset_id = $1)
              AND ($2::BIGINT IS NULL OR utility_no = $2)
              AND ($3::TEXT IS NULL OR eq_poc_no ILIKE '%' || $3 || '%')
            "#,
        )
        .bind(toolset_id)
        .bind(utility_no)
        .bind(eq_poc_no)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Node {
                node_id: row.get("node_id"),
                data_code: row.get("data_code"),
                utility_no: row.get("utility_no"),
                toolset_id: row.get("toolset_id"),
                eq_poc_no: row.get("eq_poc_no"),
                net_obj_type: parse_net_obj_type(row.get::<String, _>("net_obj_type").as_str()),
            })
            .collect())
    }

    async fn load_links(&self, node_ids: &[NodeId]) -> Result<Vec<Link>> {
        let rows = sqlx::query(
            r#"
            SELECT id, start_node_id, end_node_id, is_bidirected, cost, net_obj_type
            FROM nw_links
            WHERE start_node_id = ANY($1) OR end_node_id = ANY($1)
            "#,
        )
        .bind(node_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Link {
                link_id: row.get("id"),
                start_node_id: row.get("start_node_id"),
                end_node_id: row.get("end_node_id"),
                is_bidirected: row.get("is_bidirected"),
                cost: row.get("cost"),
                net_obj_type: parse_net_obj_type(row.get::<String, _>("net_obj_type").as_str()),
            })
            .collect())
    }

    async fn load_toolsets(&self, scope: &Scope) -> Result<Vec<Toolset>> {
        let rows = sqlx::query(
            r#"
            SELECT code, fab, phase, model_no, phase_no, is_active
            FROM tb_toolsets
            WHERE is_active
              AND ($1::TEXT IS NULL OR fab = $1)
            "#,
        )
        .bind(&scope.fab)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Toolset {
                code: row.get("code"),
                fab: row.get("fab"),
                phase: row.get("phase"),
                model_no: row.get("model_no"),
                phase_no: row.get("phase_no"),
                is_active: row.get("is_active"),
            })
            .collect())
    }

    async fn load_equipment(&self, toolset_code: &str) -> Result<Vec<Equipment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, toolset_code, guid, node_id, data_code, is_active
            FROM tb_equipments
            WHERE toolset_code = $1 AND is_active
            "#,
        )
        .bind(toolset_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Equipment {
                id: row.get("id"),
                toolset_code: row.get("toolset_code"),
                guid: row.get("guid"),
                node_id: row.get("node_id"),
                data_code: row.get("data_code"),
                is_active: row.get("is_active"),
            })
            .collect())
    }

    async fn load_pocs(&self, equipment_id: i64) -> Result<Vec<Poc>> {
        let rows = sqlx::query(
            r#"
            SELECT id, equipment_id, node_id, code, utility_no, reference, flow,
                   markers, is_used, is_loopback, is_active
            FROM tb_equipment_pocs
            WHERE equipment_id = $1 AND is_active
            "#,
        )
        .bind(equipment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_poc).collect())
    }

    async fn poc_by_node(&self, node_id: NodeId) -> Result<Option<Poc>> {
        let row = sqlx::query(
            r#"
            SELECT id, equipment_id, node_id, code, utility_no, reference, flow,
                   markers, is_used, is_loopback, is_active
            FROM tb_equipment_pocs
            WHERE node_id = $1
            "#,
        )
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_poc))
    }

    async fn connection_is_valid(&self, from_poc_id: i64, to_poc_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT is_valid FROM tb_equipment_poc_connections WHERE from_poc_id = $1 AND to_poc_id = $2",
        )
        .bind(from_poc_id)
        .bind(to_poc_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<bool, _>("is_valid")).unwrap_or(false))
    }

    async fn connections_valid_batch(
        &self,
        pairs: &[(i64, i64)],
    ) -> Result<std::collections::HashSet<(i64, i64)>> {
        if pairs.is_empty() {
            return Ok(std::collections::HashSet::new());
        }
        let froms: Vec<i64> = pairs.iter().map(|p| p.0).collect();
        let tos: Vec<i64> = pairs.iter().map(|p| p.1).collect();
        let rows = sqlx::query(
            r#"
            SELECT from_poc_id, to_poc_id
            FROM tb_equipment_poc_connections
            WHERE is_valid
              AND (from_poc_id, to_poc_id) IN (
                  SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[])
              )
            "#,
        )
        .bind(&froms)
        .bind(&tos)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("from_poc_id"), r.get("to_poc_id")))
            .collect())
    }

    async fn coverage_nodes(&self, scope: &Scope) -> Result<Vec<NodeId>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT p.node_id
            FROM tb_equipment_pocs p
            JOIN tb_equipments e ON e.id = p.equipment_id
            JOIN tb_toolsets t ON t.code = e.toolset_code
            WHERE p.is_active AND e.is_active AND t.is_active
              AND ($1::TEXT IS NULL OR t.code = $1)
              AND ($2::TEXT IS NULL OR t.fab = $2)
            "#,
        )
        .bind(&scope.toolset)
        .bind(&scope.fab)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get("node_id")).collect())
    }

    async fn coverage_links(&self, scope: &Scope) -> Result<Vec<(NodeId, NodeId)>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT
                LEAST(pf.node_id, pt.node_id) AS a,
                GREATEST(pf.node_id, pt.node_id) AS b
            FROM tb_equipment_poc_connections c
            JOIN tb_equipment_pocs pf ON pf.id = c.from_poc_id
            JOIN tb_equipment_pocs pt ON pt.id = c.to_poc_id
            JOIN tb_equipments ef ON ef.id = pf.equipment_id
            JOIN tb_toolsets tf ON tf.code = ef.toolset_code
            WHERE c.is_valid
              AND ($1::TEXT IS NULL OR tf.code = $1)
              AND ($2::TEXT IS NULL OR tf.fab = $2)
            "#,
        )
        .bind(&scope.toolset)
        .bind(&scope.fab)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("a"), r.get("b")))
            .collect())
    }

    async fn find_path_definition_by_hash(&self, hash: &str) -> Result<Option<PathDefinition>> {
        let row = sqlx::query(
            r#"
            SELECT id, path_hash, source_type, scope, node_count, link_count,
                   total_length_mm, path_context, data_codes_scope, utilities_scope,
                   references_scope
            FROM tb_path_definitions
            WHERE path_hash = $1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_path_definition).transpose()
    }

    async fn insert_path_definition(&self, def: &PathDefinition) -> Result<i64> {
        #[derive(serde::Serialize)]
        struct PathContext<'a> {
            nodes: &'a [NodeId],
            links: &'a [PathLink],
        }
        let path_context = serde_json::to_value(PathContext {
            nodes: &def.nodes,
            links: &def.links,
        })?;
        let data_codes = serde_json::to_value(&def.data_codes_scope)?;
        let utilities = serde_json::to_value(&def.utilities_scope)?;
        let references = serde_json::to_value(&def.references_scope)?;

        let row = sqlx::query(
            r#"
            INSERT INTO tb_path_definitions (
                path_hash, source_type, scope, node_count, link_count,
                total_length_mm, path_context, data_codes_scope, utilities_scope,
                references_scope
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (path_hash) DO UPDATE SET path_hash = EXCLUDED.path_hash
            RETURNING id
            "#,
        )
        .bind(&def.path_hash)
        .bind(source_type_str(def.source_type))
        .bind(&def.scope)
        .bind(def.node_count as i64)
        .bind(def.link_count as i64)
        .bind(def.total_length_mm)
        .bind(&path_context)
        .bind(&data_codes)
        .bind(&utilities)
        .bind(&references)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn insert_attempt_pick(&self, attempt: &AttemptPath) -> Result<i64> {
        let picked_at = epoch_ms_to_datetime(attempt.picked_at);
        let row = sqlx::query(
            r#"
            INSERT INTO tb_attempt_paths (run_id, start_node_id, end_node_id, picked_at, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(attempt.run_id)
        .bind(attempt.start_node_id)
        .bind(attempt.end_node_id)
        .bind(picked_at)
        .bind(&attempt.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn link_attempt_to_path(
        &self,
        attempt_id: i64,
        path_definition_id: i64,
        cost: f64,
        tested_at: Timestamp,
    ) -> Result<()> {
        let tested_at = epoch_ms_to_datetime(tested_at);
        let result = sqlx::query(
            "UPDATE tb_attempt_paths SET path_definition_id = $1, cost = $2, tested_at = $3 WHERE id = $4",
        )
        .bind(path_definition_id)
        .bind(cost)
        .bind(tested_at)
        .bind(attempt_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("attempt not found: {attempt_id}"));
        }
        Ok(())
    }

    async fn latest_open_attempt(&self, run_id: Uuid) -> Result<Option<AttemptPath>> {
        let row = sqlx::query(
            r#"
            SELECT id, run_id, path_definition_id, start_node_id, end_node_id, cost,
                   EXTRACT(EPOCH FROM picked_at) * 1000 AS picked_at_ms,
                   EXTRACT(EPOCH FROM tested_at) * 1000 AS tested_at_ms,
                   notes
            FROM tb_attempt_paths
            WHERE run_id = $1 AND path_definition_id IS NULL
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_attempt).transpose()
    }

    async fn path_definitions_for_run(&self, run_id: Uuid) -> Result<Vec<PathDefinition>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT d.id, d.path_hash, d.source_type, d.scope, d.node_count,
                   d.link_count, d.total_length_mm, d.path_context, d.data_codes_scope,
                   d.utilities_scope, d.references_scope
            FROM tb_path_definitions d
            JOIN tb_attempt_paths a ON a.path_definition_id = d.id
            WHERE a.run_id = $1
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_path_definition).collect()
    }

    async fn insert_run(&self, run: &Run) -> Result<()> {
        let started_at = epoch_ms_to_datetime(run.started_at);
        let ended_at = run.ended_at.map(epoch_ms_to_datetime);
        sqlx::query(
            r#"
            INSERT INTO tb_runs (
                id, approach, method, fab, phase, model, toolset, coverage_target,
                tag, status, started_at, ended_at, total_coverage, total_nodes, total_links
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(run.id)
        .bind(run_approach_str(run.approach))
        .bind(&run.method)
        .bind(&run.scope.fab)
        .bind(&run.scope.phase)
        .bind(&run.scope.model)
        .bind(&run.scope.toolset)
        .bind(run.coverage_target)
        .bind(&run.tag)
        .bind(run_status_str(run.status))
        .bind(started_at)
        .bind(ended_at)
        .bind(run.total_coverage)
        .bind(run.total_nodes as i64)
        .bind(run.total_links as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
        ended_at: Option<Timestamp>,
    ) -> Result<()> {
        let ended_at = ended_at.map(epoch_ms_to_datetime);
        let result = sqlx::query("UPDATE tb_runs SET status = $1, ended_at = COALESCE($2, ended_at) WHERE id = $3")
            .bind(run_status_str(status))
            .bind(ended_at)
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("run not found: {run_id}"));
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
        let result = sqlx::query(
            "UPDATE tb_runs SET total_nodes = $1, total_links = $2, total_coverage = $3 WHERE id = $4",
        )
        .bind(total_nodes as i64)
        .bind(total_links as i64)
        .bind(total_coverage)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("run not found: {run_id}"));
        }
        Ok(())
    }

    async fn insert_validation_error(&self, error: &ValidationError) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tb_validation_errors (
                run_id, path_definition_id, severity, error_scope, error_type,
                object_type, object_id, object_guid, error_message, object_utility_no,
                object_flow, object_is_loopback
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(error.run_id)
        .bind(error.path_definition_id)
        .bind(severity_str(error.severity))
        .bind(error_scope_str(error.error_scope))
        .bind(&error.error_type)
        .bind(object_type_str(error.object_type))
        .bind(error.object_id)
        .bind(error.object_guid)
        .bind(&error.error_message)
        .bind(error.object_utility_no)
        .bind(error.object_flow.map(flow_str))
        .bind(error.object_is_loopback)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_path_tag(
        &self,
        path_definition_id: i64,
        outcome: PathTagOutcome,
        confidence: f64,
        source: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tb_path_tags (path_definition_id, outcome, confidence, source)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (path_definition_id) DO UPDATE SET
                outcome = EXCLUDED.outcome,
                confidence = EXCLUDED.confidence,
                source = EXCLUDED.source
            "#,
        )
        .bind(path_definition_id)
        .bind(path_tag_outcome_str(outcome))
        .bind(confidence)
        .bind(source)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_review_flag(&self, flag: &ReviewFlag) -> Result<()> {
        let created_at = epoch_ms_to_datetime(flag.created_at);
        sqlx::query(
            r#"
            INSERT INTO tb_review_flags (
                run_id, flag_type, severity, status, reason, object_type,
                object_id, object_guid, created_at, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(flag.run_id)
        .bind(&flag.flag_type)
        .bind(severity_str(flag.severity))
        .bind(review_flag_status_str(flag.status))
        .bind(&flag.reason)
        .bind(object_type_str(flag.object_type))
        .bind(flag.object_id)
        .bind(flag.object_guid)
        .bind(created_at)
        .bind(&flag.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_run_summary(&self, summary: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tb_run_summaries (
                run_id, total_attempts, total_paths_found, unique_paths, total_errors,
                total_reviews, target_coverage, achieved_coverage, coverage_efficiency,
                success_rate, completion_status, execution_time_seconds
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (run_id) DO UPDATE SET
                total_attempts = EXCLUDED.total_attempts,
                total_paths_found = EXCLUDED.total_paths_found,
                unique_paths = EXCLUDED.unique_paths,
                total_errors = EXCLUDED.total_errors,
                total_reviews = EXCLUDED.total_reviews,
                achieved_coverage = EXCLUDED.achieved_coverage,
                coverage_efficiency = EXCLUDED.coverage_efficiency,
                success_rate = EXCLUDED.success_rate,
                completion_status = EXCLUDED.completion_status,
                execution_time_seconds = EXCLUDED.execution_time_seconds
            "#,
        )
        .bind(summary.run_id)
        .bind(summary.total_attempts as i64)
        .bind(summary.total_paths_found as i64)
        .bind(summary.unique_paths as i64)
        .bind(summary.total_errors as i64)
        .bind(summary.total_reviews as i64)
        .bind(summary.target_coverage)
        .bind(summary.achieved_coverage)
        .bind(summary.coverage_efficiency)
        .bind(summary.success_rate)
        .bind(completion_status_str(summary.completion_status))
        .bind(summary.execution_time_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_poc(row: sqlx::postgres::PgRow) -> Poc {
    Poc {
        id: row.get("id"),
        equipment_id: row.get("equipment_id"),
        node_id: row.get("node_id"),
        code: row.get("code"),
        utility_no: row.get("utility_no"),
        reference: row.get("reference"),
        flow: row
            .get::<Option<String>, _>("flow")
            .and_then(|s| parse_flow(&s)),
        markers: row.get("markers"),
        is_used: row.get("is_used"),
        is_loopback: row.get("is_loopback"),
        is_active: row.get("is_active"),
    }
}

fn row_to_path_definition(row: sqlx::postgres::PgRow) -> Result<PathDefinition> {
    #[derive(serde::Deserialize)]
    struct PathContext {
        nodes: Vec<NodeId>,
        links: Vec<PathLink>,
    }
    let path_context: serde_json::Value = row.get("path_context");
    let context: PathContext =
        serde_json::from_value(path_context).context("failed to deserialize path_context")?;
    let data_codes: serde_json::Value = row.get("data_codes_scope");
    let utilities: serde_json::Value = row.get("utilities_scope");
    let references: serde_json::Value = row.get("references_scope");

    Ok(PathDefinition {
        id: Some(row.get("id")),
        path_hash: row.get("path_hash"),
        source_type: parse_source_type(row.get::<String, _>("source_type").as_str()),
        scope: row.get("scope"),
        node_count: row.get::<i64, _>("node_count") as u32,
        link_count: row.get::<i64, _>("link_count") as u32,
        total_length_mm: row.get("total_length_mm"),
        nodes: context.nodes,
        links: context.links,
        data_codes_scope: serde_json::from_value(data_codes).unwrap_or_default(),
        utilities_scope: serde_json::from_value(utilities).unwrap_or_default(),
        references_scope: serde_json::from_value(references).unwrap_or_default(),
    })
}

fn row_to_attempt(row: sqlx::postgres::PgRow) -> Result<AttemptPath> {
    let picked_at_ms: f64 = row.get("picked_at_ms");
    let tested_at_ms: Option<f64> = row.get("tested_at_ms");
    Ok(AttemptPath {
        id: Some(row.get("id")),
        run_id: row.get("run_id"),
        path_definition_id: row.get("path_definition_id"),
        start_node_id: row.get("start_node_id"),
        end_node_id: row.get("end_node_id"),
        cost: row.get("cost"),
        picked_at: picked_at_ms as i64,
        tested_at: tested_at_ms.map(|ms| ms as i64),
        notes: row.get("notes"),
    })
}
