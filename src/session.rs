//! The session controller: owns a loaded dataset and everything derived from it.
//!
//! All state changes go through [`Session`]. Chain applications are the only
//! asynchronous work on the rows; each one captures the session generation in
//! a [`RefreshTicket`], and [`Session::commit`] discards results whose
//! generation is no longer current.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::{
    clusters::{Cluster, MetricsPayload, enrich_from_payload},
    config::ExplorerConfig,
    data::RawRow,
    detect::detect_mapping_with,
    engine::{ChainOutput, CustomFailure, apply_chain, apply_view},
    executor::RowTransformExecutor,
    flatten::{DisplayRow, ModelNames},
    mapping::{ColumnMapping, ensure_valid},
    normalize::normalize_validated,
    operations::{DataOperation, OperationChain, OperationKind},
    rows::OperationalRow,
    services::{ClusterRequest, ClusterResponse, ClusteringService, MetricsRequest, MetricsService},
    tidy::pair_tidy_rows,
};

#[derive(Debug, Default)]
pub struct Session {
    config: ExplorerConfig,
    raw: Vec<RawRow>,
    columns: Vec<String>,
    mapping: Option<ColumnMapping>,
    base: Arc<Vec<OperationalRow>>,
    chain: OperationChain,
    view: ChainOutput,
    generation: u64,
    model_names: Option<ModelNames>,
    clusters: Vec<Cluster>,
    notices: Vec<String>,
}

/// Snapshot of everything one chain application reads.
#[derive(Debug, Clone)]
pub struct RefreshTicket {
    generation: u64,
    base: Arc<Vec<OperationalRow>>,
    operations: Vec<DataOperation>,
    names: Option<ModelNames>,
}

/// Result of a chain application waiting to be committed.
#[derive(Debug, Clone)]
pub struct PendingView {
    generation: u64,
    output: ChainOutput,
}

impl PendingView {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn output(&self) -> &ChainOutput {
        &self.output
    }
}

impl RefreshTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn run<E: RowTransformExecutor + ?Sized>(self, executor: &E) -> PendingView {
        let output = apply_chain(
            &self.base,
            &self.operations,
            self.names.as_ref(),
            executor,
        )
        .await;
        PendingView {
            generation: self.generation,
            output,
        }
    }
}

impl Session {
    pub fn new(config: ExplorerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Replaces the dataset. Mapping, derived rows, operations and clusters
    /// are reset.
    pub fn load(&mut self, raw: Vec<RawRow>, columns: Vec<String>) {
        info!("Loaded {} row(s) with {} column(s)", raw.len(), columns.len());
        self.raw = raw;
        self.columns = columns;
        self.mapping = None;
        self.base = Arc::new(Vec::new());
        self.chain.clear();
        self.view = ChainOutput::default();
        self.model_names = None;
        self.clusters.clear();
        self.notices.clear();
        self.generation += 1;
    }

    pub fn detect_mapping(&self) -> ColumnMapping {
        detect_mapping_with(&self.columns, &self.config.detection)
    }

    /// Validates `mapping` and rebuilds the canonical rows from the original
    /// raw rows. On failure the session is left exactly as it was.
    pub fn apply_mapping(&mut self, mapping: ColumnMapping) -> Result<()> {
        ensure_valid(&mapping).context("Applying column mapping")?;
        let (rows, notice) = if mapping.is_tidy() {
            let rows = pair_tidy_rows(&self.raw, &mapping).context("Pairing tidy rows")?;
            (rows, None)
        } else {
            let outcome = normalize_validated(&self.raw, &mapping);
            (outcome.rows, outcome.notice)
        };
        info!(
            "Applied {:?} mapping: {} operational row(s) from {} raw row(s)",
            mapping.method,
            rows.len(),
            self.raw.len()
        );

        self.notices.clear();
        if let Some(notice) = notice {
            warn!("{notice}");
            self.notices.push(notice.to_string());
        }
        self.base = Arc::new(rows);
        self.mapping = Some(mapping);
        self.chain.clear();
        self.model_names = None;
        self.reapply_view();
        Ok(())
    }

    /// Re-applies filters and sort to the base rows in place when the chain
    /// has no custom operation. Chains with custom operations keep the
    /// current view until [`Session::refresh`].
    fn reapply_view(&mut self) {
        let has_custom = self
            .chain
            .operations()
            .iter()
            .any(|op| matches!(op.kind, OperationKind::Custom { .. }));
        if has_custom {
            debug!("Chain has custom operations; view waits for refresh");
            return;
        }
        self.generation += 1;
        let (rows, score_columns) =
            apply_view(&self.base, self.chain.operations(), self.model_names.as_ref());
        self.view = ChainOutput {
            rows,
            score_columns,
            transformed: self.base.as_ref().clone(),
            failures: Vec::new(),
        };
    }

    /// Appends `operation`. Filters and sorts show up in the view at once;
    /// a custom operation waits for [`Session::refresh`].
    pub fn add_operation(&mut self, operation: DataOperation) {
        debug!("Adding operation {}", operation.id);
        self.chain.push(operation);
        self.reapply_view();
    }

    pub fn remove_operation(&mut self, id: &str) -> bool {
        let removed = self.chain.remove(id);
        if removed {
            self.reapply_view();
        }
        removed
    }

    pub fn clear_operations(&mut self) {
        self.chain.clear();
        self.reapply_view();
    }

    /// Sets display names for side-by-side models; `None` restores the
    /// names recorded on the rows.
    pub fn rename_models(&mut self, names: Option<ModelNames>) {
        self.model_names = names;
        self.reapply_view();
    }

    /// Starts a chain application against the current state.
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.generation += 1;
        RefreshTicket {
            generation: self.generation,
            base: Arc::clone(&self.base),
            operations: self.chain.operations().to_vec(),
            names: self.model_names.clone(),
        }
    }

    /// Installs `view` unless a newer application or mapping has started
    /// since its ticket was issued. Returns whether it was installed.
    pub fn commit(&mut self, view: PendingView) -> bool {
        if view.generation != self.generation {
            warn!(
                "Discarding stale chain result from generation {} (current {})",
                view.generation, self.generation
            );
            return false;
        }
        self.view = view.output;
        true
    }

    pub async fn refresh<E: RowTransformExecutor + ?Sized>(&mut self, executor: &E) -> bool {
        let ticket = self.begin_refresh();
        let view = ticket.run(executor).await;
        self.commit(view)
    }

    pub fn set_clusters(&mut self, clusters: Vec<Cluster>) {
        self.clusters = clusters;
    }

    pub fn apply_metrics_payload(&mut self, payload: &MetricsPayload) {
        self.clusters = enrich_from_payload(&self.clusters, payload, &self.config.enrichment);
    }

    /// Sends the current transformed rows to the clustering service and
    /// installs the returned clusters, enriched with the returned metrics.
    pub async fn run_clustering<S: ClusteringService + ?Sized>(
        &mut self,
        service: &S,
        properties: Vec<Map<String, Value>>,
        params: Map<String, Value>,
    ) -> Result<ClusterResponse> {
        let request = ClusterRequest {
            operational_rows: self.operational_json(),
            properties,
            params,
        };
        let response = service
            .cluster(request)
            .await
            .context("Running clustering service")?;
        info!("Clustering returned {} cluster(s)", response.clusters.len());
        self.clusters = response.clusters.clone();
        self.apply_metrics_payload(&response.metrics);
        Ok(response)
    }

    /// Recomputes metrics for the current clusters, for example after the
    /// chain changed which rows are visible.
    pub async fn recompute_metrics<S: MetricsService + ?Sized>(
        &mut self,
        service: &S,
        properties: Vec<Map<String, Value>>,
        included_property_ids: Option<Vec<String>>,
    ) -> Result<ClusterResponse> {
        let score_columns = self
            .mapping
            .as_ref()
            .map(|mapping| mapping.score_cols.clone())
            .filter(|cols| !cols.is_empty());
        let request = MetricsRequest {
            clusters: self.clusters.clone(),
            properties,
            operational_rows: self.operational_json(),
            included_property_ids,
            score_columns,
        };
        let response = service
            .recompute(request)
            .await
            .context("Recomputing cluster metrics")?;
        if !response.clusters.is_empty() {
            self.clusters = response.clusters.clone();
        }
        self.apply_metrics_payload(&response.metrics);
        Ok(response)
    }

    fn operational_json(&self) -> Vec<Map<String, Value>> {
        self.view
            .transformed
            .iter()
            .map(OperationalRow::to_json)
            .collect()
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn raw_rows(&self) -> &[RawRow] {
        &self.raw
    }

    pub fn mapping(&self) -> Option<&ColumnMapping> {
        self.mapping.as_ref()
    }

    pub fn base_rows(&self) -> &[OperationalRow] {
        &self.base
    }

    pub fn operations(&self) -> &[DataOperation] {
        self.chain.operations()
    }

    pub fn rows(&self) -> &[DisplayRow] {
        &self.view.rows
    }

    pub fn transformed_rows(&self) -> &[OperationalRow] {
        &self.view.transformed
    }

    pub fn score_columns(&self) -> &[String] {
        &self.view.score_columns
    }

    pub fn failures(&self) -> &[CustomFailure] {
        &self.view.failures
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn model_names(&self) -> Option<&ModelNames> {
        self.model_names.as_ref()
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
