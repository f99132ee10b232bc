//! Cluster records and their enrichment with externally computed metrics.
//!
//! Score rows may carry the same quality metric in three encodings: flat
//! `quality_<metric>` / `quality_delta_<metric>` columns, a nested `quality`
//! object and a nested `quality_delta` object. Each row is scanned in that
//! order and every numeric match is merged into one map, so when encodings
//! disagree on a row the nested `quality_delta` object, then the nested
//! `quality` object, take precedence over flat columns.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::EnrichmentConfig,
    data::{ScoreMap, finite_number, identifier_text},
    metrics::normalize_metric_rows,
};

const QUALITY_PREFIX: &str = "quality_";
const QUALITY_DELTA_PREFIX: &str = "quality_delta_";
const NESTED_QUALITY: &str = "quality";
const NESTED_QUALITY_DELTA: &str = "quality_delta";

/// Per-model-per-cluster metric record produced by the metrics service.
pub type ModelClusterScoreRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClusterId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterId::Int(id) => write!(f, "{id}"),
            ClusterId::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterMeta {
    pub quality: Option<ScoreMap>,
    pub quality_delta: Option<ScoreMap>,
    pub quality_by_model: BTreeMap<String, ScoreMap>,
    pub quality_delta_by_model: BTreeMap<String, ScoreMap>,
    pub proportion_overall: Option<f64>,
    pub proportion_by_model: BTreeMap<String, f64>,
    pub group: Option<String>,
    pub property_items: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub property_ids: Vec<String>,
    #[serde(default)]
    pub meta: ClusterMeta,
}

/// Metrics tables returned by the clustering and recompute services.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsPayload {
    pub model_cluster_scores: Vec<ModelClusterScoreRow>,
    pub cluster_scores: Vec<Map<String, Value>>,
    pub model_scores: Vec<Map<String, Value>>,
}

impl MetricsPayload {
    pub fn is_empty(&self) -> bool {
        self.model_cluster_scores.is_empty()
            && self.cluster_scores.is_empty()
            && self.model_scores.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct RowMetrics {
    quality: ScoreMap,
    delta: ScoreMap,
    proportion: Option<f64>,
}

impl RowMetrics {
    fn merge(&mut self, other: RowMetrics) {
        self.quality.extend(other.quality);
        self.delta.extend(other.delta);
        if other.proportion.is_some() {
            self.proportion = other.proportion;
        }
    }
}

fn scan_row(row: &Map<String, Value>, config: &EnrichmentConfig) -> RowMetrics {
    let mut metrics = RowMetrics::default();

    for (column, value) in row {
        if config.is_excluded(column) {
            continue;
        }
        let Some(number) = finite_number(value) else {
            continue;
        };
        if let Some(metric) = column.strip_prefix(QUALITY_DELTA_PREFIX) {
            metrics.delta.insert(metric.to_string(), number);
        } else if let Some(metric) = column.strip_prefix(QUALITY_PREFIX) {
            metrics.quality.insert(metric.to_string(), number);
        }
    }
    if let Some(Value::Object(nested)) = row.get(NESTED_QUALITY) {
        merge_numeric(&mut metrics.quality, nested);
    }
    if let Some(Value::Object(nested)) = row.get(NESTED_QUALITY_DELTA) {
        merge_numeric(&mut metrics.delta, nested);
    }
    metrics.proportion = row.get("proportion").and_then(finite_number);
    metrics
}

fn merge_numeric(target: &mut ScoreMap, nested: &Map<String, Value>) {
    for (metric, value) in nested {
        if let Some(number) = finite_number(value) {
            target.insert(metric.clone(), number);
        }
    }
}

/// Joins per-model quality rows onto clusters. Inputs are not modified;
/// clusters without matching rows are returned as they were.
pub fn enrich_clusters(clusters: &[Cluster], rows: &[ModelClusterScoreRow]) -> Vec<Cluster> {
    enrich_clusters_with(clusters, rows, &EnrichmentConfig::default())
}

pub fn enrich_clusters_with(
    clusters: &[Cluster],
    rows: &[ModelClusterScoreRow],
    config: &EnrichmentConfig,
) -> Vec<Cluster> {
    let mut index: HashMap<String, BTreeMap<String, RowMetrics>> = HashMap::new();
    for row in rows {
        let (Some(cluster), Some(model)) = (
            identifier_text(row.get("cluster_id")),
            identifier_text(row.get("model")),
        ) else {
            continue;
        };
        index
            .entry(cluster)
            .or_default()
            .entry(model)
            .or_default()
            .merge(scan_row(row, config));
    }

    clusters
        .iter()
        .map(|cluster| match index.get(&cluster.id.to_string()) {
            None => cluster.clone(),
            Some(by_model) => {
                let mut meta = cluster.meta.clone();
                meta.quality_by_model = by_model
                    .iter()
                    .filter(|(_, m)| !m.quality.is_empty())
                    .map(|(model, m)| (model.clone(), m.quality.clone()))
                    .collect();
                meta.quality_delta_by_model = by_model
                    .iter()
                    .filter(|(_, m)| !m.delta.is_empty())
                    .map(|(model, m)| (model.clone(), m.delta.clone()))
                    .collect();
                for (model, metrics) in by_model {
                    if let Some(proportion) = metrics.proportion {
                        meta.proportion_by_model.insert(model.clone(), proportion);
                    }
                }
                Cluster {
                    meta,
                    ..cluster.clone()
                }
            }
        })
        .collect()
}

/// Fills cluster-level quality and proportion from rows without a model.
pub fn enrich_cluster_totals(
    clusters: &[Cluster],
    rows: &[Map<String, Value>],
    config: &EnrichmentConfig,
) -> Vec<Cluster> {
    let mut index: HashMap<String, RowMetrics> = HashMap::new();
    for row in rows {
        let Some(cluster) = identifier_text(row.get("cluster_id")) else {
            continue;
        };
        index.entry(cluster).or_default().merge(scan_row(row, config));
    }

    clusters
        .iter()
        .map(|cluster| match index.get(&cluster.id.to_string()) {
            None => cluster.clone(),
            Some(metrics) => {
                let mut meta = cluster.meta.clone();
                if !metrics.quality.is_empty() {
                    meta.quality = Some(metrics.quality.clone());
                }
                if !metrics.delta.is_empty() {
                    meta.quality_delta = Some(metrics.delta.clone());
                }
                if metrics.proportion.is_some() {
                    meta.proportion_overall = metrics.proportion;
                }
                Cluster {
                    meta,
                    ..cluster.clone()
                }
            }
        })
        .collect()
}

/// Normalizes metric names in a full payload and merges both of its
/// cluster-keyed tables. An empty payload leaves the clusters untouched.
pub fn enrich_from_payload(
    clusters: &[Cluster],
    payload: &MetricsPayload,
    config: &EnrichmentConfig,
) -> Vec<Cluster> {
    if payload.model_cluster_scores.is_empty() && payload.cluster_scores.is_empty() {
        debug!("Metrics payload has no cluster rows; clusters left unenriched");
        return clusters.to_vec();
    }
    let per_model = normalize_metric_rows(&payload.model_cluster_scores);
    let totals = normalize_metric_rows(&payload.cluster_scores);
    let enriched = enrich_clusters_with(clusters, &per_model, config);
    let enriched = enrich_cluster_totals(&enriched, &totals, config);
    info!(
        "Enriched {} cluster(s) from {} model row(s) and {} cluster row(s)",
        enriched.len(),
        per_model.len(),
        totals.len()
    );
    enriched
}
