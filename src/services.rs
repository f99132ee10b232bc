//! Interfaces to the external clustering and metrics-recompute services.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    clusters::{Cluster, MetricsPayload},
    error::ExecutorError,
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequest {
    pub operational_rows: Vec<Map<String, Value>>,
    pub properties: Vec<Map<String, Value>>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterResponse {
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub metrics: MetricsPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_conversations_by_model: Option<BTreeMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_unique_conversations: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRequest {
    pub clusters: Vec<Cluster>,
    pub properties: Vec<Map<String, Value>>,
    pub operational_rows: Vec<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "included_property_ids")]
    pub included_property_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "score_columns")]
    pub score_columns: Option<Vec<String>>,
}

#[async_trait(?Send)]
pub trait ClusteringService {
    async fn cluster(&self, request: ClusterRequest) -> Result<ClusterResponse, ExecutorError>;
}

#[async_trait(?Send)]
pub trait MetricsService {
    async fn recompute(&self, request: MetricsRequest) -> Result<ClusterResponse, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_use_wire_field_names() {
        let request = MetricsRequest {
            score_columns: Some(vec!["accuracy".into()]),
            ..MetricsRequest::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("operationalRows").is_some());
        assert_eq!(json["score_columns"], json!(["accuracy"]));
        assert!(json.get("included_property_ids").is_none());
    }

    #[test]
    fn responses_tolerate_missing_metrics() {
        let response: ClusterResponse =
            serde_json::from_value(json!({"clusters": [{"id": 1, "label": "a"}]})).unwrap();
        assert_eq!(response.clusters.len(), 1);
        assert!(response.metrics.is_empty());
        assert_eq!(response.total_unique_conversations, None);
    }
}
