mod common;

use std::cell::RefCell;

use async_trait::async_trait;
use common::{TestWorkspace, raw_rows, strings, tidy_mapping};
use eval_explorer::{
    clusters::{Cluster, ClusterId, ClusterMeta, MetricsPayload},
    config::ExplorerConfig,
    error::ExecutorError,
    executor::{ExpressionExecutor, NoopExecutor},
    flatten::ModelNames,
    operations::{DataOperation, SortDirection},
    services::{ClusterRequest, ClusterResponse, ClusteringService, MetricsRequest, MetricsService},
    session::Session,
};
use serde_json::{Map, json};

fn loaded_session() -> Session {
    let raw = raw_rows(json!([
        {"question_id": "q1", "prompt": "p1", "model_a": "gpt-4", "model_b": "claude",
         "model_a_response": "a1", "model_b_response": "b1", "score_a": 1, "score_b": 0},
        {"question_id": "q2", "prompt": "p2", "model_a": "gpt-4", "model_b": "claude",
         "model_a_response": "a2", "model_b_response": "b2", "score_a": "", "score_b": 1},
        {"question_id": "q3", "prompt": "p3", "model_a": "gpt-4", "model_b": "claude",
         "model_a_response": "a3", "model_b_response": "b3", "score_a": 0.5, "score_b": 0.5},
    ]));
    let columns = raw[0].keys().cloned().collect();
    let mut session = Session::default();
    session.load(raw, columns);
    session
}

#[test]
fn detected_mapping_applies_and_reports_exclusions() {
    let mut session = loaded_session();
    let mapping = session.detect_mapping();
    session.apply_mapping(mapping).unwrap();
    assert_eq!(session.base_rows().len(), 2);
    assert_eq!(session.rows().len(), 2);
    assert_eq!(session.notices().len(), 1);
    assert!(session.notices()[0].starts_with("Filtered out 1 row(s)"));
    assert!(
        session
            .score_columns()
            .contains(&"score_gpt-4_value".to_string())
    );

    let rescored = session.mapping().unwrap().with_score_cols(strings(&["score_b"]));
    session.apply_mapping(rescored).unwrap();
    assert_eq!(session.base_rows().len(), 3);
    assert!(session.notices().is_empty());
}

#[test]
fn failed_mapping_leaves_previous_state() {
    let mut session = loaded_session();
    session.apply_mapping(session.detect_mapping()).unwrap();
    let generation = session.generation();

    let err = session
        .apply_mapping(tidy_mapping("gpt-4", "nobody", &[]))
        .unwrap_err();
    assert!(format!("{err:#}").contains("Pairing tidy rows"));
    assert_eq!(session.base_rows().len(), 2);
    assert_eq!(session.generation(), generation);
}

#[tokio::test]
async fn stale_results_are_not_committed() {
    let mut session = loaded_session();
    session.apply_mapping(session.detect_mapping()).unwrap();

    session.add_operation(DataOperation::filter("question_id", vec!["q1".into()], false));
    let stale = session.begin_refresh();
    session.clear_operations();
    session.add_operation(DataOperation::sort("question_id", SortDirection::Desc));
    let current = session.begin_refresh();

    let current_view = current.run(&NoopExecutor).await;
    let stale_view = stale.run(&NoopExecutor).await;
    assert!(session.commit(current_view));
    assert!(!session.commit(stale_view));

    let ids = session
        .rows()
        .iter()
        .map(|row| row.get("question_id").cloned())
        .collect::<Vec<_>>();
    assert_eq!(ids, [Some(json!("q3")), Some(json!("q1"))]);
}

#[tokio::test]
async fn refresh_applies_renames_and_custom_operations() {
    let mut session = loaded_session();
    session.apply_mapping(session.detect_mapping()).unwrap();
    session.rename_models(Some(ModelNames {
        model_a: "baseline".into(),
        model_b: "candidate".into(),
    }));
    let op = DataOperation::custom("filter score_a_value > 0.75");
    let id = op.id.clone();
    session.add_operation(op);
    assert!(session.refresh(&ExpressionExecutor).await);
    assert_eq!(session.rows().len(), 1);
    assert!(session.rows()[0].get("score_baseline_value").is_some());
    assert!(session.failures().is_empty());

    assert!(session.remove_operation(&id));
    assert!(session.refresh(&ExpressionExecutor).await);
    assert_eq!(session.rows().len(), 2);
    assert_eq!(session.transformed_rows().len(), 2);
}

#[test]
fn filter_and_rename_changes_show_without_refresh() {
    let mut session = loaded_session();
    session.apply_mapping(session.detect_mapping()).unwrap();

    let filter = DataOperation::filter("question_id", vec!["q3".into()], false);
    let id = filter.id.clone();
    session.add_operation(filter);
    assert_eq!(session.rows().len(), 1);
    assert_eq!(session.rows()[0].get("question_id"), Some(&json!("q3")));

    assert!(session.remove_operation(&id));
    assert_eq!(session.rows().len(), 2);

    session.add_operation(DataOperation::sort("question_id", SortDirection::Desc));
    session.rename_models(Some(ModelNames {
        model_a: "baseline".into(),
        model_b: "candidate".into(),
    }));
    assert_eq!(session.rows()[0].get("question_id"), Some(&json!("q3")));
    assert!(session.score_columns().contains(&"score_baseline_value".to_string()));
    assert!(!session.score_columns().contains(&"score_gpt-4_value".to_string()));

    session.add_operation(DataOperation::custom("filter false"));
    assert_eq!(session.rows().len(), 2);
    session.clear_operations();
    assert_eq!(session.rows()[0].get("question_id"), Some(&json!("q1")));
}

struct FakeClustering {
    seen: RefCell<Option<ClusterRequest>>,
}

#[async_trait(?Send)]
impl ClusteringService for FakeClustering {
    async fn cluster(&self, request: ClusterRequest) -> Result<ClusterResponse, ExecutorError> {
        *self.seen.borrow_mut() = Some(request);
        let scores = json!({"cluster_id": 9, "model": "gpt-4", "quality_accuracy": 0.8, "quality_accuracy_delta": 0.1});
        Ok(ClusterResponse {
            clusters: vec![Cluster {
                id: ClusterId::Int(9),
                label: "long answers".into(),
                size: 2,
                property_ids: Vec::new(),
                meta: ClusterMeta::default(),
            }],
            metrics: MetricsPayload {
                model_cluster_scores: vec![scores.as_object().cloned().unwrap()],
                ..MetricsPayload::default()
            },
            total_conversations_by_model: None,
            total_unique_conversations: Some(2),
        })
    }
}

struct FailingMetrics;

#[async_trait(?Send)]
impl MetricsService for FailingMetrics {
    async fn recompute(&self, _request: MetricsRequest) -> Result<ClusterResponse, ExecutorError> {
        Err(ExecutorError::Unavailable("metrics backend offline".into()))
    }
}

#[tokio::test]
async fn clustering_results_are_enriched() {
    let mut session = loaded_session();
    session.apply_mapping(session.detect_mapping()).unwrap();
    let service = FakeClustering {
        seen: RefCell::new(None),
    };
    let response = session
        .run_clustering(&service, Vec::new(), Map::new())
        .await
        .unwrap();
    assert_eq!(response.total_unique_conversations, Some(2));

    let request = service.seen.borrow().clone().unwrap();
    assert_eq!(request.operational_rows.len(), 2);
    assert_eq!(request.operational_rows[0]["score_a"], json!({"value": 1.0}));

    let meta = &session.clusters()[0].meta;
    assert_eq!(meta.quality_by_model["gpt-4"]["accuracy"], 0.8);
    assert_eq!(meta.quality_delta_by_model["gpt-4"]["accuracy"], 0.1);

    let err = session
        .recompute_metrics(&FailingMetrics, Vec::new(), None)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("metrics backend offline"));
    assert_eq!(session.clusters().len(), 1);
}

#[test]
fn metrics_payload_without_rows_keeps_clusters() {
    let mut session = Session::default();
    let cluster = Cluster {
        id: ClusterId::Text("c".into()),
        label: "c".into(),
        size: 1,
        property_ids: Vec::new(),
        meta: ClusterMeta::default(),
    };
    session.set_clusters(vec![cluster.clone()]);
    session.apply_metrics_payload(&MetricsPayload::default());
    assert_eq!(session.clusters(), [cluster]);
}

#[test]
fn configuration_loads_from_yaml_file() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "explorer.yaml",
        "detection:\n  prompt_column: question\nenrichment:\n  excluded_markers: [\"_pvalue\"]\n",
    );
    let config = ExplorerConfig::load(&path).unwrap();
    assert_eq!(config.detection.prompt_column, "question");
    assert_eq!(config.detection.score_marker, "score");
    assert!(config.enrichment.is_excluded("quality_delta_accuracy_pvalue"));
    assert!(!config.enrichment.is_excluded("quality_delta_accuracy_ci_lower"));

    let raw = raw_rows(json!([{"Question": "q", "model_response": "r"}]));
    let mut session = Session::new(config);
    session.load(raw, strings(&["Question", "model_response"]));
    assert_eq!(session.detect_mapping().prompt_col.as_deref(), Some("Question"));
    assert!(ExplorerConfig::load(&workspace.path().join("missing.yaml")).is_err());
}
