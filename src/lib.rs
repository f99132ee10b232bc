pub mod clusters;
pub mod config;
pub mod data;
pub mod detect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod flatten;
pub mod mapping;
pub mod metrics;
pub mod normalize;
pub mod operations;
pub mod rows;
pub mod scores;
pub mod services;
pub mod session;
pub mod tidy;

use std::{env, sync::OnceLock};

use log::LevelFilter;

pub use crate::{
    clusters::{Cluster, ClusterId, ClusterMeta, MetricsPayload, enrich_clusters},
    config::ExplorerConfig,
    detect::detect_mapping,
    engine::{ChainOutput, apply_chain},
    executor::{ExpressionExecutor, NoopExecutor, RowTransformExecutor},
    flatten::{DisplayRow, ModelNames, flatten_rows},
    mapping::{ColumnMapping, Method, SelectedModels},
    metrics::normalize_metric_names,
    normalize::normalize_rows,
    operations::{DataOperation, OperationChain, SortDirection},
    rows::{OperationalRow, RowPayload},
    session::Session,
    tidy::pair_tidy_rows,
};

static LOGGER: OnceLock<()> = OnceLock::new();

/// Installs the `env_logger` backend once. `RUST_LOG` takes precedence over
/// the default of `info` for this crate.
pub fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("eval_explorer", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}
