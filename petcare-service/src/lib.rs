pub mod config;
pub mod llm;
pub mod models;
pub mod persistence;
pub mod service;
pub mod tasks;
pub mod workflow;

pub use config::{ConfigError, ServiceConfig, StageModels};
pub use llm::{CompletionRequest, LanguageModel, OpenRouterModel};
pub use models::*;
pub use persistence::{FileReportStore, ReportStoreError};
pub use service::{AppState, build_router, create_app};
pub use workflow::{build_triage_pipeline, create_flow_runner, create_session_storage};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `LOG_FORMAT=pretty` gives human-readable output,
/// anything else structured JSON.
pub fn init_tracing(default_filter: &str) {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}
