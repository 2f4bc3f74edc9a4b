use crate::config::ServiceConfig;
use crate::llm::LanguageModel;
use crate::tasks::*;
use petcare_flow::{
    FlowRunner, InMemorySessionStorage, Pipeline, PostgresSessionStorage, Result, SessionStorage,
};
use std::sync::Arc;
use tracing::{error, info};

pub const PIPELINE_ID: &str = "pet_triage";

/// Wires every stage and the consensus reviewer to the models named in `config`.
pub fn build_triage_pipeline(
    config: &ServiceConfig,
    llm: Arc<dyn LanguageModel>,
) -> Result<Pipeline> {
    let models = &config.models;

    Pipeline::builder(PIPELINE_ID)
        .add_stage(Arc::new(SymptomIntakeTask::new(
            llm.clone(),
            &models.symptom_intake,
        )))
        .add_stage(Arc::new(VisionTask::new(llm.clone(), &models.vision)))
        .add_stage(Arc::new(MedicalAnalysisTask::new(
            llm.clone(),
            &models.medical,
        )))
        .add_stage(Arc::new(TriageTask::new(llm.clone(), &models.triage)))
        .add_stage(Arc::new(CareplanTask::new(llm.clone(), &models.careplan)))
        .reviewer(Arc::new(ReviewerTask::new(llm, &models.reviewer)))
        .build()
}

/// PostgreSQL when `DATABASE_URL` is set and reachable, in-memory otherwise.
pub async fn create_session_storage(config: &ServiceConfig) -> Arc<dyn SessionStorage> {
    let Some(database_url) = config.database_url.as_deref() else {
        info!("Using in-memory session storage (set DATABASE_URL to use PostgreSQL)");
        return Arc::new(InMemorySessionStorage::new());
    };

    info!("Using PostgreSQL session storage");
    match PostgresSessionStorage::connect(database_url).await {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            error!(
                "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                e
            );
            Arc::new(InMemorySessionStorage::new())
        }
    }
}

pub fn create_flow_runner(
    pipeline: Arc<Pipeline>,
    session_storage: Arc<dyn SessionStorage>,
) -> FlowRunner {
    FlowRunner::new(pipeline, session_storage)
}
