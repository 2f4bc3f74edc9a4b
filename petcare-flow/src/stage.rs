use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    consensus::CollaborativeResult,
    error::Result,
    models::{CareplanData, MedicalData, SymptomData, TriageData, VisionData},
    state::{PipelineState, PipelineStep},
};

/// Uniform envelope returned by every step: a stage tag and its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "payload", rename_all = "snake_case")]
pub enum StageOutput {
    SymptomIntake(SymptomData),
    Vision(VisionData),
    MedicalAnalysis(MedicalData),
    Triage(TriageData),
    Consensus(CollaborativeResult),
    Careplan(CareplanData),
}

impl StageOutput {
    pub fn step(&self) -> PipelineStep {
        match self {
            Self::SymptomIntake(_) => PipelineStep::SymptomIntake,
            Self::Vision(_) => PipelineStep::Vision,
            Self::MedicalAnalysis(_) => PipelineStep::MedicalAnalysis,
            Self::Triage(_) => PipelineStep::Triage,
            Self::Consensus(_) => PipelineStep::Consensus,
            Self::Careplan(_) => PipelineStep::Careplan,
        }
    }
}

/// One LLM-backed pipeline step.
///
/// Implementations read whatever earlier slots they need from `state`, call their
/// model and return a payload. A reply that cannot be parsed must still produce
/// the stage's default payload; only transport or unexpected failures are errors.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Step this stage fills
    fn step(&self) -> PipelineStep;

    async fn run(&self, state: &PipelineState, user_input: &str) -> Result<StageOutput>;
}
