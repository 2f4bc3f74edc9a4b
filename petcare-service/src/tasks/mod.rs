pub mod careplan;
pub mod medical;
pub mod reviewer;
pub mod symptom_intake;
pub mod triage;
pub mod vision;

pub use careplan::CareplanTask;
pub use medical::MedicalAnalysisTask;
pub use reviewer::ReviewerTask;
pub use symptom_intake::SymptomIntakeTask;
pub use triage::TriageTask;
pub use vision::VisionTask;

use petcare_flow::{PipelineError, PipelineStep, Result, SymptomData};
use serde::Serialize;
use tracing::error;

use crate::llm::{CompletionRequest, LanguageModel};

/// Sends one request for `step`; any transport failure is fatal for the step.
pub(crate) async fn complete(
    llm: &dyn LanguageModel,
    step: PipelineStep,
    request: CompletionRequest,
) -> Result<String> {
    let model = request.model.clone();
    llm.complete(request).await.map_err(|e| {
        error!(stage = %step, model = %model, error = %e, "LLM call failed");
        PipelineError::stage_failed(step, e)
    })
}

pub(crate) fn require<'a, T>(slot: Option<&'a T>, what: &str) -> Result<&'a T> {
    slot.ok_or_else(|| PipelineError::MissingInput(what.to_string()))
}

pub(crate) fn pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Species label for prompts, in the guardian's language.
pub(crate) fn species_of(symptom: &SymptomData) -> &str {
    symptom.species.as_deref().unwrap_or("알 수 없음")
}
