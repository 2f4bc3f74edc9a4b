use async_trait::async_trait;
use petcare_flow::{
    PipelineError, PipelineState, PipelineStep, Result, Stage, StageOutput, SymptomData, json,
};
use std::sync::Arc;
use tracing::info;

use super::complete;
use crate::llm::{CompletionRequest, LanguageModel};

const PREAMBLE: &str = r#"You are the intake nurse at a veterinary clinic. Turn the guardian's description of their pet's problem into a structured record.

Rules:
- Record only what the guardian said. Use null for anything not mentioned; never guess.
- A "[종: ...]" tag in the text is the authoritative species.
- Write every free-text value in Korean.
- red_flags lists only these tags when present: bleeding, seizure, collapse, difficulty_breathing, unconscious.

Return only valid JSON in this shape:
{
  "species": "개|고양이|새|토끼|기타|null",
  "breed": "string or null",
  "age": number in years or null,
  "sex": "string or null",
  "weight": number in kg or null,
  "main_symptoms": ["..."],
  "onset_time": "string or null",
  "duration": "string or null",
  "severity_perception": "string or null",
  "appetite_changes": "string or null",
  "water_intake_changes": "string or null",
  "urination_changes": "string or null",
  "defecation_changes": "string or null",
  "behavior_changes": ["..."],
  "red_flags": ["..."]
}"#;

/// Extracts a structured symptom record from the guardian's free text.
pub struct SymptomIntakeTask {
    llm: Arc<dyn LanguageModel>,
    model: String,
}

impl SymptomIntakeTask {
    pub fn new(llm: Arc<dyn LanguageModel>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Stage for SymptomIntakeTask {
    fn step(&self) -> PipelineStep {
        PipelineStep::SymptomIntake
    }

    async fn run(&self, state: &PipelineState, user_input: &str) -> Result<StageOutput> {
        let input = if user_input.trim().is_empty() {
            state.user_input()
        } else {
            user_input
        };
        if input.trim().is_empty() {
            return Err(PipelineError::MissingInput("symptom description".to_string()));
        }

        info!(stage = "symptom_intake", chars = input.len(), "Extracting symptoms");

        let request = CompletionRequest::new(
            &self.model,
            PREAMBLE,
            format!("Guardian's description:\n{input}"),
        )
        .temperature(0.2);
        let reply = complete(self.llm.as_ref(), self.step(), request).await?;

        let mut data: SymptomData = json::extract_or(&reply, SymptomData::fallback(input));
        if data.raw_input.is_none() {
            data.raw_input = Some(input.to_string());
        }

        info!(
            stage = "symptom_intake",
            species = data.species_label(),
            symptoms = data.main_symptoms.len(),
            red_flags = data.red_flags.len(),
            "Symptoms extracted"
        );
        Ok(StageOutput::SymptomIntake(data))
    }
}
