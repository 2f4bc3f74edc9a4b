use async_trait::async_trait;
use petcare_flow::{
    MedicalData, PipelineState, PipelineStep, Result, Stage, StageOutput, json,
};
use std::sync::Arc;
use tracing::info;

use super::{complete, pretty, require, species_of};
use crate::llm::{CompletionRequest, LanguageModel};

const PREAMBLE: &str = r#"You are the attending veterinarian. From the intake record (and image findings, if any) produce a differential diagnosis and a risk classification.

Rules:
- Use criteria specific to the stated species; never apply another species' norms.
- Be conservative: when unsure, classify the risk higher and recommend a visit.
- riskLevel is exactly one of: low, medium, high, Emergency.
- Write every free-text value in Korean.

Return only valid JSON in this shape:
{
  "primary_assessment": "...",
  "riskLevel": "low|medium|high|Emergency",
  "possible_diseases": [{"name": "...", "probability": number between 0 and 1}],
  "differential_diagnosis": [{"condition": "...", "likelihood": "high|medium|low", "reasoning": "..."}],
  "reasoning": [{"diagnosis": "...", "confidence": number, "evidence_for": ["..."], "evidence_against": ["..."], "missing_info": ["..."]}],
  "risk_factors": ["..."],
  "additional_questions": ["..."],
  "recommended_tests": ["..."],
  "recommended_exams": ["..."],
  "confidence": number between 0 and 1,
  "certainty_level": "...",
  "medication_guidance": "...",
  "final_notes_for_care_agent": "...",
  "notes": "..."
}"#;

/// Differential diagnosis and risk label from the symptom (and vision) results.
pub struct MedicalAnalysisTask {
    llm: Arc<dyn LanguageModel>,
    model: String,
}

impl MedicalAnalysisTask {
    pub fn new(llm: Arc<dyn LanguageModel>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Stage for MedicalAnalysisTask {
    fn step(&self) -> PipelineStep {
        PipelineStep::MedicalAnalysis
    }

    async fn run(&self, state: &PipelineState, _user_input: &str) -> Result<StageOutput> {
        let symptom = require(state.symptom(), "symptom intake result")?;
        info!(stage = "medical_analysis", species = species_of(symptom), "Starting medical analysis");

        let mut prompt = format!(
            "Patient species: {}\n\nIntake record:\n{}\n",
            species_of(symptom),
            pretty(symptom)?
        );
        if let Some(vision) = state.vision().filter(|v| v.has_images) {
            prompt.push_str(&format!("\nImage findings:\n{}\n", pretty(vision)?));
        }

        let request = CompletionRequest::new(&self.model, PREAMBLE, prompt).temperature(0.1);
        let reply = complete(self.llm.as_ref(), self.step(), request).await?;

        let data = json::extract_or(&reply, MedicalData::fallback()).normalize();

        info!(
            stage = "medical_analysis",
            risk_level = %data.risk(),
            top_condition = data.top_condition().unwrap_or("-"),
            "Medical analysis complete"
        );
        Ok(StageOutput::MedicalAnalysis(data))
    }
}
