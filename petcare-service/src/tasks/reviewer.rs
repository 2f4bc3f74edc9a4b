use async_trait::async_trait;
use petcare_flow::{
    PipelineStep, Result, ReviewCase, ReviewJudgment, Reviewer, json,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::complete;
use crate::llm::{CompletionRequest, LanguageModel};

const PREAMBLE: &str = r#"You are the senior veterinarian reviewing two colleagues' assessments of the same case: the attending veterinarian's risk level and the triage officer's urgency level.

Review them independently:
- Decide whether each assessment is reasonable and, if they disagree, which is better supported.
- Look for missed findings and for over-diagnosis.
- Be conservative: when the assessments disagree, prefer the higher risk. When unsure, recommend a visit.
- Use criteria specific to the stated species. Write every free-text value in Korean.

Return only valid JSON in this shape:
{
  "agreement_with_medical": true/false,
  "agreement_with_triage": true/false,
  "recommended_risk_level": "low|medium|high|Emergency",
  "recommended_triage_score": number 0-5,
  "recommended_triage_level": "INFO|LOW|MODERATE|HIGH|EMERGENCY",
  "confidence_level": "높음|중간|낮음",
  "additional_concerns": ["..."],
  "final_recommendation": "...",
  "discrepancy_resolution": "..."
}"#;

/// Independent second-opinion model used by the consensus step.
pub struct ReviewerTask {
    llm: Arc<dyn LanguageModel>,
    model: String,
}

impl ReviewerTask {
    pub fn new(llm: Arc<dyn LanguageModel>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

/// Case summary handed to the reviewer.
fn case_summary(case: &ReviewCase<'_>) -> String {
    let species = case
        .symptom
        .and_then(|s| s.species.as_deref())
        .unwrap_or("알 수 없음");
    let symptoms = case
        .symptom
        .map(|s| s.main_symptoms.join(", "))
        .unwrap_or_default();

    let mut lines = vec![
        format!("Species: {species}"),
        format!("Main symptoms: {symptoms}"),
        format!(
            "Attending veterinarian's assessment: {}",
            case.medical.primary_assessment.as_deref().unwrap_or("N/A")
        ),
        format!("Attending veterinarian's risk level: {}", case.medical.risk()),
        format!(
            "Triage level: {} (score {})",
            case.triage.triage_level, case.triage.urgency_score
        ),
    ];
    if let Some(kind) = case.discrepancy.kind {
        lines.push(format!("Discrepancy detected: {kind:?}"));
    }
    lines.join("\n")
}

#[async_trait]
impl Reviewer for ReviewerTask {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn review(&self, case: &ReviewCase<'_>) -> Result<Option<ReviewJudgment>> {
        info!(
            stage = "consensus",
            model = %self.model,
            discrepancy = case.discrepancy.has_discrepancy,
            "Requesting collaborative review"
        );

        let request = CompletionRequest::new(
            &self.model,
            PREAMBLE,
            format!("Case:\n{}", case_summary(case)),
        )
        .temperature(0.2);
        let reply = complete(self.llm.as_ref(), PipelineStep::Consensus, request).await?;

        match json::extract::<ReviewJudgment>(&reply) {
            Ok(judgment) => Ok(Some(judgment)),
            Err(err) => {
                warn!(stage = "consensus", error = %err, "Reviewer reply is not valid JSON");
                Ok(None)
            }
        }
    }
}
