use async_trait::async_trait;
use petcare_flow::{
    CareplanData, PipelineState, PipelineStep, Result, Stage, StageOutput, json,
};
use std::sync::Arc;
use tracing::info;

use super::{complete, pretty, require, species_of};
use crate::llm::{CompletionRequest, LanguageModel};

const PREAMBLE: &str = r#"You are a veterinary nurse writing home-care guidance for a worried pet guardian.

Rules:
- Match the urgency you are given: if the final triage level is HIGH or EMERGENCY, the first instruction is to go to a vet now.
- Give concrete, safe steps for the stated species. Never recommend human medication.
- Warm, calm and plain language. Write every free-text value in Korean.

Return only valid JSON in this shape:
{
  "home_care_instructions": ["..."],
  "things_to_avoid": ["..."],
  "when_to_see_vet": "...",
  "emergency_indicators": ["..."],
  "monitoring_guidance": ["..."],
  "supportive_message": "..."
}"#;

/// Guardian-facing care plan built from the reconciled urgency.
pub struct CareplanTask {
    llm: Arc<dyn LanguageModel>,
    model: String,
}

impl CareplanTask {
    pub fn new(llm: Arc<dyn LanguageModel>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Stage for CareplanTask {
    fn step(&self) -> PipelineStep {
        PipelineStep::Careplan
    }

    async fn run(&self, state: &PipelineState, _user_input: &str) -> Result<StageOutput> {
        let symptom = require(state.symptom(), "symptom intake result")?;
        let medical = require(state.medical(), "medical analysis result")?;
        let triage = require(state.triage(), "triage result")?;

        // Consensus overrides the raw triage result when it ran
        let (level, score) = state
            .consensus()
            .map(|c| (c.consensus.final_triage_level, c.consensus.final_urgency_score))
            .unwrap_or((triage.triage_level, triage.urgency_score));

        info!(stage = "careplan", triage_level = %level, urgency_score = score, "Generating care plan");

        let mut prompt = format!(
            "Patient species: {}\nMain symptoms: {}\nFinal triage level: {level} (score {score}/5)\n\
             Hours until a vet visit is advised: {}\n\nMedical findings:\n{}\n",
            species_of(symptom),
            symptom.main_symptoms.join(", "),
            triage
                .time_sensitivity
                .map(|h| h.to_string())
                .unwrap_or_else(|| "-".to_string()),
            pretty(medical)?,
        );
        if let Some(recommendation) = state
            .consensus()
            .and_then(|c| c.review.as_ref())
            .map(|review| review.final_recommendation.as_str())
            .filter(|text| !text.is_empty())
        {
            prompt.push_str(&format!("\nSenior reviewer recommendation: {recommendation}\n"));
        }

        let request = CompletionRequest::new(&self.model, PREAMBLE, prompt).temperature(0.4);
        let reply = complete(self.llm.as_ref(), self.step(), request).await?;

        let data: CareplanData = json::extract_or(&reply, CareplanData::default());

        info!(
            stage = "careplan",
            instructions = data.home_care_instructions.len(),
            "Care plan generated"
        );
        Ok(StageOutput::Careplan(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::tasks::fixtures;
    use petcare_flow::{
        CollaborativeResult, ConsensusDecision, ReviewJudgment, RiskLevel, TriageLevel,
        discrepancy::detect,
    };

    fn consensus() -> CollaborativeResult {
        CollaborativeResult {
            discrepancy: detect(Some(RiskLevel::Emergency), Some(TriageLevel::High), Some(4)),
            review: Some(ReviewJudgment {
                final_recommendation: "즉시 응급실 내원".to_string(),
                ..ReviewJudgment::default()
            }),
            consensus: ConsensusDecision {
                reached_agreement: true,
                final_risk_level: RiskLevel::Emergency,
                final_urgency_score: 5,
                final_triage_level: TriageLevel::Emergency,
                confidence: 0.9,
                reviewer_model: Some("reviewer".to_string()),
            },
        }
    }

    #[tokio::test]
    async fn uses_consensus_level_in_prompt() {
        let llm = Arc::new(ScriptedModel::replying(&[
            r#"{"home_care_instructions": ["즉시 병원으로 이동하세요"], "when_to_see_vet": "지금 바로"}"#,
        ]));
        let task = CareplanTask::new(llm.clone(), "careplan-model");
        let state = fixtures::state_with(vec![
            StageOutput::SymptomIntake(fixtures::symptom()),
            StageOutput::MedicalAnalysis(fixtures::medical()),
            StageOutput::Triage(fixtures::triage()),
            StageOutput::Consensus(consensus()),
        ]);

        let StageOutput::Careplan(data) = task.run(&state, "").await.unwrap() else {
            panic!("unexpected stage output");
        };
        assert_eq!(data.when_to_see_vet, "지금 바로");

        let request = llm.last_request().unwrap();
        assert_eq!(request.temperature, 0.4);
        assert!(request.prompt.contains("Final triage level: EMERGENCY (score 5/5)"));
        assert!(request.prompt.contains("즉시 응급실 내원"));
    }

    #[tokio::test]
    async fn unparseable_reply_yields_empty_plan() {
        let llm = Arc::new(ScriptedModel::replying(&["잘 돌봐주세요"]));
        let task = CareplanTask::new(llm, "careplan-model");
        let state = fixtures::state_with(vec![
            StageOutput::SymptomIntake(fixtures::symptom()),
            StageOutput::MedicalAnalysis(fixtures::medical()),
            StageOutput::Triage(fixtures::triage()),
        ]);

        let output = task.run(&state, "").await.unwrap();
        assert_eq!(output, StageOutput::Careplan(CareplanData::default()));
    }
}
