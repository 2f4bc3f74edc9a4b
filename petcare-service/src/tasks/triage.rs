use async_trait::async_trait;
use petcare_flow::{
    PatientFacts, PipelineState, PipelineStep, PshvmWeighting, Result, Stage, StageOutput,
    TriageData, json,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::{complete, pretty, require, species_of};
use crate::llm::{CompletionRequest, LanguageModel};

const PREAMBLE: &str = r#"You are the triage officer of a veterinary emergency room. Using the attending veterinarian's findings, decide how urgently the pet needs care.

ACT colour levels:
- Red (act now): difficulty breathing, unconsciousness, heavy bleeding, seizures, paralysis, shock.
- Orange (within hours): persistent vomiting or diarrhoea, no appetite for 48+ hours, severe pain.
- Yellow (within 24 hours): coughing or sneezing, mild skin problems.

Triage levels and base scores:
- 0 INFO: general question, no immediate concern
- 1 LOW: minor issue, can wait 24-48 hours
- 2 MODERATE: see a vet within 24 hours
- 3 HIGH: see a vet within 6-12 hours
- 4 EMERGENCY: immediate veterinary care
- 5 critical emergency (Red)

Give base_score before any weighting; the PSHVM adjustments listed in the case are added afterwards.
Use criteria specific to the stated species. Be brief and direct. Write every free-text value in Korean.

Return only valid JSON in this shape:
{
  "urgency_score": number 0-5,
  "base_score": number 0-5,
  "triage_level": "INFO|LOW|MODERATE|HIGH|EMERGENCY",
  "act_color": "Red|Orange|Yellow|Green",
  "justification": "...",
  "risk_assessment": "...",
  "time_sensitivity": hours until a vet visit is advised, or null for INFO
}"#;

/// Urgency scoring. The model supplies a base score; PSHVM weighting and the ACT
/// colour are always recomputed locally.
pub struct TriageTask {
    llm: Arc<dyn LanguageModel>,
    model: String,
}

impl TriageTask {
    pub fn new(llm: Arc<dyn LanguageModel>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Stage for TriageTask {
    fn step(&self) -> PipelineStep {
        PipelineStep::Triage
    }

    async fn run(&self, state: &PipelineState, _user_input: &str) -> Result<StageOutput> {
        let symptom = require(state.symptom(), "symptom intake result")?;
        let medical = require(state.medical(), "medical analysis result")?;

        let weighting = PshvmWeighting::evaluate(&PatientFacts::from(symptom));
        info!(
            stage = "triage",
            weight_adjustment = weighting.total(),
            "PSHVM weighting evaluated"
        );

        let adjustments = if weighting.adjustments.is_empty() {
            "- none".to_string()
        } else {
            weighting
                .reasons()
                .iter()
                .map(|r| format!("- {r}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompt = format!(
            "Patient species: {species}\nMain symptoms: {symptoms}\nRed flags: {red_flags}\n\
             Severity: {severity}\nDuration: {duration}\n\
             Medical risk level: {risk}\nTop differential: {top}\n\n\
             PSHVM adjustments (total +{total}):\n{adjustments}\n\nMedical findings:\n{medical_json}",
            species = species_of(symptom),
            symptoms = symptom.main_symptoms.join(", "),
            red_flags = symptom.red_flags.join(", "),
            severity = symptom.severity_perception.as_deref().unwrap_or("알 수 없음"),
            duration = symptom.duration.as_deref().unwrap_or("알 수 없음"),
            risk = medical.risk(),
            top = medical.top_condition().unwrap_or("알 수 없음"),
            total = weighting.total(),
            medical_json = pretty(medical)?,
        );

        let request = CompletionRequest::new(&self.model, PREAMBLE, prompt).temperature(0.2);
        let reply = complete(self.llm.as_ref(), self.step(), request).await?;

        let data = match json::extract::<TriageData>(&reply) {
            Ok(parsed) => parsed.apply_weighting(&weighting, &symptom.red_flags),
            Err(err) => {
                warn!(stage = "triage", error = %err, "Triage reply is not valid JSON, using default payload");
                TriageData::fallback()
            }
        };

        info!(
            stage = "triage",
            triage_level = %data.triage_level,
            urgency_score = data.urgency_score,
            base_score = ?data.base_score,
            act_color = ?data.act_color,
            "Triage level determined"
        );
        Ok(StageOutput::Triage(data))
    }
}
