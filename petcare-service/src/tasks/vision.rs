use async_trait::async_trait;
use petcare_flow::{
    PipelineState, PipelineStep, Result, Stage, StageOutput, VisionData, json,
};
use std::sync::Arc;
use tracing::info;

use super::{complete, pretty, species_of};
use crate::llm::{CompletionRequest, LanguageModel};

const PREAMBLE: &str = r#"You are a veterinary imaging assistant. Look at the guardian's photos of their pet and describe only what is visible.

Rules:
- Do not diagnose. Report visible findings such as wounds, swelling, skin lesions, eye discharge, abnormal posture or signs of distress.
- Judge the photos against the anatomy of the stated species.
- Write every free-text value in Korean.

Return only valid JSON in this shape:
{
  "visual_findings": ["..."],
  "wound_detected": true/false,
  "swelling_detected": true/false,
  "skin_issues_detected": true/false,
  "eye_issues_detected": true/false,
  "posture_abnormalities": true/false,
  "visible_distress": true/false,
  "confidence": number between 0 and 1,
  "detailed_observations": "..."
}"#;

/// Analyses the guardian's photos; only scheduled when image references exist.
pub struct VisionTask {
    llm: Arc<dyn LanguageModel>,
    model: String,
}

impl VisionTask {
    pub fn new(llm: Arc<dyn LanguageModel>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Stage for VisionTask {
    fn step(&self) -> PipelineStep {
        PipelineStep::Vision
    }

    async fn run(&self, state: &PipelineState, _user_input: &str) -> Result<StageOutput> {
        let image_refs = state.image_refs();
        if image_refs.is_empty() {
            return Ok(StageOutput::Vision(VisionData::without_images()));
        }

        info!(stage = "vision", images = image_refs.len(), "Analysing images");

        let mut prompt = String::new();
        if let Some(symptom) = state.symptom() {
            prompt.push_str(&format!(
                "Species: {}\nReported symptoms:\n{}\n\n",
                species_of(symptom),
                pretty(&symptom.main_symptoms)?
            ));
        }
        prompt.push_str(&format!("{} photo(s) attached.", image_refs.len()));

        let request = CompletionRequest::new(&self.model, PREAMBLE, prompt)
            .temperature(0.2)
            .images(image_refs);
        let reply = complete(self.llm.as_ref(), self.step(), request).await?;

        let mut data: VisionData = json::extract_or(&reply, VisionData::fallback(image_refs));
        data.has_images = true;
        data.image_count = Some(image_refs.len() as u32);
        data.image_urls = image_refs.to_vec();

        info!(
            stage = "vision",
            findings = data.visual_findings.len(),
            wound = data.wound_detected,
            "Image analysis complete"
        );
        Ok(StageOutput::Vision(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::tasks::fixtures;

    #[tokio::test]
    async fn sends_images_and_records_them() {
        let llm = Arc::new(ScriptedModel::replying(&[
            r#"{"visual_findings": ["앞다리 찰과상"], "wound_detected": true, "confidence": 0.7}"#,
        ]));
        let task = VisionTask::new(llm.clone(), "vision-model");
        let mut state = PipelineState::new("다리를 절어요", vec!["https://img/leg.jpg".to_string()]);
        state
            .apply(StageOutput::SymptomIntake(fixtures::symptom()))
            .unwrap();

        let StageOutput::Vision(data) = task.run(&state, "").await.unwrap() else {
            panic!("unexpected stage output");
        };

        assert!(data.has_images);
        assert!(data.wound_detected);
        assert_eq!(data.image_count, Some(1));
        assert_eq!(data.image_urls, vec!["https://img/leg.jpg".to_string()]);

        let request = llm.last_request().unwrap();
        assert_eq!(request.image_urls, vec!["https://img/leg.jpg".to_string()]);
        assert!(request.prompt.contains("Species: 개"));
    }

    #[tokio::test]
    async fn unparseable_reply_keeps_image_metadata() {
        let llm = Arc::new(ScriptedModel::replying(&["사진이 흐릿합니다"]));
        let task = VisionTask::new(llm, "vision-model");
        let refs = vec!["a.jpg".to_string(), "b.jpg".to_string()];
        let state = PipelineState::new("눈이 빨개요", refs.clone());

        let output = task.run(&state, "").await.unwrap();
        assert_eq!(output, StageOutput::Vision(VisionData::fallback(&refs)));
    }

    #[tokio::test]
    async fn no_images_means_no_call() {
        let llm = Arc::new(ScriptedModel::default());
        let task = VisionTask::new(llm.clone(), "vision-model");
        let state = PipelineState::new("기침", Vec::new());

        let output = task.run(&state, "").await.unwrap();
        assert_eq!(output, StageOutput::Vision(VisionData::without_images()));
        assert_eq!(llm.call_count(), 0);
    }
}
