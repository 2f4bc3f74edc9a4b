use chrono::{DateTime, Utc};
use petcare_flow::{Advance, FinalReport, PipelineState, PipelineStep, Session};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Body of `POST /api/triage` and `POST /api/sessions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageRequest {
    pub symptom_description: String,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub breed: Option<String>,
    /// Years
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub sex: Option<String>,
    /// Kilograms
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub image_urls: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    /// Department chosen in the client UI (ortho, derm, digestive, ...)
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub symptom_tags: Option<Vec<String>>,
    #[serde(default)]
    pub follow_up_answers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub free_text: Option<String>,
}

impl TriageRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.symptom_description.trim().is_empty() {
            return Err("symptom_description is required");
        }
        Ok(())
    }

    pub fn image_refs(&self) -> Vec<String> {
        self.image_urls.clone().unwrap_or_default()
    }

    /// Species name normalised to the Korean label the prompts use.
    pub fn normalized_species(&self) -> Option<String> {
        let species = self.species.as_deref()?.trim();
        if species.is_empty() {
            return None;
        }
        let normalized = match species.to_lowercase().as_str() {
            "cat" | "고양이" => "고양이",
            "dog" | "개" | "강아지" => "개",
            "rabbit" | "토끼" => "토끼",
            "hamster" | "햄스터" => "햄스터",
            "bird" | "새" => "새",
            "hedgehog" | "고슴도치" => "고슴도치",
            "reptile" | "파충류" => "파충류",
            _ => species,
        };
        Some(normalized.to_string())
    }

    /// Pipeline input text: the description prefixed with bracketed tags for the
    /// structured fields the client supplied.
    pub fn compose_user_input(&self) -> String {
        let species = self.normalized_species();
        let tags: Vec<&String> = self
            .symptom_tags
            .iter()
            .flatten()
            .filter(|t| !t.trim().is_empty())
            .collect();

        let mut parts = Vec::new();
        let structured = self.department.is_some() && !tags.is_empty();

        if structured || species.is_some() {
            parts.push(format!(
                "[종: {}]",
                species.as_deref().unwrap_or("알 수 없음")
            ));
        }
        parts.extend(self.patient_tags());

        if let (true, Some(department)) = (structured, self.department.as_deref()) {
            parts.push(format!("[진료과: {department}]"));
            let tags: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
            parts.push(format!("[증상 태그: {}]", tags.join(", ")));
            parts.push(
                self.free_text
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or(&self.symptom_description)
                    .to_string(),
            );

            let answers: Vec<String> = self
                .follow_up_answers
                .iter()
                .flatten()
                .map(|(question, answer)| format!("{question}: {answer}"))
                .collect();
            if !answers.is_empty() {
                parts.push(format!("[추가 정보: {}]", answers.join(" ")));
            }
        } else {
            parts.push(self.symptom_description.clone());
        }

        parts.join(" ")
    }

    fn patient_tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        if let Some(breed) = self.breed.as_deref().filter(|b| !b.trim().is_empty()) {
            tags.push(format!("[품종: {breed}]"));
        }
        if let Some(age) = self.age {
            tags.push(format!("[나이: {age}세]"));
        }
        if let Some(sex) = self.sex.as_deref().filter(|s| !s.trim().is_empty()) {
            tags.push(format!("[성별: {sex}]"));
        }
        if let Some(weight) = self.weight {
            tags.push(format!("[체중: {weight}kg]"));
        }
        tags
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResponse {
    pub success: bool,
    pub report: Option<FinalReport>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_as: Option<String>,
}

impl TriageResponse {
    pub fn completed(report: FinalReport, saved_as: Option<String>) -> Self {
        Self {
            success: true,
            report: Some(report),
            error: None,
            saved_as,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            report: None,
            error: Some(error.into()),
            saved_as: None,
        }
    }
}

/// Result of running one step of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub advance: Advance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_as: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub next_step: PipelineStep,
    pub complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: PipelineState,
}

impl From<Session> for SessionStatusResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            next_step: session.state.next_step(),
            complete: session.state.is_complete(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            state: session.state,
        }
    }
}
