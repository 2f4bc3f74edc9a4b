//! Typed payloads produced by the pipeline stages.
//!
//! Every payload is decoded leniently from model output: unknown labels, numbers
//! sent as strings ("9세", "4.5kg") and `null`s degrade to defaults field by field,
//! and fields the model adds on its own are kept in `extra`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognised label: {0}")]
pub struct UnknownLabel(pub String);

/// Risk label assigned by the medical stage. Ordered `Low < Medium < High < Emergency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Emergency,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [Self::Low, Self::Medium, Self::High, Self::Emergency];

    /// low=1, medium=2, high=3, emergency=4
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Emergency => 4,
        }
    }

    /// Fixed lookup onto the five-point triage scale.
    pub fn to_triage_level(self) -> TriageLevel {
        match self {
            Self::Low => TriageLevel::Low,
            Self::Medium => TriageLevel::Moderate,
            Self::High => TriageLevel::High,
            Self::Emergency => TriageLevel::Emergency,
        }
    }

    /// Inverse of [`RiskLevel::to_triage_level`]; INFO folds into `Low`.
    pub fn from_triage_level(level: TriageLevel) -> Self {
        match level {
            TriageLevel::Info | TriageLevel::Low => Self::Low,
            TriageLevel::Moderate => Self::Medium,
            TriageLevel::High => Self::High,
            TriageLevel::Emergency => Self::Emergency,
        }
    }
}

impl FromStr for RiskLevel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "낮음" => Ok(Self::Low),
            "medium" | "moderate" | "보통" | "중간" => Ok(Self::Medium),
            "high" | "높음" => Ok(Self::High),
            "emergency" | "critical" | "응급" => Ok(Self::Emergency),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for RiskLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Emergency => "emergency",
        };
        f.write_str(label)
    }
}

/// Five-point triage category. Ordered `Info < Low < Moderate < High < Emergency`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriageLevel {
    #[default]
    Info,
    Low,
    Moderate,
    High,
    Emergency,
}

impl TriageLevel {
    pub const ALL: [TriageLevel; 5] = [
        Self::Info,
        Self::Low,
        Self::Moderate,
        Self::High,
        Self::Emergency,
    ];
}

impl FromStr for TriageLevel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INFO" => Ok(Self::Info),
            "LOW" => Ok(Self::Low),
            "MODERATE" => Ok(Self::Moderate),
            "HIGH" => Ok(Self::High),
            "EMERGENCY" => Ok(Self::Emergency),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for TriageLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Moderate => "MODERATE",
            Self::High => "HIGH",
            Self::Emergency => "EMERGENCY",
        };
        f.write_str(label)
    }
}

/// ACT colour band derived from the final urgency score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActColor {
    Red,
    Orange,
    Yellow,
    #[default]
    Green,
}

impl ActColor {
    /// Green=0 .. Red=3
    pub fn severity(self) -> u8 {
        match self {
            Self::Green => 0,
            Self::Yellow => 1,
            Self::Orange => 2,
            Self::Red => 3,
        }
    }
}

impl FromStr for ActColor {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "red" => Ok(Self::Red),
            "orange" => Ok(Self::Orange),
            "yellow" => Ok(Self::Yellow),
            "green" => Ok(Self::Green),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

/// Structured symptom record extracted from the guardian's description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymptomData {
    #[serde(default, deserialize_with = "lenient::text")]
    pub species: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub breed: Option<String>,
    /// Years
    #[serde(default, deserialize_with = "lenient::number")]
    pub age: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub sex: Option<String>,
    /// Kilograms
    #[serde(default, deserialize_with = "lenient::number")]
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub main_symptoms: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub onset_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub severity_perception: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub appetite_changes: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub water_intake_changes: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub urination_changes: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub defecation_changes: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub behavior_changes: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub red_flags: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub raw_input: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SymptomData {
    /// Payload used when the model reply could not be parsed.
    pub fn fallback(raw_input: &str) -> Self {
        Self {
            raw_input: Some(raw_input.to_string()),
            ..Self::default()
        }
    }

    pub fn species_label(&self) -> &str {
        self.species.as_deref().unwrap_or("unknown")
    }
}

/// Visual findings from the guardian's photos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionData {
    #[serde(default, deserialize_with = "lenient::flag")]
    pub has_images: bool,
    #[serde(default, deserialize_with = "lenient::count")]
    pub image_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub image_urls: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub visual_findings: Vec<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub wound_detected: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub swelling_detected: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub skin_issues_detected: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub eye_issues_detected: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub posture_abnormalities: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub visible_distress: bool,
    #[serde(default, deserialize_with = "lenient::number")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub detailed_observations: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VisionData {
    pub fn without_images() -> Self {
        Self::default()
    }

    /// Payload used when the model reply could not be parsed.
    pub fn fallback(image_refs: &[String]) -> Self {
        Self {
            has_images: true,
            image_count: Some(image_refs.len() as u32),
            image_urls: image_refs.to_vec(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PossibleDisease {
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DifferentialDiagnosis {
    #[serde(default, alias = "name", deserialize_with = "lenient::text_or_empty")]
    pub condition: String,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub likelihood: String,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReasoning {
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub diagnosis: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub evidence_for: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub evidence_against: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub missing_info: Vec<String>,
}

impl lenient::Labelled for PossibleDisease {
    fn labelled(label: String) -> Self {
        Self {
            name: label,
            ..Self::default()
        }
    }
}

impl lenient::Labelled for DifferentialDiagnosis {
    fn labelled(label: String) -> Self {
        Self {
            condition: label,
            ..Self::default()
        }
    }
}

impl lenient::Labelled for DiagnosticReasoning {
    fn labelled(label: String) -> Self {
        Self {
            diagnosis: label,
            ..Self::default()
        }
    }
}

/// Differential diagnosis and risk classification from the medical stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalData {
    #[serde(default, deserialize_with = "lenient::text")]
    pub primary_assessment: Option<String>,
    #[serde(
        rename = "riskLevel",
        alias = "risk_level",
        default,
        deserialize_with = "lenient::optional"
    )]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, deserialize_with = "lenient::entry_list")]
    pub possible_diseases: Vec<PossibleDisease>,
    #[serde(default, deserialize_with = "lenient::entry_list")]
    pub differential_diagnosis: Vec<DifferentialDiagnosis>,
    #[serde(default, deserialize_with = "lenient::entry_list")]
    pub reasoning: Vec<DiagnosticReasoning>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub risk_factors: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub additional_questions: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub recommended_tests: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub recommended_exams: Vec<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub certainty_level: Option<String>,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub medication_guidance: String,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub final_notes_for_care_agent: String,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub notes: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MedicalData {
    /// Payload used when the model reply could not be parsed.
    pub fn fallback() -> Self {
        Self {
            risk_level: Some(RiskLevel::Medium),
            ..Self::default()
        }
    }

    /// Risk label with the `medium` default applied.
    pub fn risk(&self) -> RiskLevel {
        self.risk_level.unwrap_or(RiskLevel::Medium)
    }

    /// Fills `differential_diagnosis` from `possible_diseases` when the model only sent the latter.
    pub fn normalize(mut self) -> Self {
        if self.differential_diagnosis.is_empty() && !self.possible_diseases.is_empty() {
            self.differential_diagnosis = self
                .possible_diseases
                .iter()
                .map(|disease| DifferentialDiagnosis {
                    condition: disease.name.clone(),
                    likelihood: likelihood_label(disease.probability.unwrap_or(0.0)).to_string(),
                    reasoning: String::new(),
                })
                .collect();
        }
        self
    }

    pub fn top_condition(&self) -> Option<&str> {
        self.differential_diagnosis
            .first()
            .map(|d| d.condition.as_str())
            .filter(|c| !c.is_empty())
    }
}

fn likelihood_label(probability: f64) -> &'static str {
    if probability > 0.7 {
        "high"
    } else if probability > 0.4 {
        "medium"
    } else {
        "low"
    }
}

/// Urgency assessment from the triage stage, after PSHVM weighting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageData {
    /// Final score on the 0-5 scale
    #[serde(default, deserialize_with = "lenient::urgency")]
    pub urgency_score: u8,
    #[serde(default, deserialize_with = "lenient::score")]
    pub base_score: Option<i64>,
    #[serde(default, deserialize_with = "lenient::score_or_zero")]
    pub weight_adjustment: i64,
    /// Unrecognised levels are coerced to INFO
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub triage_level: TriageLevel,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub act_color: ActColor,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub justification: String,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub risk_assessment: String,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub pshvm_factors: Vec<String>,
    /// Hours until a vet visit is advised; absent for INFO
    #[serde(default, deserialize_with = "lenient::number")]
    pub time_sensitivity: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TriageData {
    /// Payload used when the model reply could not be parsed.
    pub fn fallback() -> Self {
        Self {
            base_score: Some(0),
            ..Self::default()
        }
    }
}

/// Guardian-facing care plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CareplanData {
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub home_care_instructions: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub things_to_avoid: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub when_to_see_vet: String,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub emergency_indicators: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub monitoring_guidance: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub supportive_message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Field decoders that degrade instead of failing the whole payload.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer, de::DeserializeOwned};
    use serde_json::Value;
    use std::str::FromStr;

    /// List entries that can also be given as a bare label.
    pub trait Labelled: DeserializeOwned {
        fn labelled(label: String) -> Self;
    }

    /// Objects decode as `T`, bare strings become labels, anything else is dropped.
    pub fn entry_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Labelled,
    {
        let entry = |item: Value| match item {
            Value::String(s) if !s.trim().is_empty() => Some(T::labelled(s)),
            item @ Value::Object(_) => serde_json::from_value(item).ok(),
            _ => None,
        };

        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Array(items)) => items.into_iter().filter_map(entry).collect(),
            Some(other) => entry(other).into_iter().collect(),
            None => Vec::new(),
        })
    }

    pub fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(s)) => s.parse().ok(),
            Some(Value::Number(n)) => n.to_string().parse().ok(),
            _ => None,
        })
    }

    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + Default,
    {
        optional(deserializer).map(Option::unwrap_or_default)
    }

    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                (!trimmed.is_empty() && trimmed != "null").then(|| s)
            }
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        text(deserializer).map(Option::unwrap_or_default)
    }

    pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
            _ => Vec::new(),
        })
    }

    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => matches!(
                s.trim().to_lowercase().as_str(),
                "true" | "yes" | "예" | "있음"
            ),
            _ => false,
        })
    }

    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(value_as_f64))
    }

    pub fn score<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        number(deserializer).map(|n| n.filter(|v| v.is_finite()).map(|v| v.round() as i64))
    }

    pub fn score_or_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        score(deserializer).map(|n| n.unwrap_or(0))
    }

    /// Score clamped onto the 0-5 urgency scale.
    pub fn urgency<'de, D>(deserializer: D) -> Result<u8, D::Error>
    where
        D: Deserializer<'de>,
    {
        score(deserializer).map(|n| n.unwrap_or(0).clamp(0, 5) as u8)
    }

    pub fn count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        score(deserializer).map(|n| n.filter(|v| *v >= 0).map(|v| v as u32))
    }

    pub fn value_as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => leading_number(s),
            _ => None,
        }
    }

    fn leading_number(s: &str) -> Option<f64> {
        let trimmed = s.trim();
        let end = trimmed
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
            .map(|(i, _)| i)
            .unwrap_or(trimmed.len());
        trimmed[..end].parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn risk_labels_parse_case_insensitively() {
        assert_eq!("Emergency".parse::<RiskLevel>(), Ok(RiskLevel::Emergency));
        assert_eq!(" HIGH ".parse::<RiskLevel>(), Ok(RiskLevel::High));
        assert_eq!("보통".parse::<RiskLevel>(), Ok(RiskLevel::Medium));
        assert!("severe-ish".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn risk_levels_map_onto_triage_scale() {
        assert_eq!(RiskLevel::Low.to_triage_level(), TriageLevel::Low);
        assert_eq!(RiskLevel::Medium.to_triage_level(), TriageLevel::Moderate);
        assert_eq!(RiskLevel::Emergency.to_triage_level(), TriageLevel::Emergency);
        assert_eq!(RiskLevel::from_triage_level(TriageLevel::Info), RiskLevel::Low);
        for risk in RiskLevel::ALL {
            assert_eq!(RiskLevel::from_triage_level(risk.to_triage_level()), risk);
        }
    }

    #[test]
    fn symptom_fields_decode_leniently() {
        let data: SymptomData = serde_json::from_value(json!({
            "species": "개",
            "breed": null,
            "age": "9세",
            "weight": 12.5,
            "main_symptoms": "구토",
            "red_flags": ["출혈", null],
            "duration": "null",
            "owner_mood": "worried"
        }))
        .unwrap();

        assert_eq!(data.species.as_deref(), Some("개"));
        assert_eq!(data.breed, None);
        assert_eq!(data.age, Some(9.0));
        assert_eq!(data.weight, Some(12.5));
        assert_eq!(data.main_symptoms, vec!["구토".to_string()]);
        assert_eq!(data.red_flags, vec!["출혈".to_string()]);
        assert_eq!(data.duration, None);
        assert_eq!(data.extra.get("owner_mood"), Some(&json!("worried")));
    }

    #[test]
    fn unknown_triage_level_is_coerced_to_info() {
        let data: TriageData = serde_json::from_value(json!({
            "triage_level": "SOMEWHAT_URGENT",
            "urgency_score": 7.4,
            "act_color": "purple"
        }))
        .unwrap();

        assert_eq!(data.triage_level, TriageLevel::Info);
        assert_eq!(data.urgency_score, 5);
        assert_eq!(data.act_color, ActColor::Green);
    }

    #[test]
    fn medical_risk_accepts_both_key_spellings() {
        let camel: MedicalData = serde_json::from_value(json!({ "riskLevel": "Emergency" })).unwrap();
        let snake: MedicalData = serde_json::from_value(json!({ "risk_level": "low" })).unwrap();
        let unknown: MedicalData = serde_json::from_value(json!({ "riskLevel": "???" })).unwrap();

        assert_eq!(camel.risk(), RiskLevel::Emergency);
        assert_eq!(snake.risk(), RiskLevel::Low);
        assert_eq!(unknown.risk_level, None);
        assert_eq!(unknown.risk(), RiskLevel::Medium);
    }

    #[test]
    fn differential_is_derived_from_possible_diseases() {
        let data: MedicalData = serde_json::from_value(json!({
            "possible_diseases": [
                { "name": "위장염", "probability": 0.8 },
                { "name": "췌장염", "probability": 0.5 },
                { "name": "이물 섭취", "probability": 0.1 }
            ]
        }))
        .unwrap();
        let data = data.normalize();

        let likelihoods: Vec<&str> = data
            .differential_diagnosis
            .iter()
            .map(|d| d.likelihood.as_str())
            .collect();
        assert_eq!(likelihoods, vec!["high", "medium", "low"]);
        assert_eq!(data.top_condition(), Some("위장염"));
    }

    #[test]
    fn explicit_differential_is_kept() {
        let data: MedicalData = serde_json::from_value(json!({
            "possible_diseases": [{ "name": "A", "probability": 0.9 }],
            "differential_diagnosis": [{ "condition": "B", "likelihood": "low", "reasoning": "r" }]
        }))
        .unwrap();
        let data = data.normalize();
        assert_eq!(data.differential_diagnosis.len(), 1);
        assert_eq!(data.differential_diagnosis[0].condition, "B");
    }
}
