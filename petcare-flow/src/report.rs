use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    consensus::CollaborativeResult,
    discrepancy::DiscrepancyKind,
    models::{
        ActColor, CareplanData, DifferentialDiagnosis, MedicalData, RiskLevel, SymptomData,
        TriageData, TriageLevel, VisionData,
    },
    state::PipelineState,
};

pub const REPORT_VERSION: &str = "v1";

/// Guardian-facing triage report merged from every stage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub meta: ReportMeta,
    pub patient: PatientInfo,
    pub summary: SymptomSummary,
    pub triage: TriageSection,
    pub differential_diagnosis: Vec<DifferentialDiagnosis>,
    pub care_plan: CarePlanSection,
    pub red_flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_analysis: Option<VisionSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub version: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub species: Option<String>,
    pub breed: Option<String>,
    pub age: Option<f64>,
    pub sex: Option<String>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymptomSummary {
    pub main_symptoms: Vec<String>,
    pub onset_time: Option<String>,
    pub duration: Option<String>,
    pub severity_perception: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageSection {
    pub urgency_score: u8,
    pub triage_level: TriageLevel,
    pub act_color: ActColor,
    pub justification: String,
    pub risk_assessment: String,
    pub time_sensitivity: Option<f64>,
    pub pshvm_factors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarePlanSection {
    pub home_care_instructions: Vec<String>,
    pub things_to_avoid: Vec<String>,
    pub when_to_see_vet: String,
    pub emergency_indicators: Vec<String>,
    pub monitoring_guidance: Vec<String>,
    pub supportive_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionSection {
    pub visual_findings: Vec<String>,
    pub wound_detected: bool,
    pub swelling_detected: bool,
    pub skin_issues_detected: bool,
    pub eye_issues_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSection {
    pub reached_agreement: bool,
    pub discrepancy: Option<DiscrepancyKind>,
    pub final_risk_level: RiskLevel,
    pub final_urgency_score: u8,
    pub final_triage_level: TriageLevel,
    pub confidence: f64,
    pub reviewer_model: Option<String>,
    pub final_recommendation: Option<String>,
    pub additional_concerns: Vec<String>,
}

/// Stage results the report is built from. Missing results yield empty sections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportInputs<'a> {
    pub symptom: Option<&'a SymptomData>,
    pub vision: Option<&'a VisionData>,
    pub medical: Option<&'a MedicalData>,
    pub triage: Option<&'a TriageData>,
    pub careplan: Option<&'a CareplanData>,
    pub consensus: Option<&'a CollaborativeResult>,
}

impl<'a> From<&'a PipelineState> for ReportInputs<'a> {
    fn from(state: &'a PipelineState) -> Self {
        Self {
            symptom: state.symptom(),
            vision: state.vision(),
            medical: state.medical(),
            triage: state.triage(),
            careplan: state.careplan(),
            consensus: state.consensus(),
        }
    }
}

/// Pure merge of the stage results; `generated_at` is the only input not taken from them.
pub fn assemble_report(inputs: ReportInputs<'_>, generated_at: DateTime<Utc>) -> FinalReport {
    let symptom = inputs.symptom.cloned().unwrap_or_default();

    let patient = PatientInfo {
        species: symptom.species,
        breed: symptom.breed,
        age: symptom.age,
        sex: symptom.sex,
        weight: symptom.weight,
    };

    let summary = SymptomSummary {
        main_symptoms: symptom.main_symptoms,
        onset_time: symptom.onset_time,
        duration: symptom.duration,
        severity_perception: symptom.severity_perception,
    };

    let triage = inputs
        .triage
        .map(|t| TriageSection {
            urgency_score: t.urgency_score,
            triage_level: t.triage_level,
            act_color: t.act_color,
            justification: t.justification.clone(),
            risk_assessment: t.risk_assessment.clone(),
            time_sensitivity: t.time_sensitivity,
            pshvm_factors: t.pshvm_factors.clone(),
        })
        .unwrap_or_default();

    let care_plan = inputs
        .careplan
        .map(|c| CarePlanSection {
            home_care_instructions: c.home_care_instructions.clone(),
            things_to_avoid: c.things_to_avoid.clone(),
            when_to_see_vet: c.when_to_see_vet.clone(),
            emergency_indicators: c.emergency_indicators.clone(),
            monitoring_guidance: c.monitoring_guidance.clone(),
            supportive_message: c.supportive_message.clone(),
        })
        .unwrap_or_default();

    let vision_analysis = inputs
        .vision
        .filter(|v| v.has_images)
        .map(|v| VisionSection {
            visual_findings: v.visual_findings.clone(),
            wound_detected: v.wound_detected,
            swelling_detected: v.swelling_detected,
            skin_issues_detected: v.skin_issues_detected,
            eye_issues_detected: v.eye_issues_detected,
        });

    let consensus = inputs.consensus.map(|result| {
        let review = result.review.as_ref();
        ConsensusSection {
            reached_agreement: result.consensus.reached_agreement,
            discrepancy: result.discrepancy.kind,
            final_risk_level: result.consensus.final_risk_level,
            final_urgency_score: result.consensus.final_urgency_score,
            final_triage_level: result.consensus.final_triage_level,
            confidence: result.consensus.confidence,
            reviewer_model: result.consensus.reviewer_model.clone(),
            final_recommendation: review
                .map(|r| r.final_recommendation.clone())
                .filter(|r| !r.is_empty()),
            additional_concerns: review
                .map(|r| r.additional_concerns.clone())
                .unwrap_or_default(),
        }
    });

    FinalReport {
        meta: ReportMeta {
            version: REPORT_VERSION.to_string(),
            generated_at,
        },
        patient,
        summary,
        triage,
        differential_diagnosis: inputs
            .medical
            .map(|m| m.differential_diagnosis.clone())
            .unwrap_or_default(),
        care_plan,
        red_flags: symptom.red_flags,
        vision_analysis,
        consensus,
    }
}
