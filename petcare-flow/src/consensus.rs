//! Reconciles the medical and triage assessments into one decision.
//!
//! When the two stages agree and the urgency score is low, the triage result is
//! taken as is and no reviewer is consulted. Otherwise an independent reviewer model
//! is asked for its own judgment; under a disagreement the higher of the competing
//! risk levels always wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    discrepancy::{DiscrepancyAnalysis, detect_from},
    error::Result,
    models::{MedicalData, RiskLevel, SymptomData, TriageData, TriageLevel},
    scoring::clamp_urgency,
};

pub const FAST_PATH_CONFIDENCE: f64 = 0.8;
pub const FALLBACK_CONFIDENCE: f64 = 0.7;

/// Independent judgment returned by the reviewer model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewJudgment {
    #[serde(default, deserialize_with = "crate::models::lenient::flag")]
    pub agreement_with_medical: bool,
    #[serde(default, deserialize_with = "crate::models::lenient::flag")]
    pub agreement_with_triage: bool,
    #[serde(default, deserialize_with = "crate::models::lenient::optional")]
    pub recommended_risk_level: Option<RiskLevel>,
    #[serde(default, deserialize_with = "crate::models::lenient::score")]
    pub recommended_triage_score: Option<i64>,
    #[serde(default, deserialize_with = "crate::models::lenient::optional")]
    pub recommended_triage_level: Option<TriageLevel>,
    #[serde(default, deserialize_with = "crate::models::lenient::text")]
    pub confidence_level: Option<String>,
    #[serde(default, deserialize_with = "crate::models::lenient::string_list")]
    pub additional_concerns: Vec<String>,
    #[serde(default, deserialize_with = "crate::models::lenient::text_or_empty")]
    pub final_recommendation: String,
    #[serde(default, deserialize_with = "crate::models::lenient::text_or_empty")]
    pub discrepancy_resolution: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReviewJudgment {
    /// high/높음 → 0.9, medium/중간/보통 → 0.75, anything else → 0.6
    pub fn confidence(&self) -> f64 {
        let tier = self
            .confidence_level
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_default();
        match tier.as_str() {
            "높음" | "high" => 0.9,
            "중간" | "보통" | "medium" | "moderate" => 0.75,
            _ => 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusDecision {
    pub reached_agreement: bool,
    pub final_risk_level: RiskLevel,
    /// Always within 0..=5
    pub final_urgency_score: u8,
    pub final_triage_level: TriageLevel,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_model: Option<String>,
}

/// Everything the consensus step produced, stored in the consensus slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborativeResult {
    pub discrepancy: DiscrepancyAnalysis,
    pub review: Option<ReviewJudgment>,
    pub consensus: ConsensusDecision,
}

/// Case material handed to the reviewer.
#[derive(Debug, Clone, Copy)]
pub struct ReviewCase<'a> {
    pub symptom: Option<&'a SymptomData>,
    pub medical: &'a MedicalData,
    pub triage: &'a TriageData,
    pub discrepancy: &'a DiscrepancyAnalysis,
}

/// Second-opinion model consulted when the assessments need review.
#[async_trait]
pub trait Reviewer: Send + Sync {
    fn model_name(&self) -> &str;

    /// `Ok(None)` means the reviewer answered but the answer could not be parsed.
    async fn review(&self, case: &ReviewCase<'_>) -> Result<Option<ReviewJudgment>>;
}

/// Decision taken without a reviewer: the triage result stands.
pub fn fast_path(analysis: &DiscrepancyAnalysis, triage: &TriageData) -> ConsensusDecision {
    ConsensusDecision {
        reached_agreement: true,
        final_risk_level: analysis.medical_risk,
        final_urgency_score: clamp_urgency(i64::from(triage.urgency_score)),
        final_triage_level: triage.triage_level,
        confidence: FAST_PATH_CONFIDENCE,
        reviewer_model: None,
    }
}

/// Decision when the reviewer's answer was malformed.
pub fn unreviewed_fallback(
    analysis: &DiscrepancyAnalysis,
    triage: &TriageData,
    reviewer_model: &str,
) -> ConsensusDecision {
    ConsensusDecision {
        reached_agreement: !analysis.has_discrepancy,
        final_risk_level: analysis.medical_risk,
        final_urgency_score: clamp_urgency(i64::from(triage.urgency_score)),
        final_triage_level: triage.triage_level,
        confidence: FALLBACK_CONFIDENCE,
        reviewer_model: Some(reviewer_model.to_string()),
    }
}

/// Merges the reviewer's judgment with the stage results.
///
/// With a discrepancy the final risk, score and level never drop below either
/// stage's own assessment.
pub fn reconcile(
    analysis: &DiscrepancyAnalysis,
    triage: &TriageData,
    judgment: &ReviewJudgment,
    reviewer_model: &str,
) -> ConsensusDecision {
    let triage_score = i64::from(triage.urgency_score);

    let mut risk = judgment
        .recommended_risk_level
        .unwrap_or(analysis.medical_risk);
    let mut score = judgment.recommended_triage_score.unwrap_or(triage_score);
    let mut level = judgment
        .recommended_triage_level
        .unwrap_or(triage.triage_level);

    if analysis.has_discrepancy {
        risk = risk
            .max(analysis.medical_risk)
            .max(RiskLevel::from_triage_level(triage.triage_level));
        score = score.max(triage_score);
        level = level.max(triage.triage_level);
    }

    ConsensusDecision {
        reached_agreement: !analysis.has_discrepancy || judgment.agreement_with_medical,
        final_risk_level: risk,
        final_urgency_score: clamp_urgency(score),
        final_triage_level: level,
        confidence: judgment.confidence(),
        reviewer_model: Some(reviewer_model.to_string()),
    }
}

/// Runs discrepancy detection and, when needed, the reviewer.
///
/// Reviewer transport failures propagate; the fast path makes no external call.
pub async fn resolve(
    symptom: Option<&SymptomData>,
    medical: &MedicalData,
    triage: &TriageData,
    reviewer: &dyn Reviewer,
) -> Result<CollaborativeResult> {
    let discrepancy = detect_from(medical, triage);

    if !discrepancy.needs_review {
        info!(
            urgency_score = triage.urgency_score,
            "No discrepancy and low urgency, skipping review"
        );
        let consensus = fast_path(&discrepancy, triage);
        return Ok(CollaborativeResult {
            discrepancy,
            review: None,
            consensus,
        });
    }

    let case = ReviewCase {
        symptom,
        medical,
        triage,
        discrepancy: &discrepancy,
    };
    let judgment = reviewer.review(&case).await?;

    let consensus = match &judgment {
        Some(judgment) => reconcile(&discrepancy, triage, judgment, reviewer.model_name()),
        None => {
            warn!(
                reviewer = reviewer.model_name(),
                "Reviewer output could not be parsed, keeping stage assessments"
            );
            unreviewed_fallback(&discrepancy, triage, reviewer.model_name())
        }
    };

    info!(
        discrepancy = ?discrepancy.kind,
        final_risk = %consensus.final_risk_level,
        urgency_score = consensus.final_urgency_score,
        "Consensus reached"
    );

    Ok(CollaborativeResult {
        discrepancy,
        review: judgment,
        consensus,
    })
}
