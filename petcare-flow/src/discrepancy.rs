//! Disagreement between the medical risk label and the triage level.

use serde::{Deserialize, Serialize};

use crate::models::{MedicalData, RiskLevel, TriageData, TriageLevel};

/// Triage score at or above which a review is requested even when both stages agree.
pub const REVIEW_SCORE_THRESHOLD: u8 = 3;

const DEFAULT_TRIAGE_SCORE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    MedicalHigher,
    TriageHigher,
    ModerateMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyAnalysis {
    pub has_discrepancy: bool,
    pub kind: Option<DiscrepancyKind>,
    pub medical_risk: RiskLevel,
    pub medical_triage_equivalent: TriageLevel,
    pub triage_level: TriageLevel,
    pub triage_score: u8,
    pub needs_review: bool,
}

/// Compares the two assessments. Missing values default to medium, MODERATE and 2.
pub fn detect(
    medical_risk: Option<RiskLevel>,
    triage_level: Option<TriageLevel>,
    triage_score: Option<u8>,
) -> DiscrepancyAnalysis {
    let medical_risk = medical_risk.unwrap_or(RiskLevel::Medium);
    let triage_level = triage_level.unwrap_or(TriageLevel::Moderate);
    let triage_score = triage_score.unwrap_or(DEFAULT_TRIAGE_SCORE);
    let equivalent = medical_risk.to_triage_level();

    let kind = (equivalent != triage_level).then(|| direction(equivalent, triage_level));
    let has_discrepancy = kind.is_some();

    DiscrepancyAnalysis {
        has_discrepancy,
        kind,
        medical_risk,
        medical_triage_equivalent: equivalent,
        triage_level,
        triage_score,
        needs_review: has_discrepancy || triage_score >= REVIEW_SCORE_THRESHOLD,
    }
}

pub fn detect_from(medical: &MedicalData, triage: &TriageData) -> DiscrepancyAnalysis {
    detect(
        medical.risk_level,
        Some(triage.triage_level),
        Some(triage.urgency_score),
    )
}

fn direction(medical: TriageLevel, triage: TriageLevel) -> DiscrepancyKind {
    use TriageLevel::{Emergency, High, Low, Moderate};

    let outranks = |a: TriageLevel, b: TriageLevel| {
        (a == Emergency && b != Emergency) || (a == High && matches!(b, Low | Moderate))
    };

    if outranks(medical, triage) {
        DiscrepancyKind::MedicalHigher
    } else if outranks(triage, medical) {
        DiscrepancyKind::TriageHigher
    } else {
        DiscrepancyKind::ModerateMismatch
    }
}
