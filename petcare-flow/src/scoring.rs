//! PSHVM (Pet Safety and Health Vulnerability Matrix) weighting and ACT colour banding.
//!
//! The weighting is a fixed, additive rule table evaluated without any model call:
//!
//! | condition                               | delta |
//! |-----------------------------------------|-------|
//! | symptoms lasting 7 days or longer       | +2    |
//! | otherwise lasting 48 hours or longer    | +1    |
//! | patient aged 7 years or older           | +1    |
//! | breed in the vulnerability table        | +1    |
//!
//! The adjusted score is `clamp(base + total, 0, 5)`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::models::{ActColor, SymptomData, TriageData};

pub const MIN_URGENCY: i64 = 0;
pub const MAX_URGENCY: i64 = 5;

const HOURS_PER_DAY: u32 = 24;
const LONG_DURATION_HOURS: u32 = 7 * HOURS_PER_DAY;
const EXTENDED_DURATION_HOURS: u32 = 48;
const SENIOR_AGE_YEARS: f64 = 7.0;

/// Breed name fragments (Korean and English) and the vulnerability they carry.
const BREED_VULNERABILITIES: &[(&[&str], &str)] = &[
    (&["불독", "bulldog"], "respiratory"),
    (&["퍼그", "pug"], "respiratory"),
    (&["시추", "시츄", "shih tzu"], "respiratory"),
    (&["페키니즈", "pekingese"], "respiratory"),
    (&["골든 리트리버", "골든리트리버", "golden retriever"], "hip joint"),
    (&["래브라도", "labrador"], "hip joint"),
    (&["저먼 셰퍼드", "german shepherd"], "hip joint"),
];

/// Red-flag tags that force the most severe ACT colour.
const RED_FLAG_TAGS: &[&str] = &[
    "bleeding",
    "seizure",
    "collapse",
    "difficulty_breathing",
    "unconscious",
    "출혈",
    "경련",
    "발작",
    "실신",
    "호흡곤란",
    "의식불명",
];

static DURATION_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+(?:\.\d+)?)\s*(개월|달|months?|주일|주|weeks?|wks?|일|days?|d\b|시간|hours?|hrs?|h\b)",
    )
    .expect("duration pattern is valid")
});

/// Patient attributes the weighting reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientFacts {
    pub age: Option<f64>,
    pub breed: Option<String>,
    pub duration: Option<String>,
}

impl From<&SymptomData> for PatientFacts {
    fn from(symptom: &SymptomData) -> Self {
        Self {
            age: symptom.age,
            breed: symptom.breed.clone(),
            duration: symptom.duration.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub reason: String,
    pub delta: i64,
}

/// Rule hits for one patient; independent of any base score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PshvmWeighting {
    pub adjustments: Vec<Adjustment>,
}

impl PshvmWeighting {
    pub fn evaluate(facts: &PatientFacts) -> Self {
        let mut adjustments = Vec::new();

        if let Some(duration) = facts.duration.as_deref() {
            match duration_hours(duration) {
                Some(hours) if hours >= LONG_DURATION_HOURS => adjustments.push(Adjustment {
                    reason: format!("symptoms lasting 7+ days ({duration})"),
                    delta: 2,
                }),
                Some(hours) if hours >= EXTENDED_DURATION_HOURS => adjustments.push(Adjustment {
                    reason: format!("symptoms lasting 48+ hours ({duration})"),
                    delta: 1,
                }),
                _ => {}
            }
        }

        if let Some(age) = facts.age.filter(|age| *age >= SENIOR_AGE_YEARS) {
            adjustments.push(Adjustment {
                reason: format!("senior patient ({age} years)"),
                delta: 1,
            });
        }

        if let Some((breed, vulnerability)) = facts
            .breed
            .as_deref()
            .and_then(|breed| breed_vulnerability(breed).map(|v| (breed, v)))
        {
            adjustments.push(Adjustment {
                reason: format!("breed vulnerability ({breed}: {vulnerability})"),
                delta: 1,
            });
        }

        Self { adjustments }
    }

    pub fn total(&self) -> i64 {
        self.adjustments.iter().map(|a| a.delta).sum()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.adjustments
            .iter()
            .map(|a| format!("{} (+{})", a.reason, a.delta))
            .collect()
    }

    /// `clamp(base + total, 0, 5)`
    pub fn apply(&self, base_score: i64) -> u8 {
        clamp_urgency(base_score.saturating_add(self.total()))
    }

    pub fn score(&self, base_score: i64) -> WeightedScore {
        WeightedScore {
            base_score,
            adjustments: self.adjustments.clone(),
            adjusted_score: self.apply(base_score),
        }
    }
}

/// Base score, the deltas applied to it and the clamped result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedScore {
    pub base_score: i64,
    pub adjustments: Vec<Adjustment>,
    pub adjusted_score: u8,
}

pub fn clamp_urgency(score: i64) -> u8 {
    score.clamp(MIN_URGENCY, MAX_URGENCY) as u8
}

/// Longest span mentioned in a free-text duration, in hours.
pub fn duration_hours(text: &str) -> Option<u32> {
    let lowered = text.to_lowercase();
    let mut longest: Option<u32> = None;
    let mut consider = |hours: u32| longest = Some(longest.map_or(hours, |h| h.max(hours)));

    for caps in DURATION_QUANTITY.captures_iter(&lowered) {
        let Ok(quantity) = caps[1].parse::<f64>() else {
            continue;
        };
        let unit_hours = match &caps[2] {
            "개월" | "달" | "month" | "months" => 30 * HOURS_PER_DAY,
            "주일" | "주" | "week" | "weeks" | "wk" | "wks" => 7 * HOURS_PER_DAY,
            "일" | "day" | "days" | "d" => HOURS_PER_DAY,
            _ => 1,
        };
        consider((quantity * f64::from(unit_hours)).round() as u32);
    }

    for (phrase, hours) in [
        ("한 달", 30 * HOURS_PER_DAY),
        ("한달", 30 * HOURS_PER_DAY),
        ("보름", 15 * HOURS_PER_DAY),
        ("일주일", 7 * HOURS_PER_DAY),
        ("a week", 7 * HOURS_PER_DAY),
        ("one week", 7 * HOURS_PER_DAY),
        ("사흘", 3 * HOURS_PER_DAY),
        ("이틀", 2 * HOURS_PER_DAY),
        ("two days", 2 * HOURS_PER_DAY),
        ("하루", HOURS_PER_DAY),
    ] {
        if lowered.contains(phrase) {
            consider(hours);
        }
    }

    longest
}

pub fn breed_vulnerability(breed: &str) -> Option<&'static str> {
    let lowered = breed.to_lowercase();
    BREED_VULNERABILITIES
        .iter()
        .find(|(names, _)| names.iter().any(|name| lowered.contains(name)))
        .map(|(_, vulnerability)| *vulnerability)
}

pub fn is_red_flag(tag: &str) -> bool {
    let normalized = tag.trim().to_lowercase().replace([' ', '-'], "_");
    RED_FLAG_TAGS.iter().any(|flag| normalized.contains(flag))
}

pub fn has_red_flag(tags: &[String]) -> bool {
    tags.iter().any(|tag| is_red_flag(tag))
}

/// `>=4` or any red flag → Red, `>=3` → Orange, `>=1` → Yellow, else Green.
pub fn act_color(score: u8, red_flag_present: bool) -> ActColor {
    if score >= 4 || red_flag_present {
        ActColor::Red
    } else if score >= 3 {
        ActColor::Orange
    } else if score >= 1 {
        ActColor::Yellow
    } else {
        ActColor::Green
    }
}

impl TriageData {
    /// Re-derives the final score and ACT colour from the model's base score.
    ///
    /// The model is told about the weighting in its prompt, but the arithmetic is
    /// always redone here so the stored score never depends on the model doing it.
    pub fn apply_weighting(mut self, weighting: &PshvmWeighting, red_flags: &[String]) -> Self {
        let base = self.base_score.unwrap_or(i64::from(self.urgency_score));
        let final_score = weighting.apply(base);

        self.base_score = Some(base);
        self.urgency_score = final_score;
        self.weight_adjustment = weighting.total();
        self.pshvm_factors = weighting.reasons();
        self.act_color = act_color(final_score, has_red_flag(red_flags));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(duration: &str, age: Option<f64>, breed: &str) -> PatientFacts {
        PatientFacts {
            age,
            breed: (!breed.is_empty()).then(|| breed.to_string()),
            duration: (!duration.is_empty()).then(|| duration.to_string()),
        }
    }

    #[test]
    fn senior_bulldog_with_week_long_symptoms_maxes_out() {
        let weighting = PshvmWeighting::evaluate(&facts("8일째 지속", Some(9.0), "불독"));

        assert_eq!(weighting.total(), 4);
        assert_eq!(weighting.apply(1), 5);
        assert_eq!(act_color(weighting.apply(1), false), ActColor::Red);
    }

    #[test]
    fn duration_tiers() {
        let delta = |d: &str| PshvmWeighting::evaluate(&facts(d, None, "")).total();

        assert_eq!(delta("7일"), 2);
        assert_eq!(delta("일주일 넘게"), 2);
        assert_eq!(delta("3 weeks"), 2);
        assert_eq!(delta("2 months"), 2);
        assert_eq!(delta("2달째 기침"), 2);
        assert_eq!(delta("한 달 넘게"), 2);
        assert_eq!(delta("한달째"), 2);
        assert_eq!(delta("보름째"), 2);
        assert_eq!(delta("48시간"), 1);
        assert_eq!(delta("2일 전부터"), 1);
        assert_eq!(delta("이틀째"), 1);
        assert_eq!(delta("5 days"), 1);
        assert_eq!(delta("12시간"), 0);
        assert_eq!(delta("오늘 아침부터"), 0);
    }

    #[test]
    fn duration_takes_the_longest_span_mentioned() {
        assert_eq!(duration_hours("3시간 전 구토, 설사는 10일"), Some(240));
        assert_eq!(duration_hours("since yesterday"), None);
        assert_eq!(duration_hours("1.5 days"), Some(36));
        assert_eq!(duration_hours("보름째"), Some(360));
        assert_eq!(duration_hours("2달째"), Some(1440));
    }

    #[test]
    fn age_threshold_is_inclusive() {
        assert_eq!(PshvmWeighting::evaluate(&facts("", Some(7.0), "")).total(), 1);
        assert_eq!(PshvmWeighting::evaluate(&facts("", Some(6.9), "")).total(), 0);
        assert_eq!(PshvmWeighting::evaluate(&facts("", None, "")).total(), 0);
    }

    #[test]
    fn breed_table_matches_korean_and_english_names() {
        assert_eq!(breed_vulnerability("프렌치 불독"), Some("respiratory"));
        assert_eq!(breed_vulnerability("French Bulldog"), Some("respiratory"));
        assert_eq!(breed_vulnerability("Golden Retriever"), Some("hip joint"));
        assert_eq!(breed_vulnerability("말티즈"), None);
    }

    #[test]
    fn adjusted_score_is_clamped() {
        let weighting = PshvmWeighting::evaluate(&facts("10일", Some(12.0), "pug"));
        assert_eq!(weighting.apply(5), 5);
        assert_eq!(PshvmWeighting::default().apply(-3), 0);

        let scored = weighting.score(2);
        assert_eq!(scored.base_score, 2);
        assert_eq!(scored.adjustments.len(), 3);
        assert_eq!(scored.adjusted_score, 5);
    }

    #[test]
    fn rule_order_does_not_change_the_total() {
        let weighting = PshvmWeighting::evaluate(&facts("2일", Some(8.0), "래브라도"));
        let mut reversed = weighting.adjustments.clone();
        reversed.reverse();
        let reversed = PshvmWeighting { adjustments: reversed };

        assert_eq!(weighting.total(), 3);
        for base in -2..=6 {
            assert_eq!(weighting.apply(base), reversed.apply(base));
        }
    }

    #[test]
    fn act_color_is_monotonic_in_score() {
        for red_flag in [false, true] {
            let severities: Vec<u8> = (0..=5).map(|s| act_color(s, red_flag).severity()).collect();
            assert!(severities.windows(2).all(|w| w[0] <= w[1]), "{severities:?}");
        }
        assert_eq!(act_color(0, false), ActColor::Green);
        assert_eq!(act_color(1, false), ActColor::Yellow);
        assert_eq!(act_color(3, false), ActColor::Orange);
        assert_eq!(act_color(4, false), ActColor::Red);
        assert_eq!(act_color(0, true), ActColor::Red);
    }

    #[test]
    fn red_flags_match_english_and_korean_tags() {
        assert!(is_red_flag("Difficulty Breathing"));
        assert!(is_red_flag("경련"));
        assert!(is_red_flag("심한 출혈"));
        assert!(!is_red_flag("기침"));
    }

    #[test]
    fn triage_weighting_overrides_model_arithmetic() {
        let triage = TriageData {
            urgency_score: 4,
            base_score: Some(1),
            ..TriageData::default()
        };
        let weighting = PshvmWeighting::evaluate(&facts("2일", None, ""));
        let weighted = triage.apply_weighting(&weighting, &[]);

        assert_eq!(weighted.base_score, Some(1));
        assert_eq!(weighted.urgency_score, 2);
        assert_eq!(weighted.weight_adjustment, 1);
        assert_eq!(weighted.pshvm_factors.len(), 1);
        assert_eq!(weighted.act_color, ActColor::Yellow);
    }

    #[test]
    fn missing_base_score_falls_back_to_urgency_score() {
        let triage = TriageData {
            urgency_score: 2,
            ..TriageData::default()
        };
        let weighted = triage.apply_weighting(&PshvmWeighting::default(), &["seizure".to_string()]);

        assert_eq!(weighted.base_score, Some(2));
        assert_eq!(weighted.urgency_score, 2);
        assert_eq!(weighted.act_color, ActColor::Red);
    }
}
