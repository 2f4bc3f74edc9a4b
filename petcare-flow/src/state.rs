use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    consensus::CollaborativeResult,
    error::{PipelineError, Result},
    models::{CareplanData, MedicalData, SymptomData, TriageData, VisionData},
    report::FinalReport,
    stage::StageOutput,
};

/// Pipeline steps in execution order. Each step means "this slot is still empty".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    SymptomIntake,
    Vision,
    MedicalAnalysis,
    Triage,
    Consensus,
    Careplan,
    FinalReport,
    Complete,
}

impl PipelineStep {
    pub const ORDER: [PipelineStep; 8] = [
        Self::SymptomIntake,
        Self::Vision,
        Self::MedicalAnalysis,
        Self::Triage,
        Self::Consensus,
        Self::Careplan,
        Self::FinalReport,
        Self::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SymptomIntake => "symptom_intake",
            Self::Vision => "vision",
            Self::MedicalAnalysis => "medical_analysis",
            Self::Triage => "triage",
            Self::Consensus => "consensus",
            Self::Careplan => "careplan",
            Self::FinalReport => "final_report",
            Self::Complete => "complete",
        }
    }

    /// Steps executed by an external stage collaborator.
    pub fn is_external(self) -> bool {
        matches!(
            self,
            Self::SymptomIntake
                | Self::Vision
                | Self::MedicalAnalysis
                | Self::Triage
                | Self::Careplan
        )
    }

    /// Whether the slot behind this step is already filled (or not needed).
    pub fn is_satisfied(self, state: &PipelineState) -> bool {
        match self {
            Self::SymptomIntake => state.symptom.is_some(),
            Self::Vision => !state.has_images() || state.vision.is_some(),
            Self::MedicalAnalysis => state.medical.is_some(),
            Self::Triage => state.triage.is_some(),
            Self::Consensus => state.consensus.is_some(),
            Self::Careplan => state.careplan.is_some(),
            Self::FinalReport => state.final_report.is_some(),
            Self::Complete => true,
        }
    }

    /// Earliest unsatisfied step, or `Complete`.
    pub fn next(state: &PipelineState) -> PipelineStep {
        Self::ORDER
            .into_iter()
            .find(|step| !step.is_satisfied(state))
            .unwrap_or(Self::Complete)
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one triage run, threaded through every step.
///
/// Slots are filled one at a time and never overwritten. The state is plain JSON
/// so callers can persist it between calls to [`crate::Pipeline::advance`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    user_input: String,
    #[serde(default)]
    image_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    symptom: Option<SymptomData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vision: Option<VisionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    medical: Option<MedicalData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    triage: Option<TriageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    consensus: Option<CollaborativeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    careplan: Option<CareplanData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    final_report: Option<FinalReport>,
}

impl PipelineState {
    pub fn new(user_input: impl Into<String>, image_refs: Vec<String>) -> Self {
        Self {
            user_input: user_input.into(),
            image_refs: image_refs
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            ..Self::default()
        }
    }

    pub fn user_input(&self) -> &str {
        &self.user_input
    }

    pub fn image_refs(&self) -> &[String] {
        &self.image_refs
    }

    pub fn has_images(&self) -> bool {
        !self.image_refs.is_empty()
    }

    pub fn symptom(&self) -> Option<&SymptomData> {
        self.symptom.as_ref()
    }

    pub fn vision(&self) -> Option<&VisionData> {
        self.vision.as_ref()
    }

    pub fn medical(&self) -> Option<&MedicalData> {
        self.medical.as_ref()
    }

    pub fn triage(&self) -> Option<&TriageData> {
        self.triage.as_ref()
    }

    pub fn consensus(&self) -> Option<&CollaborativeResult> {
        self.consensus.as_ref()
    }

    pub fn careplan(&self) -> Option<&CareplanData> {
        self.careplan.as_ref()
    }

    pub fn final_report(&self) -> Option<&FinalReport> {
        self.final_report.as_ref()
    }

    pub fn next_step(&self) -> PipelineStep {
        PipelineStep::next(self)
    }

    pub fn is_complete(&self) -> bool {
        self.final_report.is_some()
    }

    /// Stores a stage result in its slot.
    pub fn apply(&mut self, output: StageOutput) -> Result<()> {
        let step = output.step();
        match output {
            StageOutput::SymptomIntake(data) => fill(&mut self.symptom, data, step),
            StageOutput::Vision(data) => fill(&mut self.vision, data, step),
            StageOutput::MedicalAnalysis(data) => fill(&mut self.medical, data, step),
            StageOutput::Triage(data) => fill(&mut self.triage, data, step),
            StageOutput::Consensus(data) => fill(&mut self.consensus, data, step),
            StageOutput::Careplan(data) => fill(&mut self.careplan, data, step),
        }
    }

    pub(crate) fn set_final_report(&mut self, report: FinalReport) -> Result<()> {
        fill(&mut self.final_report, report, PipelineStep::FinalReport)
    }
}

fn fill<T>(slot: &mut Option<T>, value: T, step: PipelineStep) -> Result<()> {
    if slot.is_some() {
        return Err(PipelineError::SlotAlreadyFilled(step));
    }
    *slot = Some(value);
    Ok(())
}
