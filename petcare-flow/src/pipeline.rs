use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    consensus::{self, Reviewer},
    error::{PipelineError, Result},
    report::{FinalReport, ReportInputs, assemble_report},
    stage::{Stage, StageOutput},
    state::{PipelineState, PipelineStep},
};

/// Outcome of one call to [`Pipeline::advance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Advance {
    InProgress {
        stage: PipelineStep,
        result: StageOutput,
    },
    Complete {
        report: Box<FinalReport>,
    },
}

impl Advance {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// The fixed triage sequence with its registered stages and reviewer.
pub struct Pipeline {
    pub id: String,
    stages: HashMap<PipelineStep, Arc<dyn Stage>>,
    reviewer: Arc<dyn Reviewer>,
}

impl Pipeline {
    pub fn builder(id: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(id)
    }

    pub fn stage(&self, step: PipelineStep) -> Option<Arc<dyn Stage>> {
        self.stages.get(&step).cloned()
    }

    /// Executes exactly one step: the earliest whose slot is still empty.
    ///
    /// At most one external call is made. `state` is only changed when the step
    /// succeeds, so a failed call can be retried with the same state. Once the
    /// report exists every further call returns it unchanged.
    pub async fn advance(&self, state: &mut PipelineState, user_input: &str) -> Result<Advance> {
        if let Some(report) = state.final_report() {
            return Ok(Advance::Complete {
                report: Box::new(report.clone()),
            });
        }

        let step = state.next_step();
        info!(pipeline = %self.id, stage = %step, "Executing pipeline step");

        let output = match step {
            PipelineStep::FinalReport | PipelineStep::Complete => {
                let report = assemble_report(ReportInputs::from(&*state), Utc::now());
                state.set_final_report(report.clone())?;
                info!(pipeline = %self.id, "Final report assembled");
                return Ok(Advance::Complete {
                    report: Box::new(report),
                });
            }
            PipelineStep::Consensus => self.run_consensus(state).await?,
            external => self.run_stage(external, state, user_input).await?,
        };

        state.apply(output.clone())?;
        Ok(Advance::InProgress {
            stage: step,
            result: output,
        })
    }

    /// Drives [`Pipeline::advance`] until the report is produced.
    pub async fn run_to_completion(
        &self,
        state: &mut PipelineState,
        user_input: &str,
    ) -> Result<FinalReport> {
        for _ in 0..PipelineStep::ORDER.len() {
            if let Advance::Complete { report } = self.advance(state, user_input).await? {
                return Ok(*report);
            }
        }
        Err(PipelineError::stage_failed(
            state.next_step(),
            "pipeline did not complete within the step limit",
        ))
    }

    async fn run_stage(
        &self,
        step: PipelineStep,
        state: &PipelineState,
        user_input: &str,
    ) -> Result<StageOutput> {
        let stage = self
            .stages
            .get(&step)
            .ok_or(PipelineError::StageNotRegistered(step))?;

        let output = stage.run(state, user_input).await.inspect_err(|err| {
            error!(pipeline = %self.id, stage = %step, error = %err, "Stage failed");
        })?;

        if output.step() != step {
            return Err(PipelineError::UnexpectedOutput {
                expected: step,
                actual: output.step(),
            });
        }
        Ok(output)
    }

    async fn run_consensus(&self, state: &PipelineState) -> Result<StageOutput> {
        let medical = state
            .medical()
            .ok_or_else(|| PipelineError::MissingInput("medical analysis result".to_string()))?;
        let triage = state
            .triage()
            .ok_or_else(|| PipelineError::MissingInput("triage result".to_string()))?;

        let result = consensus::resolve(state.symptom(), medical, triage, self.reviewer.as_ref())
            .await
            .inspect_err(|err| {
                error!(pipeline = %self.id, stage = "consensus", error = %err, "Consensus review failed");
            })?;
        Ok(StageOutput::Consensus(result))
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    id: String,
    stages: HashMap<PipelineStep, Arc<dyn Stage>>,
    reviewer: Option<Arc<dyn Reviewer>>,
}

impl PipelineBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stages: HashMap::new(),
            reviewer: None,
        }
    }

    /// Registers a stage under the step it reports; a later stage for the same step replaces it.
    pub fn add_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(stage.step(), stage);
        self
    }

    pub fn reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Vision may be omitted; runs with images will then fail at that step.
    pub fn build(self) -> Result<Pipeline> {
        let required = PipelineStep::ORDER
            .into_iter()
            .filter(|step| step.is_external() && *step != PipelineStep::Vision);
        for step in required {
            if !self.stages.contains_key(&step) {
                return Err(PipelineError::StageNotRegistered(step));
            }
        }

        let reviewer = self
            .reviewer
            .ok_or_else(|| PipelineError::MissingInput("consensus reviewer".to_string()))?;

        Ok(Pipeline {
            id: self.id,
            stages: self.stages,
            reviewer,
        })
    }
}
