pub mod consensus;
pub mod discrepancy;
pub mod error;
pub mod json;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod scoring;
pub mod stage;
pub mod state;
pub mod storage;

// Re-export commonly used types
pub use consensus::{
    CollaborativeResult, ConsensusDecision, ReviewCase, ReviewJudgment, Reviewer,
};
pub use discrepancy::{DiscrepancyAnalysis, DiscrepancyKind};
pub use error::{PipelineError, Result};
pub use models::{
    ActColor, CareplanData, DifferentialDiagnosis, MedicalData, RiskLevel, SymptomData,
    TriageData, TriageLevel, VisionData,
};
pub use pipeline::{Advance, Pipeline, PipelineBuilder};
pub use report::{FinalReport, ReportInputs, assemble_report};
pub use runner::{FlowRunner, StepRun};
pub use scoring::{PatientFacts, PshvmWeighting};
pub use stage::{Stage, StageOutput};
pub use state::{PipelineState, PipelineStep};
#[cfg(feature = "postgres")]
pub use storage::PostgresSessionStorage;
pub use storage::{InMemorySessionStorage, Session, SessionStorage};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedStage {
        output: StageOutput,
        calls: AtomicUsize,
    }

    impl ScriptedStage {
        fn new(output: StageOutput) -> Arc<Self> {
            Arc::new(Self {
                output,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Stage for ScriptedStage {
        fn step(&self) -> PipelineStep {
            self.output.step()
        }

        async fn run(&self, _state: &PipelineState, _user_input: &str) -> Result<StageOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    /// Registered for one step but answers for another.
    struct MislabelledStage;

    #[async_trait]
    impl Stage for MislabelledStage {
        fn step(&self) -> PipelineStep {
            PipelineStep::SymptomIntake
        }

        async fn run(&self, _state: &PipelineState, _user_input: &str) -> Result<StageOutput> {
            Ok(StageOutput::Careplan(CareplanData::default()))
        }
    }

    struct FailingStage(PipelineStep);

    #[async_trait]
    impl Stage for FailingStage {
        fn step(&self) -> PipelineStep {
            self.0
        }

        async fn run(&self, _state: &PipelineState, _user_input: &str) -> Result<StageOutput> {
            Err(PipelineError::stage_failed(self.0, "upstream timed out"))
        }
    }

    #[derive(Default)]
    struct CountingReviewer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Reviewer for CountingReviewer {
        fn model_name(&self) -> &str {
            "counting-reviewer"
        }

        async fn review(&self, _case: &ReviewCase<'_>) -> Result<Option<ReviewJudgment>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(ReviewJudgment {
                agreement_with_medical: true,
                recommended_risk_level: Some(RiskLevel::High),
                recommended_triage_score: Some(4),
                recommended_triage_level: Some(TriageLevel::High),
                confidence_level: Some("high".to_string()),
                ..ReviewJudgment::default()
            }))
        }
    }

    struct Fixture {
        symptom: Arc<ScriptedStage>,
        vision: Arc<ScriptedStage>,
        medical: Arc<ScriptedStage>,
        triage: Arc<ScriptedStage>,
        careplan: Arc<ScriptedStage>,
        reviewer: Arc<CountingReviewer>,
    }

    impl Fixture {
        fn new(risk: RiskLevel, level: TriageLevel, score: u8) -> Self {
            Self {
                symptom: ScriptedStage::new(StageOutput::SymptomIntake(SymptomData {
                    species: Some("개".to_string()),
                    main_symptoms: vec!["구토".to_string()],
                    ..SymptomData::default()
                })),
                vision: ScriptedStage::new(StageOutput::Vision(VisionData {
                    has_images: true,
                    wound_detected: true,
                    ..VisionData::default()
                })),
                medical: ScriptedStage::new(StageOutput::MedicalAnalysis(MedicalData {
                    risk_level: Some(risk),
                    ..MedicalData::default()
                })),
                triage: ScriptedStage::new(StageOutput::Triage(TriageData {
                    triage_level: level,
                    urgency_score: score,
                    ..TriageData::default()
                })),
                careplan: ScriptedStage::new(StageOutput::Careplan(CareplanData {
                    when_to_see_vet: "24시간 이내".to_string(),
                    ..CareplanData::default()
                })),
                reviewer: Arc::new(CountingReviewer::default()),
            }
        }

        fn pipeline(&self) -> Pipeline {
            Pipeline::builder("test_pipeline")
                .add_stage(self.symptom.clone())
                .add_stage(self.vision.clone())
                .add_stage(self.medical.clone())
                .add_stage(self.triage.clone())
                .add_stage(self.careplan.clone())
                .reviewer(self.reviewer.clone())
                .build()
                .unwrap()
        }

        fn external_calls(&self) -> usize {
            self.symptom.calls()
                + self.vision.calls()
                + self.medical.calls()
                + self.triage.calls()
                + self.careplan.calls()
                + self.reviewer.calls.load(Ordering::SeqCst)
        }
    }

    fn stage_of(advance: &Advance) -> Option<PipelineStep> {
        match advance {
            Advance::InProgress { stage, .. } => Some(*stage),
            Advance::Complete { .. } => None,
        }
    }

    #[tokio::test]
    async fn advances_one_stage_per_call_in_order() {
        let fixture = Fixture::new(RiskLevel::Low, TriageLevel::Low, 1);
        let pipeline = fixture.pipeline();
        let mut state = PipelineState::new("강아지가 토해요", Vec::new());

        let mut visited = Vec::new();
        loop {
            let before = fixture.external_calls();
            let expected = state.next_step();
            let advance = pipeline.advance(&mut state, "강아지가 토해요").await.unwrap();
            assert!(fixture.external_calls() - before <= 1);

            match stage_of(&advance) {
                Some(stage) => {
                    assert_eq!(stage, expected);
                    visited.push(stage);
                }
                None => break,
            }
        }

        assert_eq!(
            visited,
            vec![
                PipelineStep::SymptomIntake,
                PipelineStep::MedicalAnalysis,
                PipelineStep::Triage,
                PipelineStep::Consensus,
                PipelineStep::Careplan,
            ]
        );
        assert_eq!(fixture.vision.calls(), 0);
        // Low risk in agreement takes the fast path
        assert_eq!(fixture.reviewer.calls.load(Ordering::SeqCst), 0);
        assert!(state.is_complete());
        assert_eq!(state.next_step(), PipelineStep::Complete);
    }

    #[tokio::test]
    async fn vision_runs_when_images_are_present() {
        let fixture = Fixture::new(RiskLevel::High, TriageLevel::Moderate, 3);
        let pipeline = fixture.pipeline();
        let mut state = PipelineState::new("다리에 상처", vec!["https://img/leg.jpg".to_string()]);

        let report = pipeline
            .run_to_completion(&mut state, "다리에 상처")
            .await
            .unwrap();

        assert_eq!(fixture.vision.calls(), 1);
        assert_eq!(fixture.reviewer.calls.load(Ordering::SeqCst), 1);
        assert!(report.vision_analysis.unwrap().wound_detected);

        let consensus = report.consensus.unwrap();
        assert_eq!(consensus.discrepancy, Some(DiscrepancyKind::MedicalHigher));
        assert_eq!(consensus.final_risk_level, RiskLevel::High);
        assert_eq!(consensus.final_urgency_score, 4);
        assert_eq!(report.care_plan.when_to_see_vet, "24시간 이내");
    }

    #[tokio::test]
    async fn completed_pipeline_returns_stored_report() {
        let fixture = Fixture::new(RiskLevel::Low, TriageLevel::Low, 0);
        let pipeline = fixture.pipeline();
        let mut state = PipelineState::new("기침", Vec::new());

        let report = pipeline.run_to_completion(&mut state, "기침").await.unwrap();
        let calls = fixture.external_calls();

        let again = pipeline.advance(&mut state, "기침").await.unwrap();
        assert_eq!(
            again,
            Advance::Complete {
                report: Box::new(report)
            }
        );
        assert_eq!(fixture.external_calls(), calls);
    }

    #[tokio::test]
    async fn failed_stage_leaves_state_untouched() {
        let fixture = Fixture::new(RiskLevel::Low, TriageLevel::Low, 1);
        let pipeline = Pipeline::builder("failing")
            .add_stage(fixture.symptom.clone())
            .add_stage(Arc::new(FailingStage(PipelineStep::MedicalAnalysis)))
            .add_stage(fixture.triage.clone())
            .add_stage(fixture.careplan.clone())
            .reviewer(fixture.reviewer.clone())
            .build()
            .unwrap();
        let mut state = PipelineState::new("설사", Vec::new());

        pipeline.advance(&mut state, "설사").await.unwrap();
        let snapshot = state.clone();

        let err = pipeline.advance(&mut state, "설사").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageExecutionFailed {
                stage: PipelineStep::MedicalAnalysis,
                ..
            }
        ));
        assert_eq!(state, snapshot);
        assert_eq!(state.next_step(), PipelineStep::MedicalAnalysis);
    }

    #[tokio::test]
    async fn mislabelled_output_is_rejected() {
        let fixture = Fixture::new(RiskLevel::Low, TriageLevel::Low, 1);
        let pipeline = Pipeline::builder("mislabelled")
            .add_stage(Arc::new(MislabelledStage))
            .add_stage(fixture.medical.clone())
            .add_stage(fixture.triage.clone())
            .add_stage(fixture.careplan.clone())
            .reviewer(fixture.reviewer.clone())
            .build()
            .unwrap();
        let mut state = PipelineState::new("기침", Vec::new());

        let err = pipeline.advance(&mut state, "기침").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnexpectedOutput {
                expected: PipelineStep::SymptomIntake,
                actual: PipelineStep::Careplan,
            }
        ));
        assert!(state.careplan().is_none());
    }

    #[tokio::test]
    async fn images_without_vision_stage_fail_at_vision() {
        let fixture = Fixture::new(RiskLevel::Low, TriageLevel::Low, 1);
        let pipeline = Pipeline::builder("no_vision")
            .add_stage(fixture.symptom.clone())
            .add_stage(fixture.medical.clone())
            .add_stage(fixture.triage.clone())
            .add_stage(fixture.careplan.clone())
            .reviewer(fixture.reviewer.clone())
            .build()
            .unwrap();
        let mut state = PipelineState::new("눈곱", vec!["eye.jpg".to_string()]);

        pipeline.advance(&mut state, "눈곱").await.unwrap();
        let err = pipeline.advance(&mut state, "눈곱").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageNotRegistered(PipelineStep::Vision)
        ));
    }

    #[test]
    fn builder_requires_core_stages_and_reviewer() {
        let fixture = Fixture::new(RiskLevel::Low, TriageLevel::Low, 1);

        let missing_triage = Pipeline::builder("incomplete")
            .add_stage(fixture.symptom.clone())
            .add_stage(fixture.medical.clone())
            .add_stage(fixture.careplan.clone())
            .reviewer(fixture.reviewer.clone())
            .build();
        assert!(matches!(
            missing_triage,
            Err(PipelineError::StageNotRegistered(PipelineStep::Triage))
        ));

        let missing_reviewer = Pipeline::builder("incomplete")
            .add_stage(fixture.symptom.clone())
            .add_stage(fixture.medical.clone())
            .add_stage(fixture.triage.clone())
            .add_stage(fixture.careplan.clone())
            .build();
        assert!(matches!(
            missing_reviewer,
            Err(PipelineError::MissingInput(_))
        ));
    }

    #[tokio::test]
    async fn runner_persists_one_step_per_run() {
        let fixture = Fixture::new(RiskLevel::Low, TriageLevel::Low, 1);
        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(Arc::new(fixture.pipeline()), storage.clone());

        let session = runner.create_session("밥을 안 먹어요", Vec::new()).await.unwrap();
        let first = runner.run(&session.id).await.unwrap();
        assert_eq!(stage_of(&first), Some(PipelineStep::SymptomIntake));

        let stored = storage.get(&session.id).await.unwrap().unwrap();
        assert!(stored.state.symptom().is_some());
        assert_eq!(stored.state.next_step(), PipelineStep::MedicalAnalysis);
        assert_eq!(stored.created_at, session.created_at);

        let mut last = first;
        while !last.is_complete() {
            last = runner.run(&session.id).await.unwrap();
        }
        let stored = storage.get(&session.id).await.unwrap().unwrap();
        assert!(stored.state.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_runs_on_one_session_never_repeat_a_step() {
        let fixture = Fixture::new(RiskLevel::Low, TriageLevel::Low, 1);
        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(Arc::new(fixture.pipeline()), storage.clone());
        let session = runner.create_session("토해요", Vec::new()).await.unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let runner = runner.clone();
                let id = session.id.clone();
                tokio::spawn(async move { runner.run(&id).await })
            })
            .collect();
        let mut stages = Vec::new();
        for handle in handles {
            stages.push(stage_of(&handle.await.unwrap().unwrap()));
        }
        stages.sort();

        assert_eq!(
            stages,
            vec![
                Some(PipelineStep::SymptomIntake),
                Some(PipelineStep::MedicalAnalysis)
            ]
        );
        assert_eq!(fixture.symptom.calls(), 1);
        assert_eq!(fixture.medical.calls(), 1);
        let stored = storage.get(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.state.next_step(), PipelineStep::Triage);
    }

    #[tokio::test]
    async fn only_the_completing_run_reports_producing_the_report() {
        let fixture = Fixture::new(RiskLevel::Low, TriageLevel::Low, 1);
        let runner = FlowRunner::new(
            Arc::new(fixture.pipeline()),
            Arc::new(InMemorySessionStorage::new()),
        );
        let session = runner.create_session("토해요", Vec::new()).await.unwrap();

        let mut step = runner.run_step(&session.id).await.unwrap();
        while !step.advance.is_complete() {
            assert!(!step.produced_report);
            step = runner.run_step(&session.id).await.unwrap();
        }
        assert!(step.produced_report);

        let again = runner.run_step(&session.id).await.unwrap();
        assert!(again.advance.is_complete());
        assert!(!again.produced_report);
    }

    #[tokio::test]
    async fn runner_reports_unknown_session() {
        let fixture = Fixture::new(RiskLevel::Low, TriageLevel::Low, 1);
        let runner = FlowRunner::new(
            Arc::new(fixture.pipeline()),
            Arc::new(InMemorySessionStorage::new()),
        );

        let err = runner.run("missing").await.unwrap_err();
        assert!(matches!(err, PipelineError::SessionNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_storage() {
        let storage = InMemorySessionStorage::new();
        let session = Session::with_id("session1", PipelineState::new("기침", Vec::new()));

        storage.save(session.clone()).await.unwrap();
        assert_eq!(storage.get("session1").await.unwrap(), Some(session));

        storage.delete("session1").await.unwrap();
        assert!(storage.get("session1").await.unwrap().is_none());
        assert!(storage.is_empty());
    }
}
