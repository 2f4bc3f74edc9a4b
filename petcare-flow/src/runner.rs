//! FlowRunner: loads a session, advances it by exactly **one** step and saves it back.
//!
//! Web handlers keep one runner for the lifetime of the service and call
//! [`FlowRunner::run`] once per request. Callers that want every step in one go
//! (CLI, the one-shot endpoint) use [`crate::Pipeline::run_to_completion`] on a
//! state they own instead.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    error::{PipelineError, Result},
    pipeline::{Advance, Pipeline},
    state::PipelineState,
    storage::{Session, SessionStorage},
};

/// One executed step plus whether this call is the one that built the report.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRun {
    pub advance: Advance,
    pub produced_report: bool,
}

#[derive(Clone)]
pub struct FlowRunner {
    pipeline: Arc<Pipeline>,
    storage: Arc<dyn SessionStorage>,
    // Serialises runs of the same session within this process
    session_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl FlowRunner {
    pub fn new(pipeline: Arc<Pipeline>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            pipeline,
            storage,
            session_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    /// Stores a fresh session for `user_input` without executing anything.
    pub async fn create_session(
        &self,
        user_input: impl Into<String>,
        image_refs: Vec<String>,
    ) -> Result<Session> {
        let session = Session::new(PipelineState::new(user_input, image_refs));
        self.storage.save(session.clone()).await?;
        info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    /// Executes one step for `session_id` and persists the new state.
    ///
    /// Nothing is saved when the step fails.
    pub async fn run(&self, session_id: &str) -> Result<Advance> {
        self.run_step(session_id).await.map(|step| step.advance)
    }

    /// Like [`FlowRunner::run`], and also reports whether this call built the report.
    ///
    /// Concurrent calls for one session run one after another, so each sees the
    /// state saved by the previous one and no step executes twice.
    pub async fn run_step(&self, session_id: &str) -> Result<StepRun> {
        let lock = self
            .session_locks
            .entry(session_id.to_string())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.load_advance_save(session_id).await
        };

        drop(lock);
        self.session_locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn load_advance_save(&self, session_id: &str) -> Result<StepRun> {
        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| PipelineError::SessionNotFound(session_id.to_string()))?;

        let was_complete = session.state.final_report().is_some();
        let user_input = session.state.user_input().to_string();
        let advance = self.pipeline.advance(&mut session.state, &user_input).await?;

        session.touch();
        self.storage.save(session).await?;
        info!(session_id, complete = advance.is_complete(), "Session advanced");

        Ok(StepRun {
            produced_report: advance.is_complete() && !was_complete,
            advance,
        })
    }
}
