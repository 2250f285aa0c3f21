use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::services::backend_client::AssessmentBackend;
use crate::services::session_store::Effect;

/// Runs the side effects produced by the session store.
///
/// Nothing here feeds back into the session: failures are logged and
/// reported to the caller, never retried.
#[derive(Clone)]
pub struct EffectRunner {
    backend: Arc<dyn AssessmentBackend>,
}

impl EffectRunner {
    pub fn new(backend: Arc<dyn AssessmentBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn AssessmentBackend> {
        &self.backend
    }

    pub async fn run(&self, effect: Effect) -> Result<()> {
        match effect {
            Effect::McqAnswer(answer) => {
                self.backend.push_mcq_answer(&answer).await.map_err(|e| {
                    tracing::warn!(question_id = %answer.question_id, error = %e, "MCQ answer push failed");
                    e
                })
            }
            Effect::Drafts(drafts) => {
                let total = drafts.len();
                let mut failed = 0;
                for draft in &drafts {
                    if let Err(e) = self.backend.push_draft(draft).await {
                        failed += 1;
                        tracing::warn!(problem_id = %draft.problem_id, error = %e, "Draft push failed");
                    }
                }
                if failed > 0 {
                    return Err(Error::Internal(format!(
                        "{} of {} drafts could not be saved",
                        failed, total
                    )));
                }
                tracing::debug!(count = total, "Drafts saved");
                Ok(())
            }
            Effect::FinalAnswers(answers) => {
                let total = answers.len();
                let mut failed = 0;
                for answer in &answers {
                    if let Err(e) = self.backend.push_test_answer(answer).await {
                        failed += 1;
                        tracing::warn!(
                            question_id = %answer.question_id,
                            error = %e,
                            "Final answer push failed, submission stays local"
                        );
                    }
                }
                if failed > 0 {
                    return Err(Error::Internal(format!(
                        "{} of {} answers were not recorded",
                        failed, total
                    )));
                }
                tracing::info!(count = total, "Final answers recorded");
                Ok(())
            }
            Effect::AssignmentUpdate {
                assignment_id,
                payload,
            } => self
                .backend
                .update_assignment(&assignment_id, &payload)
                .await
                .map_err(|e| {
                    tracing::warn!(%assignment_id, error = %e, "Assignment update failed");
                    e
                }),
        }
    }

    /// Runs effects in order. A failure does not stop the ones after it;
    /// the last error is returned.
    pub async fn run_all(&self, effects: Vec<Effect>) -> Result<()> {
        let mut outcome = Ok(());
        for effect in effects {
            if let Err(e) = self.run(effect).await {
                outcome = Err(e);
            }
        }
        outcome
    }

    /// Fire-and-forget. The handle is only useful to tests; dropping it does
    /// not cancel the work.
    pub fn dispatch(&self, effects: Vec<Effect>) -> Option<JoinHandle<()>> {
        if effects.is_empty() {
            return None;
        }
        let runner = self.clone();
        let span = tracing::info_span!("effects", batch_id = %Uuid::new_v4(), count = effects.len());
        Some(tokio::spawn(
            async move {
                let _ = runner.run_all(effects).await;
            }
            .instrument(span),
        ))
    }
}
