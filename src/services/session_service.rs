use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::dto::session_dto::{
    AutosaveStatus, InitSessionRequest, SessionStatusResponse, ViolationCounts, ViolationKind,
};
use crate::error::{Error, Result};
use crate::models::question::{CodingQuestion, McqQuestion};
use crate::models::session::{SessionState, SessionSummary, TestSession};
use crate::services::backend_client::AssessmentBackend;
use crate::services::drivers::{spawn_drivers, DriverHandle, DriverSettings};
use crate::services::effect_runner::EffectRunner;
use crate::services::session_store::SessionStore;

const DEFAULT_DURATION_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    UserConfirmed,
    TimerExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running(u32),
    Expired,
    /// No session, or the session is no longer `ACTIVE`.
    Stopped,
}

/// State owned by the "view", never part of the session snapshot.
#[derive(Debug, Default)]
struct ViewState {
    autosave: AutosaveStatus,
    autosave_error: Option<String>,
    violations: ViolationCounts,
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<Mutex<SessionStore>>,
    view: Arc<Mutex<ViewState>>,
    drivers: Arc<Mutex<Option<DriverHandle>>>,
    runner: EffectRunner,
    settings: DriverSettings,
    default_candidate_id: Option<String>,
}

impl SessionService {
    pub fn new(
        backend: Arc<dyn AssessmentBackend>,
        candidate_id: Option<String>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(SessionStore::new(candidate_id.clone()))),
            view: Arc::new(Mutex::new(ViewState::default())),
            drivers: Arc::new(Mutex::new(None)),
            runner: EffectRunner::new(backend),
            settings,
            default_candidate_id: candidate_id,
        }
    }

    fn store(&self) -> MutexGuard<'_, SessionStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the drivers unless they are already running. The state is
    /// re-checked under the store lock so a submit that raced ahead wins.
    fn start_drivers(&self) {
        let mut drivers = self.drivers.lock().unwrap_or_else(PoisonError::into_inner);
        if drivers.as_ref().is_some_and(|h| !h.is_stopped()) {
            return;
        }
        if self.store().state() != Some(SessionState::Active) {
            *drivers = None;
            return;
        }
        *drivers = Some(spawn_drivers(self, self.settings));
    }

    fn stop_drivers(&self) {
        let handle = self
            .drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.stop();
            tracing::debug!("Session drivers stopped");
        }
    }

    pub fn drivers_running(&self) -> bool {
        self.drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|h| !h.is_stopped())
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> Option<TestSession> {
        self.store().session().cloned()
    }

    pub fn require_session(&self) -> Result<TestSession> {
        self.snapshot().ok_or(Error::NoSession)
    }

    pub fn init_session(&self, req: &InitSessionRequest) -> Result<TestSession> {
        self.init_with_questions(
            &req.assignment_id,
            &req.test_id,
            req.duration_minutes,
            &req.mcq_questions,
            &req.coding_questions,
            req.candidate_id.clone(),
            req.force,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn init_with_questions(
        &self,
        assignment_id: &str,
        test_id: &str,
        duration_minutes: u32,
        mcqs: &[McqQuestion],
        codings: &[CodingQuestion],
        candidate_id: Option<String>,
        force: bool,
    ) -> Result<TestSession> {
        let session = {
            let mut store = self.store();
            let session = store
                .init_session(assignment_id, test_id, duration_minutes, mcqs, codings, force)?
                .clone();
            // Each attempt pushes under its own candidate, falling back to
            // the configured one.
            store.set_candidate_id(candidate_id.or_else(|| self.default_candidate_id.clone()));
            session
        };

        self.stop_drivers();
        *self.view() = ViewState::default();
        tracing::info!(
            assignment_id = %session.assignment_id,
            test_id = %session.test_id,
            questions = session.total_questions(),
            remaining_time = session.remaining_time,
            "Test session initialized"
        );
        Ok(session)
    }

    /// Pulls the assignment and its test from the backend and starts a
    /// session for it.
    pub async fn load_assignment_and_init(
        &self,
        assignment_id: &str,
        candidate_id: Option<String>,
        force: bool,
    ) -> Result<TestSession> {
        let backend = self.runner.backend();
        let assignment = backend.fetch_assignment(assignment_id).await?;
        let test = backend.fetch_test(&assignment.test_id).await?;

        let mcqs: Vec<McqQuestion> = test.mcq_questions.into_iter().map(Into::into).collect();
        let codings: Vec<CodingQuestion> =
            test.coding_questions.into_iter().map(Into::into).collect();
        let candidate_id = candidate_id.or(assignment.candidate_id);

        self.init_with_questions(
            &assignment.assignment_id,
            &test.test_id,
            test.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
            &mcqs,
            &codings,
            candidate_id,
            force,
        )
    }

    pub fn set_state(&self, next: SessionState) -> Result<TestSession> {
        let (previous, session) = {
            let mut store = self.store();
            let previous = store.set_state(next)?;
            (previous, store.session().cloned().ok_or(Error::NoSession)?)
        };

        if previous != next {
            tracing::info!(from = %previous, to = %next, "Session state changed");
        }
        if next == SessionState::Active {
            self.start_drivers();
        } else if previous == SessionState::Active {
            self.stop_drivers();
        }
        Ok(session)
    }

    fn navigate_with<F>(&self, mv: F) -> Result<TestSession>
    where
        F: FnOnce(&mut SessionStore) -> Option<String>,
    {
        let mut store = self.store();
        if store.session().is_none() {
            return Err(Error::NoSession);
        }
        if let Some(question_id) = mv(&mut *store) {
            store.mark_question_visited(&question_id);
        }
        store.session().cloned().ok_or(Error::NoSession)
    }

    pub fn set_current_question(&self, index: usize) -> Result<TestSession> {
        self.navigate_with(|store| store.set_current_question(index))
    }

    pub fn next_question(&self) -> Result<TestSession> {
        self.navigate_with(SessionStore::next_question)
    }

    pub fn prev_question(&self) -> Result<TestSession> {
        self.navigate_with(SessionStore::prev_question)
    }

    fn ensure_question(session: &TestSession, question_id: &str) -> Result<()> {
        if session.mcq_answer(question_id).is_none() && session.coding_answer(question_id).is_none()
        {
            return Err(Error::NotFound(format!("Question {} not in session", question_id)));
        }
        Ok(())
    }

    pub fn save_mcq_answer(&self, question_id: &str, option: u32) -> Result<TestSession> {
        let (effects, session) = {
            let mut store = self.store();
            let current = store.session().ok_or(Error::NoSession)?;
            if current.mcq_answer(question_id).is_none() {
                return Err(Error::NotFound(format!("MCQ {} not in session", question_id)));
            }
            let effects = store.save_mcq_answer(question_id, option)?;
            (effects, store.session().cloned().ok_or(Error::NoSession)?)
        };
        self.runner.dispatch(effects);
        Ok(session)
    }

    pub fn save_coding_answer(&self, question_id: &str, code: &str) -> Result<TestSession> {
        let mut store = self.store();
        let current = store.session().ok_or(Error::NoSession)?;
        if current.coding_answer(question_id).is_none() {
            return Err(Error::NotFound(format!(
                "Coding question {} not in session",
                question_id
            )));
        }
        store.save_coding_answer(question_id, code)?;
        store.session().cloned().ok_or(Error::NoSession)
    }

    pub fn toggle_mark_for_review(&self, question_id: &str) -> Result<bool> {
        let mut store = self.store();
        Self::ensure_question(store.session().ok_or(Error::NoSession)?, question_id)?;
        store
            .toggle_mark_for_review(question_id)?
            .ok_or_else(|| Error::NotFound(format!("Question {} not in session", question_id)))
    }

    pub fn mark_question_visited(&self, question_id: &str) -> Result<TestSession> {
        let mut store = self.store();
        Self::ensure_question(store.session().ok_or(Error::NoSession)?, question_id)?;
        store.mark_question_visited(question_id);
        store.session().cloned().ok_or(Error::NoSession)
    }

    /// One timer period. Only counts down while the session is `ACTIVE`.
    pub fn tick(&self) -> TickOutcome {
        let mut store = self.store();
        if store.state() != Some(SessionState::Active) {
            return TickOutcome::Stopped;
        }
        match store.decrement_timer() {
            Some(0) => TickOutcome::Expired,
            Some(remaining) => TickOutcome::Running(remaining),
            None => TickOutcome::Stopped,
        }
    }

    /// One autosave period. Returns `Ok(false)` once the session is no
    /// longer `ACTIVE`.
    pub async fn autosave_once(&self) -> Result<bool> {
        let effects = {
            let mut store = self.store();
            if store.state() != Some(SessionState::Active) {
                return Ok(false);
            }
            store.mark_autosaved()
        };

        self.view().autosave = AutosaveStatus::Saving;
        let outcome = self.runner.run_all(effects).await;

        let mut view = self.view();
        match outcome {
            Ok(()) => {
                view.autosave = AutosaveStatus::Saved;
                view.autosave_error = None;
                Ok(true)
            }
            Err(e) => {
                view.autosave = AutosaveStatus::Error;
                view.autosave_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Hands the attempt in. Returns `None` when there was no session.
    ///
    /// Local state is final as soon as this returns; backend calls run in
    /// the background and their failures are only logged.
    pub fn submit_test(&self, trigger: SubmitTrigger) -> Result<Option<TestSession>> {
        let (effects, session) = {
            let mut store = self.store();
            let effects = store.submit_test()?;
            (effects, store.session().cloned())
        };

        self.stop_drivers();
        if let Some(session) = &session {
            if !effects.is_empty() {
                tracing::info!(
                    assignment_id = %session.assignment_id,
                    ?trigger,
                    remaining_time = session.remaining_time,
                    "Test submitted"
                );
            }
        }
        self.runner.dispatch(effects);
        Ok(session)
    }

    pub fn load_saved_session(&self, snapshot: TestSession) -> Result<TestSession> {
        if !snapshot.has_valid_cursor() {
            return Err(Error::BadRequest(format!(
                "current_question_index {} is out of range for {} questions",
                snapshot.current_question_index,
                snapshot.total_questions()
            )));
        }
        self.stop_drivers();
        let active = snapshot.state == SessionState::Active;
        tracing::info!(
            assignment_id = %snapshot.assignment_id,
            state = %snapshot.state,
            "Restoring saved test session"
        );
        self.store().load_saved_session(snapshot.clone());
        *self.view() = ViewState::default();
        if active {
            self.start_drivers();
        }
        Ok(snapshot)
    }

    /// Pulls saved drafts for every coding answer. Returns how many were
    /// applied.
    pub async fn restore_drafts(&self) -> Result<usize> {
        let (candidate_id, question_ids) = {
            let store = self.store();
            let session = store.session().ok_or(Error::NoSession)?;
            let Some(candidate_id) = store.candidate_id() else {
                return Ok(0);
            };
            let ids: Vec<String> = session
                .coding_answers
                .iter()
                .map(|a| a.question_id.clone())
                .collect();
            (candidate_id.to_string(), ids)
        };

        let mut restored = 0;
        for question_id in question_ids {
            match self
                .runner
                .backend()
                .fetch_draft(&candidate_id, &question_id)
                .await
            {
                Ok(Some(draft)) => {
                    if self.store().apply_draft(&question_id, &draft.code) {
                        restored += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(%question_id, error = %e, "Failed to load draft");
                }
            }
        }
        tracing::info!(restored, "Drafts restored");
        Ok(restored)
    }

    pub fn reset_session(&self) -> Option<TestSession> {
        self.stop_drivers();
        let discarded = self.store().reset_session();
        *self.view() = ViewState::default();
        if let Some(session) = &discarded {
            tracing::info!(assignment_id = %session.assignment_id, "Test session discarded");
        }
        discarded
    }

    pub fn summary(&self) -> Result<SessionSummary> {
        self.store().summary().ok_or(Error::NoSession)
    }

    /// Counts a proctoring signal. Ignored unless the session is `ACTIVE`.
    pub fn record_violation(&self, kind: ViolationKind) -> Result<ViolationCounts> {
        let state = self.store().state().ok_or(Error::NoSession)?;
        let mut view = self.view();
        if state != SessionState::Active {
            return Ok(view.violations);
        }
        match kind {
            ViolationKind::TabHidden => view.violations.tab_hidden += 1,
            ViolationKind::FullscreenExit => view.violations.fullscreen_exit += 1,
        }
        tracing::warn!(
            ?kind,
            tab_hidden = view.violations.tab_hidden,
            fullscreen_exit = view.violations.fullscreen_exit,
            "Proctoring violation recorded"
        );
        Ok(view.violations)
    }

    pub fn status(&self) -> SessionStatusResponse {
        let session = self.snapshot();
        let drivers_running = self.drivers_running();
        let view = self.view();
        SessionStatusResponse {
            state: session.as_ref().map(|s| s.state),
            remaining_time: session.as_ref().map(|s| s.remaining_time),
            last_autosave: session.as_ref().and_then(|s| s.last_autosave),
            autosave_status: view.autosave,
            autosave_error: view.autosave_error.clone(),
            violations: view.violations,
            drivers_running,
        }
    }
}
