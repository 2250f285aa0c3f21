//! Single-owner store for the candidate's active test attempt.
//!
//! Every mutation is synchronous and only computes the next state. Network
//! work the mutation implies is handed back as [`Effect`] values, which the
//! caller decides how (and whether) to run.

use chrono::Utc;

use crate::dto::backend_dto::{
    AssignmentUpdatePayload, DraftPayload, McqAnswerPayload, TestAnswerPayload,
};
use crate::error::{Error, Result};
use crate::models::assignment::AssignmentStatus;
use crate::models::question::{CodingQuestion, McqQuestion};
use crate::models::session::{SessionState, SessionSummary, TestSession};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    McqAnswer(McqAnswerPayload),
    Drafts(Vec<DraftPayload>),
    FinalAnswers(Vec<TestAnswerPayload>),
    AssignmentUpdate {
        assignment_id: String,
        payload: AssignmentUpdatePayload,
    },
}

#[derive(Debug, Default)]
pub struct SessionStore {
    session: Option<TestSession>,
    candidate_id: Option<String>,
}

impl SessionStore {
    pub fn new(candidate_id: Option<String>) -> Self {
        Self {
            session: None,
            candidate_id,
        }
    }

    pub fn session(&self) -> Option<&TestSession> {
        self.session.as_ref()
    }

    pub fn candidate_id(&self) -> Option<&str> {
        self.candidate_id.as_deref()
    }

    pub fn set_candidate_id(&mut self, candidate_id: Option<String>) {
        self.candidate_id = candidate_id;
    }

    pub fn state(&self) -> Option<SessionState> {
        self.session.as_ref().map(|s| s.state)
    }

    /// Starts a fresh attempt in `INSTRUCTIONS`.
    ///
    /// An attempt that is `ACTIVE` or awaiting submit confirmation is only
    /// replaced when `force` is set (retake flows). Anything else is
    /// replaced silently.
    pub fn init_session(
        &mut self,
        assignment_id: &str,
        test_id: &str,
        duration_minutes: u32,
        mcqs: &[McqQuestion],
        codings: &[CodingQuestion],
        force: bool,
    ) -> Result<&TestSession> {
        if let Some(existing) = &self.session {
            if existing.state.is_submittable() && !force {
                return Err(Error::SessionInProgress(existing.assignment_id.clone()));
            }
            tracing::info!(
                previous_assignment = %existing.assignment_id,
                previous_state = %existing.state,
                "Replacing existing test session"
            );
        }

        let session = TestSession::new(
            assignment_id.to_string(),
            test_id.to_string(),
            duration_minutes,
            mcqs,
            codings,
        );
        Ok(self.session.insert(session))
    }

    /// Moves the attempt to `next`, returning the previous state.
    pub fn set_state(&mut self, next: SessionState) -> Result<SessionState> {
        let session = self.session.as_mut().ok_or(Error::NoSession)?;
        let previous = session.state;
        if previous == next {
            return Ok(previous);
        }
        if !previous.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: previous,
                to: next,
            });
        }

        session.state = next;
        if next == SessionState::Active {
            if session.started_at.is_none() {
                session.started_at = Some(Utc::now());
            }
            // The question on screen when the attempt opens counts as seen.
            let current = session
                .question_id_at(session.current_question_index)
                .map(str::to_string);
            if let Some(question_id) = current {
                self.mark_question_visited(&question_id);
            }
        }
        Ok(previous)
    }

    /// Moves the cursor, clamped to the question range. Returns the id of
    /// the question under the cursor afterwards.
    pub fn set_current_question(&mut self, index: usize) -> Option<String> {
        let session = self.session.as_mut()?;
        let total = session.total_questions();
        if total > 0 {
            session.current_question_index = index.min(total - 1);
        }
        session
            .question_id_at(session.current_question_index)
            .map(str::to_string)
    }

    pub fn next_question(&mut self) -> Option<String> {
        let session = self.session.as_ref()?;
        let next = session.current_question_index.saturating_add(1);
        self.set_current_question(next)
    }

    pub fn prev_question(&mut self) -> Option<String> {
        let session = self.session.as_ref()?;
        let prev = session.current_question_index.saturating_sub(1);
        self.set_current_question(prev)
    }

    pub fn save_mcq_answer(&mut self, question_id: &str, option: u32) -> Result<Vec<Effect>> {
        let candidate_id = self.candidate_id.clone();
        let Some(session) = self.session.as_mut() else {
            return Ok(Vec::new());
        };
        if session.state.is_locked() {
            return Err(Error::SessionLocked(session.state));
        }
        let Some(answer) = session
            .mcq_answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
        else {
            return Ok(Vec::new());
        };

        answer.selected_option = Some(option);
        answer.is_visited = true;

        Ok(candidate_id
            .map(|candidate_id| {
                Effect::McqAnswer(McqAnswerPayload {
                    candidate_id,
                    assignment_id: session.assignment_id.clone(),
                    question_id: question_id.to_string(),
                    selected_option: option.to_string(),
                    is_correct: None,
                })
            })
            .into_iter()
            .collect())
    }

    pub fn save_coding_answer(&mut self, question_id: &str, code: &str) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.state.is_locked() {
            return Err(Error::SessionLocked(session.state));
        }
        if let Some(answer) = session
            .coding_answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
        {
            answer.code = code.to_string();
            answer.is_visited = true;
        }
        Ok(())
    }

    /// Flips the review flag on whichever answer list holds the id, MCQs
    /// first. Returns the new flag, or `None` when nothing matched.
    pub fn toggle_mark_for_review(&mut self, question_id: &str) -> Result<Option<bool>> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        if session.state.is_locked() {
            return Err(Error::SessionLocked(session.state));
        }

        if let Some(answer) = session
            .mcq_answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
        {
            answer.is_marked_for_review = !answer.is_marked_for_review;
            return Ok(Some(answer.is_marked_for_review));
        }
        Ok(session
            .coding_answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
            .map(|answer| {
                answer.is_marked_for_review = !answer.is_marked_for_review;
                answer.is_marked_for_review
            }))
    }

    /// Returns `true` if an answer with this id exists.
    pub fn mark_question_visited(&mut self, question_id: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if let Some(answer) = session
            .mcq_answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
        {
            answer.is_visited = true;
            return true;
        }
        if let Some(answer) = session
            .coding_answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
        {
            answer.is_visited = true;
            return true;
        }
        false
    }

    /// One second off the clock, floored at zero.
    pub fn decrement_timer(&mut self) -> Option<u32> {
        let session = self.session.as_mut()?;
        session.remaining_time = session.remaining_time.saturating_sub(1);
        Some(session.remaining_time)
    }

    /// Stamps the autosave marker and returns the drafts to push.
    pub fn mark_autosaved(&mut self) -> Vec<Effect> {
        let candidate_id = self.candidate_id.clone();
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.last_autosave = Some(Utc::now());

        let Some(candidate_id) = candidate_id else {
            return Vec::new();
        };
        if session.coding_answers.is_empty() {
            return Vec::new();
        }
        let drafts = session
            .coding_answers
            .iter()
            .map(|a| DraftPayload {
                candidate_id: candidate_id.clone(),
                problem_id: a.question_id.clone(),
                language: a.language.clone(),
                code: a.code.clone(),
                cursor_position: 0,
            })
            .collect();
        vec![Effect::Drafts(drafts)]
    }

    /// Replaces a coding answer's code with a recovered draft. The answer is
    /// not marked visited.
    pub fn apply_draft(&mut self, question_id: &str, code: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.state.is_locked() {
            return false;
        }
        match session
            .coding_answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
        {
            Some(answer) => {
                answer.code = code.to_string();
                true
            }
            None => false,
        }
    }

    pub fn load_saved_session(&mut self, snapshot: TestSession) {
        self.session = Some(snapshot);
    }

    /// Hands the attempt in. Local state becomes `SUBMITTED` no matter what
    /// happens to the returned effects later.
    ///
    /// Calling this without a session, or on an attempt that was already
    /// handed in, does nothing.
    pub fn submit_test(&mut self) -> Result<Vec<Effect>> {
        let candidate_id = self.candidate_id.clone();
        let Some(session) = self.session.as_mut() else {
            return Ok(Vec::new());
        };
        if session.state.is_locked() {
            return Ok(Vec::new());
        }
        if !session.state.is_submittable() {
            return Err(Error::InvalidTransition {
                from: session.state,
                to: SessionState::Submitted,
            });
        }

        session.state = SessionState::Submitted;

        let mut effects = Vec::with_capacity(2);
        if let Some(candidate_id) = candidate_id {
            if !session.coding_answers.is_empty() {
                effects.push(Effect::FinalAnswers(
                    session
                        .coding_answers
                        .iter()
                        .map(|a| {
                            TestAnswerPayload::pending(
                                &candidate_id,
                                &session.assignment_id,
                                &a.question_id,
                                &a.language,
                                &a.code,
                            )
                        })
                        .collect(),
                ));
            }
        }
        effects.push(Effect::AssignmentUpdate {
            assignment_id: session.assignment_id.clone(),
            payload: AssignmentUpdatePayload {
                status: AssignmentStatus::Completed,
                completed_at: Utc::now(),
                score: None,
            },
        });
        Ok(effects)
    }

    pub fn reset_session(&mut self) -> Option<TestSession> {
        self.session.take()
    }

    pub fn summary(&self) -> Option<SessionSummary> {
        self.session.as_ref().map(TestSession::summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Difficulty;

    fn mcq(id: &str) -> McqQuestion {
        McqQuestion {
            id: id.to_string(),
            question: "2 + 2 = ?".into(),
            options: vec!["3".into(), "4".into(), "5".into()],
            correct_answer: Some(1),
            difficulty: Difficulty::Easy,
            tags: vec!["math".into()],
            points: 1,
        }
    }

    fn coding(id: &str) -> CodingQuestion {
        CodingQuestion {
            id: id.to_string(),
            title: "Sum two numbers".into(),
            description: "Read a and b, print a + b".into(),
            starter_code: "def solve(a, b):\n    pass\n".into(),
            test_cases: vec![],
            difficulty: Difficulty::Medium,
            tags: vec![],
            points: 10,
            language: "python".into(),
        }
    }

    fn store_with_session(candidate: Option<&str>) -> SessionStore {
        let mut store = SessionStore::new(candidate.map(str::to_string));
        store
            .init_session("a1", "t1", 60, &[mcq("mcq1"), mcq("mcq2")], &[coding("code1")], false)
            .unwrap();
        store
    }

    fn active_store(candidate: Option<&str>) -> SessionStore {
        let mut store = store_with_session(candidate);
        store.set_state(SessionState::Active).unwrap();
        store
    }

    #[test]
    fn init_session_builds_answers_from_questions() {
        let store = store_with_session(None);
        let session = store.session().unwrap();
        assert_eq!(session.state, SessionState::Instructions);
        assert_eq!(session.remaining_time, 3600);
        assert_eq!(session.mcq_answers.len(), 2);
        assert_eq!(session.coding_answers[0].code, coding("code1").starter_code);
        assert_eq!(session.coding_answers[0].language, "python");
        assert!(session.started_at.is_none());
        assert!(session.last_autosave.is_none());
    }

    #[test]
    fn init_session_refuses_to_overwrite_active_attempt() {
        let mut store = active_store(None);
        let err = store
            .init_session("a2", "t2", 30, &[], &[], false)
            .unwrap_err();
        assert!(matches!(err, Error::SessionInProgress(ref id) if id == "a1"));
        assert_eq!(store.session().unwrap().assignment_id, "a1");

        store.init_session("a2", "t2", 30, &[], &[], true).unwrap();
        assert_eq!(store.session().unwrap().assignment_id, "a2");
    }

    #[test]
    fn init_session_replaces_finished_attempt() {
        let mut store = active_store(None);
        store.submit_test().unwrap();
        store.init_session("a2", "t2", 30, &[mcq("m")], &[], false).unwrap();
        assert_eq!(store.session().unwrap().state, SessionState::Instructions);
    }

    #[test]
    fn started_at_is_stamped_once() {
        let mut store = active_store(None);
        let first = store.session().unwrap().started_at;
        assert!(first.is_some());

        store.set_state(SessionState::SubmitConfirm).unwrap();
        store.set_state(SessionState::Active).unwrap();
        assert_eq!(store.session().unwrap().started_at, first);
    }

    #[test]
    fn illegal_transition_leaves_state_untouched() {
        let mut store = active_store(None);
        store.set_state(SessionState::Submitted).unwrap();
        let err = store.set_state(SessionState::Active).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: SessionState::Submitted,
                to: SessionState::Active
            }
        ));
        assert_eq!(store.state(), Some(SessionState::Submitted));
    }

    #[test]
    fn set_state_without_session_is_an_error() {
        let mut store = SessionStore::default();
        assert!(matches!(
            store.set_state(SessionState::Active),
            Err(Error::NoSession)
        ));
    }

    #[test]
    fn navigation_is_clamped_to_question_range() {
        let mut store = store_with_session(None);
        assert_eq!(store.prev_question().as_deref(), Some("mcq1"));
        assert_eq!(store.session().unwrap().current_question_index, 0);

        for _ in 0..10 {
            store.next_question();
            let index = store.session().unwrap().current_question_index;
            assert!(index <= 2);
        }
        assert_eq!(store.session().unwrap().current_question_index, 2);
        assert_eq!(store.next_question().as_deref(), Some("code1"));
        assert_eq!(store.session().unwrap().current_question_index, 2);

        assert_eq!(store.set_current_question(99).as_deref(), Some("code1"));
        assert_eq!(store.set_current_question(1).as_deref(), Some("mcq2"));
        assert_eq!(store.prev_question().as_deref(), Some("mcq1"));
    }

    #[test]
    fn navigation_without_questions_stays_at_zero() {
        let mut store = SessionStore::default();
        store.init_session("a1", "t1", 10, &[], &[], false).unwrap();
        assert_eq!(store.next_question(), None);
        assert_eq!(store.session().unwrap().current_question_index, 0);
    }

    #[test]
    fn saving_mcq_answer_marks_visited_and_overwrites() {
        let mut store = active_store(None);
        store.save_mcq_answer("mcq2", 0).unwrap();
        store.save_mcq_answer("mcq2", 2).unwrap();

        let answer = store.session().unwrap().mcq_answer("mcq2").unwrap();
        assert_eq!(answer.selected_option, Some(2));
        assert!(answer.is_visited);
        assert_eq!(store.session().unwrap().mcq_answers.len(), 2);
    }

    #[test]
    fn saving_mcq_answer_emits_push_only_with_candidate() {
        let mut anonymous = active_store(None);
        assert!(anonymous.save_mcq_answer("mcq1", 1).unwrap().is_empty());

        let mut store = active_store(Some("cand-7"));
        let effects = store.save_mcq_answer("mcq1", 1).unwrap();
        assert_eq!(
            effects,
            vec![Effect::McqAnswer(McqAnswerPayload {
                candidate_id: "cand-7".into(),
                assignment_id: "a1".into(),
                question_id: "mcq1".into(),
                selected_option: "1".into(),
                is_correct: None,
            })]
        );
    }

    #[test]
    fn unknown_question_ids_are_ignored() {
        let mut store = active_store(Some("cand"));
        assert!(store.save_mcq_answer("nope", 1).unwrap().is_empty());
        store.save_coding_answer("nope", "x").unwrap();
        assert_eq!(store.toggle_mark_for_review("nope").unwrap(), None);
        assert!(!store.mark_question_visited("nope"));
        assert_eq!(store.session().unwrap().summary().visited, 1);
    }

    #[test]
    fn saving_coding_answer_replaces_code() {
        let mut store = active_store(None);
        store.save_coding_answer("code1", "print(3)").unwrap();
        let answer = store.session().unwrap().coding_answer("code1").unwrap();
        assert_eq!(answer.code, "print(3)");
        assert!(answer.is_visited);
        assert!(answer.is_answered());
    }

    #[test]
    fn answers_are_locked_after_submission() {
        let mut store = active_store(None);
        store.submit_test().unwrap();
        assert!(matches!(
            store.save_mcq_answer("mcq1", 1),
            Err(Error::SessionLocked(SessionState::Submitted))
        ));
        assert!(store.save_coding_answer("code1", "x").is_err());
        assert!(store.toggle_mark_for_review("mcq1").is_err());
    }

    #[test]
    fn toggle_mark_for_review_is_an_involution() {
        let mut store = active_store(None);
        for id in ["mcq1", "code1"] {
            assert_eq!(store.toggle_mark_for_review(id).unwrap(), Some(true));
            assert_eq!(store.toggle_mark_for_review(id).unwrap(), Some(false));
        }
        assert_eq!(store.summary().unwrap().marked_for_review, 0);
    }

    #[test]
    fn mark_visited_is_idempotent() {
        let mut store = active_store(None);
        assert!(store.mark_question_visited("code1"));
        assert!(store.mark_question_visited("code1"));
        assert_eq!(store.summary().unwrap().visited, 2);
    }

    #[test]
    fn entering_active_visits_the_current_question() {
        let mut store = store_with_session(None);
        assert_eq!(store.summary().unwrap().visited, 0);

        store.set_state(SessionState::Active).unwrap();
        let session = store.session().unwrap();
        assert!(session.mcq_answer("mcq1").unwrap().is_visited);
        assert!(!session.mcq_answer("mcq2").unwrap().is_visited);
        assert_eq!(session.summary().visited, 1);
    }

    #[test]
    fn entering_active_without_questions_visits_nothing() {
        let mut store = SessionStore::default();
        store.init_session("a1", "t1", 10, &[], &[], false).unwrap();
        store.set_state(SessionState::Active).unwrap();
        assert_eq!(store.summary().unwrap().visited, 0);
    }

    #[test]
    fn timer_floors_at_zero() {
        let mut store = SessionStore::default();
        store.init_session("a1", "t1", 1, &[], &[], false).unwrap();
        for _ in 0..60 {
            store.decrement_timer();
        }
        assert_eq!(store.session().unwrap().remaining_time, 0);
        assert_eq!(store.decrement_timer(), Some(0));
        assert_eq!(store.decrement_timer(), Some(0));
    }

    #[test]
    fn timer_without_session_is_noop() {
        let mut store = SessionStore::default();
        assert_eq!(store.decrement_timer(), None);
    }

    #[test]
    fn autosave_stamps_marker_and_collects_drafts() {
        let mut store = active_store(Some("cand"));
        store.save_coding_answer("code1", "print('hi')").unwrap();

        let effects = store.mark_autosaved();
        assert!(store.session().unwrap().last_autosave.is_some());
        match effects.as_slice() {
            [Effect::Drafts(drafts)] => {
                assert_eq!(drafts.len(), 1);
                assert_eq!(drafts[0].problem_id, "code1");
                assert_eq!(drafts[0].code, "print('hi')");
                assert_eq!(drafts[0].cursor_position, 0);
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn autosave_without_candidate_only_stamps() {
        let mut store = active_store(None);
        assert!(store.mark_autosaved().is_empty());
        assert!(store.session().unwrap().last_autosave.is_some());
    }

    #[test]
    fn submit_without_session_is_noop() {
        let mut store = SessionStore::default();
        assert!(store.submit_test().unwrap().is_empty());
        assert!(store.session().is_none());
    }

    #[test]
    fn submit_emits_final_answers_then_assignment_update() {
        let mut store = active_store(Some("cand"));
        let effects = store.submit_test().unwrap();
        assert_eq!(store.state(), Some(SessionState::Submitted));
        assert_eq!(effects.len(), 2);
        match &effects[0] {
            Effect::FinalAnswers(answers) => {
                assert_eq!(answers[0].assignment_id, "a1");
                assert_eq!(answers[0].code_status, "pending");
            }
            other => panic!("unexpected effect: {:?}", other),
        }
        assert!(matches!(
            &effects[1],
            Effect::AssignmentUpdate { assignment_id, payload }
                if assignment_id == "a1" && payload.status == AssignmentStatus::Completed
        ));
    }

    #[test]
    fn second_submit_is_noop() {
        let mut store = active_store(Some("cand"));
        store.submit_test().unwrap();
        assert!(store.submit_test().unwrap().is_empty());
    }

    #[test]
    fn submit_before_start_is_rejected() {
        let mut store = store_with_session(None);
        assert!(matches!(
            store.submit_test(),
            Err(Error::InvalidTransition {
                from: SessionState::Instructions,
                ..
            })
        ));
    }

    #[test]
    fn saved_session_round_trips() {
        let mut store = active_store(Some("cand"));
        store.save_mcq_answer("mcq1", 2).unwrap();
        store.toggle_mark_for_review("code1").unwrap();
        store.decrement_timer();
        store.mark_autosaved();
        let original = store.session().unwrap().clone();

        let snapshot = serde_json::to_string(&original).unwrap();
        let mut restored = SessionStore::default();
        restored.load_saved_session(serde_json::from_str(&snapshot).unwrap());
        assert_eq!(restored.session(), Some(&original));
    }

    #[test]
    fn reset_discards_session() {
        let mut store = active_store(None);
        assert!(store.reset_session().is_some());
        assert!(store.session().is_none());
        assert!(store.summary().is_none());
    }

    #[test]
    fn drafts_replace_code_without_visiting() {
        let mut store = active_store(None);
        assert!(store.apply_draft("code1", "restored()"));
        let answer = store.session().unwrap().coding_answer("code1").unwrap();
        assert_eq!(answer.code, "restored()");
        assert!(!answer.is_visited);
        assert!(!store.apply_draft("mcq1", "x"));
    }
}
