pub mod config;
pub mod dto;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use crate::config::Config;
use crate::services::{
    backend_client::{AssessmentBackend, HttpBackend},
    drivers::DriverSettings,
    session_service::SessionService,
};

#[derive(Clone)]
pub struct AppState {
    pub session_service: SessionService,
}

impl AppState {
    pub fn new(config: &Config) -> crate::error::Result<Self> {
        let backend = HttpBackend::from_config(config)?;
        let settings = DriverSettings {
            timer_tick: config.timer_tick,
            autosave_interval: config.autosave_interval,
        };
        Ok(Self::with_backend(
            Arc::new(backend),
            config.candidate_id.clone(),
            settings,
        ))
    }

    pub fn with_backend(
        backend: Arc<dyn AssessmentBackend>,
        candidate_id: Option<String>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            session_service: SessionService::new(backend, candidate_id, settings),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/api/session",
            get(routes::session::get_session)
                .post(routes::session::init_session)
                .delete(routes::session::reset_session),
        )
        .route("/api/session/snapshot", put(routes::session::load_snapshot))
        .route(
            "/api/session/assignments/:assignment_id",
            post(routes::session::load_assignment),
        )
        .route(
            "/api/session/drafts/restore",
            post(routes::session::restore_drafts),
        )
        .route("/api/session/state", post(routes::session::set_state))
        .route("/api/session/navigate", post(routes::session::navigate))
        .route(
            "/api/session/mcq/:question_id",
            patch(routes::session::save_mcq_answer),
        )
        .route(
            "/api/session/coding/:question_id",
            patch(routes::session::save_coding_answer),
        )
        .route(
            "/api/session/review/:question_id",
            post(routes::session::toggle_review),
        )
        .route(
            "/api/session/visited/:question_id",
            post(routes::session::mark_visited),
        )
        .route("/api/session/summary", get(routes::session::get_summary))
        .route("/api/session/submit", post(routes::session::submit_test))
        .route(
            "/api/session/violations",
            post(routes::session::report_violation),
        )
        .route("/api/session/status", get(routes::session::get_status))
        .with_state(state)
}
