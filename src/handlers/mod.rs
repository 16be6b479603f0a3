use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;

use crate::{app_state::AppState, session::AtmError};

pub mod atm;
pub mod nui;

#[derive(Debug, Serialize)]
pub struct ActionError {
    pub status: String,
    pub reason: String,
}

pub type ActionResult<T> = Result<Json<T>, (StatusCode, Json<ActionError>)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        // Host bridge: inbound pushes and keyboard events
        .route("/nui/message", post(nui::message))
        .route("/nui/keydown", post(nui::keydown))
        // ATM screen actions
        .route("/atm", get(atm::snapshot))
        .route("/atm/cards/{card_id}/select", post(atm::select_card))
        .route("/atm/cards/{card_id}/toggle-block", post(atm::toggle_card_block))
        .route("/atm/accounts/{account_id}/select", post(atm::select_account))
        .route("/atm/keypad", post(atm::keypad))
        .route("/atm/menu/{action}", post(atm::open_form))
        .route("/atm/form", post(atm::update_form))
        .route("/atm/submit", post(atm::submit))
        .route("/atm/back", post(atm::back))
        .route("/atm/close", post(atm::close))
        .with_state(state)
}

fn error_response(err: &AtmError) -> (StatusCode, Json<ActionError>) {
    let status = match err {
        AtmError::NoSession => StatusCode::NOT_FOUND,
        AtmError::Host { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::BAD_REQUEST,
    };

    (
        status,
        Json(ActionError {
            status: "ERROR".to_string(),
            reason: err.to_string(),
        }),
    )
}
