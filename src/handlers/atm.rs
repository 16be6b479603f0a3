use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use super::{ActionError, ActionResult, error_response};
use crate::{
    app_state::AppState,
    controller::Key,
    session::{AtmError, AtmSnapshot, FormKind},
};

#[derive(Debug, Deserialize)]
pub struct KeypadPress {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormUpdate {
    amount: Option<String>,
    target_account_id: Option<String>,
}

async fn respond(state: &AppState, result: Result<(), AtmError>) -> ActionResult<AtmSnapshot> {
    result.map_err(|err| error_response(&err))?;
    Ok(Json(state.controller.snapshot().await))
}

/// GET /atm
pub async fn snapshot(State(state): State<AppState>) -> Json<AtmSnapshot> {
    Json(state.controller.snapshot().await)
}

/// POST /atm/cards/{card_id}/select
pub async fn select_card(
    Path(card_id): Path<i64>,
    State(state): State<AppState>,
) -> ActionResult<AtmSnapshot> {
    let result = state.controller.select_card(card_id).await;
    respond(&state, result).await
}

/// POST /atm/cards/{card_id}/toggle-block
pub async fn toggle_card_block(
    Path(card_id): Path<i64>,
    State(state): State<AppState>,
) -> ActionResult<AtmSnapshot> {
    let result = state.controller.toggle_card_block(card_id).await;
    respond(&state, result).await
}

/// POST /atm/accounts/{account_id}/select
/// Only available when the session does not require a PIN
pub async fn select_account(
    Path(account_id): Path<i64>,
    State(state): State<AppState>,
) -> ActionResult<AtmSnapshot> {
    let result = state.controller.select_account(account_id).await;
    respond(&state, result).await
}

/// POST /atm/keypad
/// On-screen keypad: digits, "back" and "ok"
pub async fn keypad(
    State(state): State<AppState>,
    Json(press): Json<KeypadPress>,
) -> ActionResult<AtmSnapshot> {
    let result = match Key::from_keypad(&press.key) {
        Key::Escape | Key::Other => Ok(()),
        key => state.controller.press_key(key).await,
    };
    respond(&state, result).await
}

/// POST /atm/menu/{action}
pub async fn open_form(
    Path(action): Path<String>,
    State(state): State<AppState>,
) -> ActionResult<AtmSnapshot> {
    let Some(kind) = FormKind::parse(&action) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ActionError {
                status: "ERROR".to_string(),
                reason: format!("Unknown ATM action: {}", action),
            }),
        ));
    };

    let result = state.controller.open_form(kind).await;
    respond(&state, result).await
}

/// POST /atm/form
pub async fn update_form(
    State(state): State<AppState>,
    Json(update): Json<FormUpdate>,
) -> ActionResult<AtmSnapshot> {
    let result = state
        .controller
        .update_form(update.amount, update.target_account_id)
        .await;
    respond(&state, result).await
}

/// POST /atm/submit
/// Validates the active form, dispatches the mutation and returns to the menu
pub async fn submit(State(state): State<AppState>) -> ActionResult<AtmSnapshot> {
    let result = state.controller.submit_form().await;
    respond(&state, result).await
}

/// POST /atm/back
pub async fn back(State(state): State<AppState>) -> ActionResult<AtmSnapshot> {
    let result = state.controller.back().await;
    respond(&state, result).await
}

/// POST /atm/close
pub async fn close(State(state): State<AppState>) -> ActionResult<AtmSnapshot> {
    let result = state.controller.close().await;
    respond(&state, result).await
}
