use axum::{Json, extract::State};
use serde::Deserialize;

use super::{ActionResult, error_response};
use crate::{
    app_state::AppState,
    controller::Key,
    models::NuiMessage,
    session::AtmSnapshot,
};

#[derive(Debug, Deserialize)]
pub struct KeyEvent {
    key: String,
}

/// POST /nui/message
/// Inbound push from the host (`openATM`, `closeATM`, `updateATMData`)
pub async fn message(
    State(state): State<AppState>,
    Json(message): Json<NuiMessage>,
) -> Json<AtmSnapshot> {
    state.controller.handle_message(message).await;
    Json(state.controller.snapshot().await)
}

/// POST /nui/keydown
/// Physical keyboard: Escape closes the ATM, digits/Backspace/Enter drive PIN entry
pub async fn keydown(
    State(state): State<AppState>,
    Json(event): Json<KeyEvent>,
) -> ActionResult<AtmSnapshot> {
    state
        .controller
        .press_key(Key::from_keyboard(&event.key))
        .await
        .map_err(|err| error_response(&err))?;

    Ok(Json(state.controller.snapshot().await))
}
