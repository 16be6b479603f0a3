use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    bridge::{HostBridge, Outbound, Outbox},
    models::{AtmData, NuiMessage},
    session::{AtmError, AtmSnapshot, FormKind, PinRequest, Rejection, Session, View},
};

/// Fixed UI delays.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Minimum time the loading screen stays up before the menu.
    pub loading_dwell: Duration,
    /// Delay before the ATM closes itself after a blocked-card rejection.
    pub blocked_close_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            loading_dwell: Duration::from_millis(1200),
            blocked_close_delay: Duration::from_millis(2000),
        }
    }
}

/// A key from the physical keyboard or the on-screen keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Digit(char),
    Backspace,
    Enter,
    Escape,
    Other,
}

impl Key {
    /// `KeyboardEvent.key` names from the physical keyboard.
    pub fn from_keyboard(key: &str) -> Self {
        match key {
            "Backspace" => Key::Backspace,
            "Enter" => Key::Enter,
            "Escape" => Key::Escape,
            _ => Self::digit(key),
        }
    }

    /// Labels of the on-screen PIN pad. It has no escape key.
    pub fn from_keypad(key: &str) -> Self {
        match key {
            "back" | "←" => Key::Backspace,
            "ok" | "✓" => Key::Enter,
            _ => Self::digit(key),
        }
    }

    fn digit(key: &str) -> Self {
        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_digit() => Key::Digit(c),
            _ => Key::Other,
        }
    }
}

/// Owns the single ATM session and everything that mutates it.
#[derive(Clone)]
pub struct AtmController {
    session: Arc<Mutex<Option<Session>>>,
    bridge: Arc<dyn HostBridge>,
    outbox: Outbox,
    timing: Timing,
    next_id: Arc<AtomicU64>,
}

impl AtmController {
    pub fn new(bridge: Arc<dyn HostBridge>, timing: Timing) -> Self {
        Self {
            session: Arc::new(Mutex::new(None)),
            outbox: Outbox::spawn(bridge.clone()),
            bridge,
            timing,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub async fn snapshot(&self) -> AtmSnapshot {
        match self.session.lock().await.as_ref() {
            Some(session) => AtmSnapshot::from(session),
            None => AtmSnapshot::hidden(),
        }
    }

    pub async fn is_visible(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Inbound push from the host.
    pub async fn handle_message(&self, message: NuiMessage) {
        match message {
            NuiMessage::OpenAtm { data, require_pin } => self.open(data, require_pin.unwrap_or(false)).await,
            NuiMessage::CloseAtm => self.hide().await,
            NuiMessage::UpdateAtmData { data } => self.update(data).await,
            NuiMessage::Unknown => debug!("ignoring unrelated NUI message"),
        }
    }

    pub async fn open(&self, data: AtmData, require_pin: bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(session = id, require_pin, cards = data.cards.len(), "ATM session opened");
        // replacing a previous session drops it and aborts its timers
        *self.session.lock().await = Some(Session::open(id, data, require_pin));
    }

    /// Host-initiated close; the host already knows.
    pub async fn hide(&self) {
        if let Some(session) = self.session.lock().await.take() {
            info!(session = session.id, "ATM session closed by host");
        }
    }

    pub async fn update(&self, data: AtmData) {
        match self.session.lock().await.as_mut() {
            Some(session) => session.apply_update(data),
            None => debug!("ignoring ATM data update while hidden"),
        }
    }

    /// Explicit close from any state: tear down and tell the host.
    pub async fn close(&self) -> Result<(), AtmError> {
        let session = self.session.lock().await.take().ok_or(AtmError::NoSession)?;
        info!(session = session.id, "ATM session closed");
        self.outbox.push(Outbound::CloseAtm);
        Ok(())
    }

    async fn with_session<T>(&self, f: impl FnOnce(&mut Session) -> Result<T, AtmError>) -> Result<T, AtmError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(AtmError::NoSession)?;
        f(session)
    }

    pub async fn select_card(&self, card_id: i64) -> Result<(), AtmError> {
        self.with_session(|session| session.select_card(card_id)).await
    }

    pub async fn select_account(&self, account_id: i64) -> Result<(), AtmError> {
        self.with_session(|session| {
            session.select_account(account_id)?;
            self.schedule_loading(session);
            Ok(())
        })
        .await
    }

    /// Keyboard contract: Escape closes a visible session; digits, Backspace
    /// and Enter drive PIN entry and are ignored anywhere else.
    pub async fn press_key(&self, key: Key) -> Result<(), AtmError> {
        if key == Key::Escape {
            return match self.close().await {
                Err(AtmError::NoSession) => Ok(()),
                other => other,
            };
        }

        let submit = self
            .with_session(|session| {
                if session.view != View::PinEntry || session.verifying {
                    return Ok(false);
                }
                match key {
                    Key::Digit(digit) => {
                        session.push_digit(digit);
                        Ok(false)
                    }
                    Key::Backspace => {
                        session.pop_digit();
                        Ok(false)
                    }
                    Key::Enter => Ok(true),
                    Key::Escape | Key::Other => Ok(false),
                }
            })
            .await?;

        if submit { self.submit_pin().await } else { Ok(()) }
    }

    /// PIN verification gateway. The session lock is released while the host
    /// is consulted; a result that arrives after the user moved on is dropped.
    pub async fn submit_pin(&self) -> Result<(), AtmError> {
        let request = self.with_session(Session::begin_verification).await?;
        debug!(session = request.session_id, card = request.card_id, "verifying PIN");

        let outcome = self
            .bridge
            .verify_pin(&request.pin, request.card_id, request.account_id)
            .await;

        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut().filter(|session| session.is_current(&request)) else {
            debug!(session = request.session_id, "discarding stale PIN verification result");
            return Ok(());
        };

        match outcome {
            Err(err) => {
                warn!(error = %err, "PIN verification request failed");
                session.verification_failed();
                Err(AtmError::Verification)
            }
            Ok(response) if response.success && response.account_data.is_some() => {
                let account = response.account_data.and_then(|data| data.account);
                session.accept_pin(account);
                self.schedule_loading(session);
                Ok(())
            }
            Ok(response) => {
                let rejection = session.reject_pin(response.error);
                if rejection == Rejection::CardBlocked {
                    self.schedule_blocked_close(session, &request);
                }
                Err(AtmError::Authority(session.error.clone().unwrap_or_default()))
            }
        }
    }

    pub async fn open_form(&self, kind: FormKind) -> Result<(), AtmError> {
        self.with_session(|session| session.open_form(kind)).await
    }

    pub async fn update_form(&self, amount: Option<String>, target: Option<String>) -> Result<(), AtmError> {
        self.with_session(|session| session.update_form(amount, target)).await
    }

    pub async fn back(&self) -> Result<(), AtmError> {
        self.with_session(|session| {
            session.back();
            Ok(())
        })
        .await
    }

    /// Balance mutation dispatcher: validate, update the displayed balance,
    /// hand the request to the outbox and return to the menu.
    pub async fn submit_form(&self) -> Result<(), AtmError> {
        let mutation = self.with_session(Session::prepare_mutation).await?;
        self.outbox.push(Outbound::Mutation(mutation));
        Ok(())
    }

    pub async fn toggle_card_block(&self, card_id: i64) -> Result<(), AtmError> {
        let (session_id, block) = self
            .with_session(|session| Ok((session.id, session.block_toggle(card_id)?)))
            .await?;

        let ack = self
            .bridge
            .toggle_card_block(card_id, block)
            .await
            .map_err(|source| AtmError::Host { source })?;

        if ack.success == Some(false) {
            return Err(AtmError::Authority(ack.error.unwrap_or_default()));
        }

        let mut guard = self.session.lock().await;
        match guard.as_mut().filter(|session| session.id == session_id) {
            Some(session) => session.set_card_blocked(card_id, block),
            None => Ok(()),
        }
    }

    fn schedule_loading(&self, session: &mut Session) {
        let (id, epoch) = (session.id, session.epoch);
        let dwell = self.timing.loading_dwell;
        let shared = self.session.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(dwell).await;
            let mut guard = shared.lock().await;
            if let Some(session) = guard.as_mut().filter(|s| s.id == id && s.epoch == epoch) {
                session.finish_loading();
            }
        });
        session.timers.set_dwell(handle);
    }

    /// At most one pending close per session, however often the card is
    /// reported blocked.
    fn schedule_blocked_close(&self, session: &mut Session, request: &PinRequest) {
        if session.timers.close_pending() {
            debug!(session = session.id, "blocked-card close already scheduled");
            return;
        }

        info!(session = session.id, card = request.card_id, "card blocked, closing ATM");
        let id = session.id;
        let delay = self.timing.blocked_close_delay;
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut guard = controller.session.lock().await;
            if let Some(mut session) = guard.take_if(|s| s.id == id) {
                session.timers.detach_close();
                drop(guard);
                controller.outbox.push(Outbound::CloseAtm);
                info!(session = id, "ATM session closed after blocked card");
            }
        });
        session.timers.set_close(handle);
    }
}
