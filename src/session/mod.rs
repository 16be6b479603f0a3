use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::models::{Account, AtmData, Card};

pub mod balance;
pub mod error;
pub mod mutation;
pub mod snapshot;
pub mod timers;

pub use balance::{DisplayedBalance, SelectedAccount};
pub use error::AtmError;
pub use mutation::Mutation;
pub use snapshot::AtmSnapshot;
pub use timers::SessionTimers;

pub const PIN_LENGTH: usize = 4;

/// Authority messages containing this marker mean the card got blocked.
const BLOCKED_MARKER: &str = "bloqueada";
const DEFAULT_PIN_REJECTION: &str = "PIN incorrecto";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum View {
    CardSelection,
    AccountSelection,
    PinEntry,
    Loading(LoadingReason),
    Menu,
    Deposit,
    Withdraw,
    Transfer,
}

impl View {
    pub fn is_form(self) -> bool {
        matches!(self, View::Deposit | View::Withdraw | View::Transfer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadingReason {
    Pin,
    Account,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Deposit,
    Withdraw,
    Transfer,
}

impl FormKind {
    pub fn view(self) -> View {
        match self {
            FormKind::Deposit => View::Deposit,
            FormKind::Withdraw => View::Withdraw,
            FormKind::Transfer => View::Transfer,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "deposit" => Some(FormKind::Deposit),
            "withdraw" => Some(FormKind::Withdraw),
            "transfer" => Some(FormKind::Transfer),
            _ => None,
        }
    }
}

/// Everything needed to run one PIN verification and to recognise its result
/// as stale once it comes back.
#[derive(Debug, Clone, PartialEq)]
pub struct PinRequest {
    pub session_id: u64,
    pub epoch: u64,
    pub pin: String,
    pub card_id: i64,
    pub account_id: i64,
}

/// What a rejected PIN means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Retry,
    CardBlocked,
}

/// One ATM interaction, from `openATM` until close.
#[derive(Debug)]
pub struct Session {
    pub id: u64,
    /// Bumped whenever the bound card/account changes; async results and
    /// timers carrying an older epoch are discarded.
    pub epoch: u64,
    pub require_pin: bool,
    pub view: View,
    pub cards: Vec<Card>,
    pub accounts: Vec<Account>,
    pub cash: Decimal,
    pub selected_card: Option<Card>,
    pub selected_account: Option<SelectedAccount>,
    pub pin: String,
    pub amount: String,
    pub target_account_id: String,
    pub error: Option<String>,
    pub verifying: bool,
    pub timers: SessionTimers,
}

impl Session {
    pub fn open(id: u64, data: AtmData, require_pin: bool) -> Self {
        let view = if require_pin {
            View::CardSelection
        } else {
            View::AccountSelection
        };

        Self {
            id,
            epoch: 0,
            require_pin,
            view,
            cards: data.cards,
            accounts: data.accounts,
            cash: data.cash,
            selected_card: None,
            selected_account: None,
            pin: String::new(),
            amount: String::new(),
            target_account_id: String::new(),
            error: None,
            verifying: false,
            timers: SessionTimers::default(),
        }
    }

    fn expect_view(&self, expected: &'static str, allowed: impl Fn(View) -> bool) -> Result<(), AtmError> {
        if allowed(self.view) {
            Ok(())
        } else {
            Err(AtmError::WrongView { expected, actual: self.view })
        }
    }

    fn transition(&mut self, view: View) {
        debug!(session = self.id, from = ?self.view, to = ?view, "ATM view transition");
        self.view = view;
    }

    fn bump_epoch(&mut self) {
        self.epoch += 1;
        self.verifying = false;
        self.timers.cancel_dwell();
    }

    fn clear_form(&mut self) {
        self.amount.clear();
        self.target_account_id.clear();
    }

    fn fail<T>(&mut self, err: AtmError) -> Result<T, AtmError> {
        self.error = Some(err.to_string());
        Err(err)
    }

    pub fn select_card(&mut self, card_id: i64) -> Result<(), AtmError> {
        self.expect_view("cardSelection", |v| v == View::CardSelection)?;

        let card = self
            .cards
            .iter()
            .find(|card| card.id == card_id)
            .cloned()
            .ok_or(AtmError::UnknownCard(card_id))?;

        if card.is_blocked {
            return self.fail(AtmError::CardBlocked);
        }

        self.bump_epoch();
        self.selected_card = Some(card);
        self.selected_account = None;
        self.pin.clear();
        self.error = None;
        self.transition(View::PinEntry);
        Ok(())
    }

    /// Direct account selection when no PIN is required. The caller schedules
    /// the loading dwell that leads to the menu.
    pub fn select_account(&mut self, account_id: i64) -> Result<(), AtmError> {
        self.expect_view("accountSelection", |v| v == View::AccountSelection)?;

        let account = self
            .accounts
            .iter()
            .find(|account| account.id == account_id)
            .cloned()
            .ok_or(AtmError::UnknownAccount(account_id))?;

        self.bump_epoch();
        self.selected_account = Some(account.into());
        self.error = None;
        self.transition(View::Loading(LoadingReason::Account));
        Ok(())
    }

    /// Returns whether the buffer changed. Input is ignored outside PIN entry
    /// and while a verification is in flight.
    pub fn push_digit(&mut self, digit: char) -> bool {
        if self.view != View::PinEntry || self.verifying || !digit.is_ascii_digit() {
            return false;
        }
        if self.pin.len() >= PIN_LENGTH {
            return false;
        }
        self.pin.push(digit);
        true
    }

    pub fn pop_digit(&mut self) -> bool {
        if self.view != View::PinEntry || self.verifying {
            return false;
        }
        self.pin.pop().is_some()
    }

    /// Local precondition checks for PIN submission. On success the PIN input
    /// is locked until [`Session::accept_pin`], [`Session::reject_pin`] or
    /// [`Session::verification_failed`] runs.
    pub fn begin_verification(&mut self) -> Result<PinRequest, AtmError> {
        self.expect_view("pinEntry", |v| v == View::PinEntry)?;
        if self.verifying {
            return Err(AtmError::VerificationInFlight);
        }
        if self.pin.len() != PIN_LENGTH {
            return self.fail(AtmError::InvalidPinFormat);
        }
        let Some(card) = self.selected_card.as_ref() else {
            return self.fail(AtmError::NoCardSelected);
        };

        let request = PinRequest {
            session_id: self.id,
            epoch: self.epoch,
            pin: self.pin.clone(),
            card_id: card.id,
            account_id: card.account_id,
        };

        self.verifying = true;
        self.error = None;
        Ok(request)
    }

    pub fn is_current(&self, request: &PinRequest) -> bool {
        self.id == request.session_id && self.epoch == request.epoch && self.view == View::PinEntry
    }

    /// Successful verification. The authority's account replaces the selected
    /// account when present; otherwise the card's account is looked up in the
    /// session data.
    pub fn accept_pin(&mut self, account: Option<Account>) {
        self.verifying = false;
        self.error = None;
        self.pin.clear();

        let account = account.or_else(|| {
            let account_id = self.selected_card.as_ref()?.account_id;
            self.accounts.iter().find(|a| a.id == account_id).cloned()
        });
        if let Some(account) = account {
            self.selected_account = Some(account.into());
        }

        self.transition(View::Loading(LoadingReason::Pin));
    }

    pub fn reject_pin(&mut self, message: Option<String>) -> Rejection {
        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_PIN_REJECTION.to_string());

        self.verifying = false;
        self.pin.clear();

        let rejection = if message.to_lowercase().contains(BLOCKED_MARKER) {
            Rejection::CardBlocked
        } else {
            Rejection::Retry
        };
        self.error = Some(message);
        rejection
    }

    pub fn verification_failed(&mut self) {
        self.verifying = false;
        self.error = Some(AtmError::Verification.to_string());
    }

    /// End of the loading dwell. Returns whether the menu was entered.
    pub fn finish_loading(&mut self) -> bool {
        if matches!(self.view, View::Loading(_)) {
            self.transition(View::Menu);
            true
        } else {
            false
        }
    }

    pub fn open_form(&mut self, kind: FormKind) -> Result<(), AtmError> {
        self.expect_view("menu", |v| v == View::Menu)?;
        self.clear_form();
        self.error = None;
        self.transition(kind.view());
        Ok(())
    }

    pub fn update_form(&mut self, amount: Option<String>, target: Option<String>) -> Result<(), AtmError> {
        self.expect_view("a form", View::is_form)?;
        if let Some(amount) = amount {
            self.amount = amount;
        }
        if let Some(target) = target {
            self.target_account_id = target;
        }
        Ok(())
    }

    pub fn back(&mut self) {
        match self.view {
            View::PinEntry => {
                self.bump_epoch();
                self.pin.clear();
                self.error = None;
                self.selected_card = None;
                self.transition(View::CardSelection);
            }
            View::Menu => {
                self.bump_epoch();
                self.error = None;
                self.selected_account = None;
                if self.require_pin {
                    self.selected_card = None;
                    self.transition(View::CardSelection);
                } else {
                    self.transition(View::AccountSelection);
                }
            }
            View::Deposit | View::Withdraw | View::Transfer => {
                self.clear_form();
                self.error = None;
                self.transition(View::Menu);
            }
            View::CardSelection | View::AccountSelection | View::Loading(_) => {}
        }
    }

    /// Validate the active form and apply the optimistic balance update.
    /// Nothing changes when validation fails.
    pub fn prepare_mutation(&mut self) -> Result<Mutation, AtmError> {
        self.expect_view("a form", View::is_form)?;
        let Some(account_id) = self.selected_account.as_ref().map(|a| a.id) else {
            return self.fail(AtmError::NoAccountSelected);
        };

        let amount = match mutation::parse_amount(&self.amount) {
            Ok(amount) => amount,
            Err(err) => return self.fail(err),
        };

        let mutation = match self.view {
            View::Deposit => Mutation::Deposit { account_id, amount },
            View::Withdraw => Mutation::Withdraw { account_id, amount },
            _ => {
                let to_account_id = match mutation::parse_target_account(&self.target_account_id) {
                    Ok(id) => id,
                    Err(err) => return self.fail(err),
                };
                Mutation::Transfer {
                    from_account_id: account_id,
                    to_account_id,
                    amount,
                }
            }
        };

        if let Some(selected) = self.selected_account.as_mut() {
            if let Err(err) = selected.balance.apply(mutation.delta()) {
                return self.fail(err);
            }
        }
        self.clear_form();
        self.error = None;
        self.transition(View::Menu);
        Ok(mutation)
    }

    /// Authoritative refresh pushed by the host.
    pub fn apply_update(&mut self, data: AtmData) {
        self.cards = data.cards;
        self.cash = data.cash;

        if let Some(selected) = self.selected_card.as_mut() {
            if let Some(fresh) = self.cards.iter().find(|card| card.id == selected.id) {
                *selected = fresh.clone();
            }
        }

        if data.accounts.is_empty() {
            return;
        }
        self.accounts = data.accounts;
        if let Some(selected) = self.selected_account.as_mut() {
            if let Some(fresh) = self.accounts.iter().find(|account| account.id == selected.id) {
                selected.reconcile(fresh);
            }
        }
    }

    /// Block state a toggle would request. Only offered on card selection.
    pub fn block_toggle(&self, card_id: i64) -> Result<bool, AtmError> {
        self.expect_view("cardSelection", |v| v == View::CardSelection)?;
        let card = self.card(card_id).ok_or(AtmError::UnknownCard(card_id))?;
        Ok(!card.is_blocked)
    }

    /// Flip the local blocked flag after the host accepted a block toggle.
    pub fn set_card_blocked(&mut self, card_id: i64, blocked: bool) -> Result<(), AtmError> {
        let card = self
            .cards
            .iter_mut()
            .find(|card| card.id == card_id)
            .ok_or(AtmError::UnknownCard(card_id))?;
        card.is_blocked = blocked;
        if let Some(selected) = self.selected_card.as_mut().filter(|card| card.id == card_id) {
            selected.is_blocked = blocked;
        }
        Ok(())
    }

    pub fn card(&self, card_id: i64) -> Option<&Card> {
        self.cards.iter().find(|card| card.id == card_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn card(id: i64, account_id: i64, blocked: bool) -> Card {
        Card {
            id,
            account_id,
            account_name: format!("A{}", account_id),
            card_number: format!("400012345678901{}", id),
            is_blocked: blocked,
        }
    }

    fn account(id: i64, balance: &str) -> Account {
        Account {
            id,
            account_name: format!("A{}", id),
            balance: dec(balance),
        }
    }

    fn data() -> AtmData {
        AtmData {
            cards: vec![card(1, 1, false), card(2, 1, true)],
            accounts: vec![account(1, "100.00"), account(2, "5.00")],
            cash: dec("50"),
        }
    }

    fn at_pin_entry() -> Session {
        let mut session = Session::open(1, data(), true);
        session.select_card(1).unwrap();
        session
    }

    fn at_menu() -> Session {
        let mut session = at_pin_entry();
        for d in "1234".chars() {
            session.push_digit(d);
        }
        session.begin_verification().unwrap();
        session.accept_pin(Some(account(1, "100.00")));
        assert!(session.finish_loading());
        session
    }

    #[test]
    fn test_initial_view_depends_on_require_pin() {
        assert_eq!(Session::open(1, data(), true).view, View::CardSelection);
        assert_eq!(Session::open(1, data(), false).view, View::AccountSelection);
        assert_eq!(Session::open(1, AtmData::default(), true).view, View::CardSelection);
    }

    #[test]
    fn test_blocked_card_never_leaves_card_selection() {
        let mut session = Session::open(1, data(), true);
        let epoch = session.epoch;

        assert!(matches!(session.select_card(2), Err(AtmError::CardBlocked)));
        assert_eq!(session.view, View::CardSelection);
        assert!(session.selected_card.is_none());
        assert_eq!(session.epoch, epoch);
        assert!(session.error.as_deref().unwrap().contains("bloqueada"));
    }

    #[test]
    fn test_unknown_card_is_rejected() {
        let mut session = Session::open(1, data(), true);
        assert!(matches!(session.select_card(99), Err(AtmError::UnknownCard(99))));
        assert_eq!(session.view, View::CardSelection);
    }

    #[test]
    fn test_pin_buffer_caps_at_four_digits() {
        let mut session = at_pin_entry();
        for d in "123456".chars() {
            session.push_digit(d);
        }
        assert_eq!(session.pin, "1234");
        assert!(!session.push_digit('x'));
        assert!(session.pop_digit());
        assert_eq!(session.pin, "123");
    }

    #[test]
    fn test_short_pin_fails_locally() {
        for len in 0..PIN_LENGTH {
            let mut session = at_pin_entry();
            for _ in 0..len {
                session.push_digit('7');
            }
            assert!(matches!(session.begin_verification(), Err(AtmError::InvalidPinFormat)));
            assert!(!session.verifying);
            assert_eq!(session.error.as_deref(), Some("El PIN debe tener 4 dígitos"));
            assert_eq!(session.view, View::PinEntry);
        }
    }

    #[test]
    fn test_input_locked_while_verifying() {
        let mut session = at_pin_entry();
        for d in "1234".chars() {
            session.push_digit(d);
        }
        let request = session.begin_verification().unwrap();
        assert_eq!(request.card_id, 1);
        assert_eq!(request.account_id, 1);
        assert_eq!(request.pin, "1234");

        assert!(!session.pop_digit());
        assert!(matches!(session.begin_verification(), Err(AtmError::VerificationInFlight)));
        assert_eq!(session.pin, "1234");
    }

    #[test]
    fn test_reject_pin_clears_buffer_and_detects_blocked_card() {
        let mut session = at_pin_entry();
        for d in "0000".chars() {
            session.push_digit(d);
        }
        session.begin_verification().unwrap();
        assert_eq!(session.reject_pin(Some("PIN incorrecto".to_string())), Rejection::Retry);
        assert_eq!(session.pin, "");
        assert_eq!(session.view, View::PinEntry);
        assert!(!session.verifying);

        assert_eq!(
            session.reject_pin(Some("Tarjeta BLOQUEADA por intentos".to_string())),
            Rejection::CardBlocked
        );
        assert_eq!(session.reject_pin(None), Rejection::Retry);
        assert_eq!(session.error.as_deref(), Some("PIN incorrecto"));
    }

    #[test]
    fn test_accept_pin_falls_back_to_session_account() {
        let mut session = at_pin_entry();
        for d in "1234".chars() {
            session.push_digit(d);
        }
        session.begin_verification().unwrap();
        session.accept_pin(None);
        assert_eq!(session.view, View::Loading(LoadingReason::Pin));
        assert_eq!(session.selected_account.as_ref().unwrap().id, 1);
    }

    #[test]
    fn test_back_navigation() {
        let mut session = at_pin_entry();
        session.push_digit('1');
        session.back();
        assert_eq!(session.view, View::CardSelection);
        assert!(session.selected_card.is_none());
        assert_eq!(session.pin, "");

        let mut session = at_menu();
        session.open_form(FormKind::Transfer).unwrap();
        session.update_form(Some("5".into()), Some("2".into())).unwrap();
        session.back();
        assert_eq!(session.view, View::Menu);
        assert_eq!(session.amount, "");
        assert_eq!(session.target_account_id, "");

        session.back();
        assert_eq!(session.view, View::CardSelection);
        assert!(session.selected_account.is_none());
        assert!(session.selected_card.is_none());

        let mut session = Session::open(1, data(), false);
        session.select_account(1).unwrap();
        session.finish_loading();
        session.back();
        assert_eq!(session.view, View::AccountSelection);
        assert!(session.selected_account.is_none());
    }

    #[test]
    fn test_deposit_and_withdraw_update_balance_optimistically() {
        let mut session = at_menu();
        session.open_form(FormKind::Deposit).unwrap();
        session.update_form(Some("25.50".into()), None).unwrap();
        let mutation = session.prepare_mutation().unwrap();
        assert_eq!(mutation, Mutation::Deposit { account_id: 1, amount: dec("25.50") });
        assert_eq!(session.view, View::Menu);
        assert_eq!(session.selected_account.as_ref().unwrap().balance.value(), dec("125.50"));

        session.open_form(FormKind::Withdraw).unwrap();
        session.update_form(Some("25.50".into()), None).unwrap();
        session.prepare_mutation().unwrap();
        let balance = &session.selected_account.as_ref().unwrap().balance;
        assert_eq!(balance.value(), dec("100.00"));
        assert!(balance.is_optimistic());
    }

    #[test]
    fn test_transfer_only_touches_source_account() {
        let mut session = at_menu();
        session.open_form(FormKind::Transfer).unwrap();
        session.update_form(Some("30".into()), Some("2".into())).unwrap();
        let mutation = session.prepare_mutation().unwrap();
        assert_eq!(
            mutation,
            Mutation::Transfer { from_account_id: 1, to_account_id: 2, amount: dec("30") }
        );
        assert_eq!(session.selected_account.as_ref().unwrap().balance.value(), dec("70.00"));
        assert_eq!(session.accounts[1].balance, dec("5.00"));
    }

    #[test]
    fn test_invalid_amounts_keep_form_open() {
        for input in ["0", "-5", "abc"] {
            let mut session = at_menu();
            session.open_form(FormKind::Withdraw).unwrap();
            session.update_form(Some(input.into()), None).unwrap();
            assert!(matches!(session.prepare_mutation(), Err(AtmError::InvalidAmount)));
            assert_eq!(session.view, View::Withdraw);
            assert_eq!(session.amount, input);
            assert_eq!(session.selected_account.as_ref().unwrap().balance.value(), dec("100.00"));
            assert!(session.error.is_some());
        }

        let mut session = at_menu();
        session.open_form(FormKind::Transfer).unwrap();
        session.update_form(Some("10".into()), Some("cuenta".into())).unwrap();
        assert!(matches!(session.prepare_mutation(), Err(AtmError::InvalidTargetAccount)));
        assert_eq!(session.view, View::Transfer);
        assert!(!session.selected_account.as_ref().unwrap().balance.is_optimistic());
    }

    #[test]
    fn test_overdraw_is_not_blocked_locally() {
        let mut session = at_menu();
        session.open_form(FormKind::Withdraw).unwrap();
        session.update_form(Some("150".into()), None).unwrap();
        session.prepare_mutation().unwrap();
        assert_eq!(session.selected_account.as_ref().unwrap().balance.value(), dec("-50.00"));
    }

    #[test]
    fn test_update_reconciles_selected_account() {
        let mut session = at_menu();
        session.open_form(FormKind::Withdraw).unwrap();
        session.update_form(Some("150".into()), None).unwrap();
        session.prepare_mutation().unwrap();

        // refresh without accounts keeps the optimistic figure
        session.apply_update(AtmData { cards: vec![card(1, 1, false)], accounts: vec![], cash: dec("20") });
        assert_eq!(session.cash, dec("20"));
        assert_eq!(session.accounts.len(), 2);
        assert!(session.selected_account.as_ref().unwrap().balance.is_optimistic());

        session.apply_update(AtmData {
            cards: vec![card(1, 1, false)],
            accounts: vec![account(1, "100.00")],
            cash: dec("20"),
        });
        let selected = session.selected_account.as_ref().unwrap();
        assert_eq!(selected.balance, DisplayedBalance::authoritative(dec("100.00")));
    }

    #[test]
    fn test_forms_require_menu() {
        let mut session = at_pin_entry();
        assert!(matches!(
            session.open_form(FormKind::Deposit),
            Err(AtmError::WrongView { expected: "menu", actual: View::PinEntry })
        ));
        assert!(matches!(session.prepare_mutation(), Err(AtmError::WrongView { .. })));
    }

    #[test]
    fn test_overflowing_deposit_is_rejected_without_side_effects() {
        let mut session = at_menu();
        session.open_form(FormKind::Deposit).unwrap();
        session.update_form(Some("79228162514264337593543950335".to_string()), None).unwrap();

        assert!(matches!(session.prepare_mutation(), Err(AtmError::InvalidAmount)));
        assert_eq!(session.view, View::Deposit);
        assert_eq!(session.amount, "79228162514264337593543950335");
        assert_eq!(session.error.as_deref(), Some("Introduce una cantidad válida"));
        let selected = session.selected_account.as_ref().unwrap();
        assert_eq!(selected.balance, DisplayedBalance::authoritative(dec("100.00")));
    }

    #[test]
    fn test_block_toggle_only_on_card_selection() {
        let mut session = Session::open(1, data(), true);
        assert!(session.block_toggle(1).unwrap());
        assert!(matches!(session.block_toggle(9), Err(AtmError::UnknownCard(9))));

        session.select_card(1).unwrap();
        assert!(matches!(
            session.block_toggle(1),
            Err(AtmError::WrongView { expected: "cardSelection", actual: View::PinEntry })
        ));

        session.set_card_blocked(1, true).unwrap();
        assert!(session.selected_card.as_ref().unwrap().is_blocked);
    }
}
