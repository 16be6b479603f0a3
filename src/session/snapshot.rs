use serde::Serialize;

use super::{DisplayedBalance, Session, View};
use crate::{
    format::{format_money, group_card_number, mask_card_number},
    models::{Account, Card},
};

/// Read-only view model rendered by the embedded UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtmSnapshot {
    pub visible: bool,
    pub view: Option<View>,
    pub require_pin: bool,
    /// "**** 9010" once a card is bound, otherwise the terminal label.
    pub header: String,
    pub cards: Vec<CardView>,
    pub accounts: Vec<AccountView>,
    pub selected_account: Option<SelectedAccountView>,
    pub cash: String,
    pub pin_length: usize,
    pub verifying: bool,
    pub error: Option<String>,
    pub amount: String,
    pub target_account_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub id: i64,
    pub account_id: i64,
    pub account_name: String,
    pub number: String,
    pub masked: String,
    pub blocked: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: i64,
    pub account_name: String,
    pub balance: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedAccountView {
    pub id: i64,
    pub account_name: String,
    pub balance: DisplayedBalance,
    pub formatted_balance: String,
}

const TERMINAL_LABEL: &str = "Terminal ATM";

impl From<&Card> for CardView {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            account_id: card.account_id,
            account_name: card.account_name.clone(),
            number: group_card_number(&card.card_number),
            masked: mask_card_number(&card.card_number),
            blocked: card.is_blocked,
        }
    }
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            account_name: account.account_name.clone(),
            balance: format_money(account.balance),
        }
    }
}

impl AtmSnapshot {
    pub fn hidden() -> Self {
        Self {
            visible: false,
            view: None,
            require_pin: false,
            header: TERMINAL_LABEL.to_string(),
            cards: Vec::new(),
            accounts: Vec::new(),
            selected_account: None,
            cash: format_money(Default::default()),
            pin_length: 0,
            verifying: false,
            error: None,
            amount: String::new(),
            target_account_id: String::new(),
        }
    }
}

impl From<&Session> for AtmSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            visible: true,
            view: Some(session.view),
            require_pin: session.require_pin,
            header: session
                .selected_card
                .as_ref()
                .map(|card| mask_card_number(&card.card_number))
                .unwrap_or_else(|| TERMINAL_LABEL.to_string()),
            cards: session.cards.iter().map(CardView::from).collect(),
            accounts: session.accounts.iter().map(AccountView::from).collect(),
            selected_account: session.selected_account.as_ref().map(|selected| SelectedAccountView {
                id: selected.id,
                account_name: selected.account_name.clone(),
                formatted_balance: format_money(selected.balance.value()),
                balance: selected.balance.clone(),
            }),
            cash: format_money(session.cash),
            // the PIN itself never leaves the controller
            pin_length: session.pin.len(),
            verifying: session.verifying,
            error: session.error.clone(),
            amount: session.amount.clone(),
            target_account_id: session.target_account_id.clone(),
        }
    }
}
