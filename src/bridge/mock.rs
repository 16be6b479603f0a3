use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::{HostBridge, actions};
use crate::models::{Account, AtmData, Card};

const MAX_PIN_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
struct MockCard {
    account_id: i64,
    pin: String,
    blocked: bool,
    failed_attempts: u32,
}

#[derive(Debug, Default)]
struct MockState {
    cards: BTreeMap<i64, MockCard>,
    accounts: BTreeMap<i64, Account>,
    calls: Vec<(String, Value)>,
    failing: HashSet<String>,
}

/// In-memory stand-in for the host authority, used in development mode and
/// in tests. Records every call it receives.
#[derive(Debug, Default)]
pub struct MockHostBridge {
    state: Mutex<MockState>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PinPayload {
    pin: String,
    card_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmountPayload {
    account_id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferPayload {
    from_account_id: i64,
    to_account_id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockPayload {
    card_id: i64,
    block: bool,
}

impl MockHostBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two accounts, one usable card and one blocked card.
    pub fn demo(pin: &str) -> Self {
        Self::new()
            .with_account(1, "Cuenta principal", Decimal::new(10000, 2))
            .with_account(2, "Ahorros", Decimal::new(250000, 2))
            .with_card(1, 1, pin, false)
            .with_card(2, 2, pin, true)
    }

    pub fn with_account(self, id: i64, name: &str, balance: Decimal) -> Self {
        self.lock().accounts.insert(
            id,
            Account {
                id,
                account_name: name.to_string(),
                balance,
            },
        );
        self
    }

    pub fn with_card(self, id: i64, account_id: i64, pin: &str, blocked: bool) -> Self {
        self.lock().cards.insert(
            id,
            MockCard {
                account_id,
                pin: pin.to_string(),
                blocked,
                failed_attempts: 0,
            },
        );
        self
    }

    /// Make every call to `action` fail as a transport fault.
    pub fn failing(self, action: &str) -> Self {
        self.lock().failing.insert(action.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, action: &str) -> Vec<Value> {
        self.lock()
            .calls
            .iter()
            .filter(|(name, _)| name == action)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn account(&self, id: i64) -> Option<Account> {
        self.lock().accounts.get(&id).cloned()
    }

    /// Session data as the host would push it on `openATM`.
    pub fn atm_data(&self) -> AtmData {
        let state = self.lock();
        let cards = state
            .cards
            .iter()
            .map(|(id, card)| Card {
                id: *id,
                account_id: card.account_id,
                account_name: state
                    .accounts
                    .get(&card.account_id)
                    .map(|a| a.account_name.clone())
                    .unwrap_or_default(),
                card_number: format!("4000{:012}", id),
                is_blocked: card.blocked,
            })
            .collect();

        AtmData {
            cards,
            accounts: state.accounts.values().cloned().collect(),
            cash: Decimal::new(50000, 2),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // a panicking test must not poison every later assertion
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MockState {
    fn verify_pin(&mut self, payload: PinPayload) -> Value {
        let Some(card) = self.cards.get_mut(&payload.card_id) else {
            return json!({"success": false, "error": "Tarjeta no encontrada"});
        };
        if card.blocked {
            return json!({"success": false, "error": "Tarjeta bloqueada"});
        }
        if card.pin != payload.pin {
            card.failed_attempts += 1;
            if card.failed_attempts >= MAX_PIN_ATTEMPTS {
                card.blocked = true;
                return json!({"success": false, "error": "Tarjeta bloqueada por demasiados intentos"});
            }
            return json!({"success": false, "error": "PIN incorrecto"});
        }

        card.failed_attempts = 0;
        let account_id = card.account_id;
        match self.accounts.get(&account_id) {
            Some(account) => json!({"success": true, "accountData": {"account": account}}),
            None => json!({"success": false, "error": "Cuenta no encontrada"}),
        }
    }

    fn adjust(&mut self, account_id: i64, delta: Decimal) -> Value {
        let Some(account) = self.accounts.get_mut(&account_id) else {
            return json!({"success": false, "error": "Cuenta no encontrada"});
        };
        let Some(balance) = account.balance.checked_add(delta) else {
            return json!({"success": false, "error": "Cantidad inválida"});
        };
        if balance < Decimal::ZERO {
            return json!({"success": false, "error": "Fondos insuficientes"});
        }
        account.balance = balance;
        json!({"success": true})
    }

    fn transfer(&mut self, payload: TransferPayload) -> Value {
        let Some(target) = self.accounts.get(&payload.to_account_id) else {
            return json!({"success": false, "error": "Cuenta destino no encontrada"});
        };
        if target.balance.checked_add(payload.amount).is_none() {
            return json!({"success": false, "error": "Cantidad inválida"});
        }
        let debit = self.adjust(payload.from_account_id, -payload.amount);
        if debit["success"] != json!(true) {
            return debit;
        }
        self.adjust(payload.to_account_id, payload.amount)
    }
}

#[async_trait]
impl HostBridge for MockHostBridge {
    async fn send(&self, action: &str, payload: Value) -> Result<Value> {
        let mut state = self.lock();
        state.calls.push((action.to_string(), payload.clone()));

        if state.failing.contains(action) {
            return Err(anyhow!("connection refused: {}", action));
        }

        let response = match action {
            actions::VERIFY_PIN => state.verify_pin(serde_json::from_value(payload)?),
            actions::DEPOSIT => {
                let p: AmountPayload = serde_json::from_value(payload)?;
                state.adjust(p.account_id, p.amount)
            }
            actions::WITHDRAW => {
                let p: AmountPayload = serde_json::from_value(payload)?;
                state.adjust(p.account_id, -p.amount)
            }
            actions::TRANSFER => state.transfer(serde_json::from_value(payload)?),
            actions::TOGGLE_CARD_BLOCK => {
                let p: BlockPayload = serde_json::from_value(payload)?;
                match state.cards.get_mut(&p.card_id) {
                    Some(card) => {
                        card.blocked = p.block;
                        card.failed_attempts = 0;
                        json!({"success": true})
                    }
                    None => json!({"success": false, "error": "Tarjeta no encontrada"}),
                }
            }
            _ => json!({}),
        };

        Ok(response)
    }
}
