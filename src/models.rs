use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub account_id: i64,
    #[serde(default)]
    pub account_name: String,
    pub card_number: String,
    #[serde(default, deserialize_with = "flag")]
    pub is_blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub account_name: String,
    /// Upstream sends balances as decimal strings ("100.00"); numbers are accepted too.
    pub balance: Decimal,
}

/// Session data pushed by the host on `openATM` and `updateATMData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtmData {
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub cash: Decimal,
}

/// Inbound push messages, `{action, ...payload}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action")]
pub enum NuiMessage {
    #[serde(rename = "openATM")]
    OpenAtm {
        #[serde(default)]
        data: AtmData,
        #[serde(default, rename = "requirePin")]
        require_pin: Option<bool>,
    },
    #[serde(rename = "closeATM")]
    CloseAtm,
    #[serde(rename = "updateATMData")]
    UpdateAtmData {
        #[serde(default)]
        data: AtmData,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyPinResponse {
    #[serde(default)]
    pub success: bool,
    pub error: Option<String>,
    #[serde(rename = "accountData")]
    pub account_data: Option<AccountData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountData {
    pub account: Option<Account>,
}

/// Generic `{success, error}` acknowledgement used by card management actions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    pub success: Option<bool>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPinRequest<'a> {
    pub pin: &'a str,
    pub card_id: i64,
    pub account_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAmountRequest {
    pub account_id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_account_id: i64,
    pub to_account_id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleCardBlockRequest {
    pub card_id: i64,
    pub block: bool,
}

/// The host stores flags as booleans or as 0/1 integers depending on the driver.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Null(()),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value != 0,
        Flag::Null(()) => false,
    })
}
