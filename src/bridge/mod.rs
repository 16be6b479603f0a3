use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    models::{
        AccountAmountRequest, Ack, ToggleCardBlockRequest, TransferRequest, VerifyPinRequest,
        VerifyPinResponse,
    },
    session::Mutation,
};

pub mod http;
pub mod mock;
pub mod outbox;

pub use http::HttpHostBridge;
pub use mock::MockHostBridge;
pub use outbox::{Outbound, Outbox};

/// Action names understood by the host resource.
pub mod actions {
    pub const VERIFY_PIN: &str = "atmVerifyPin";
    pub const DEPOSIT: &str = "atmDeposit";
    pub const WITHDRAW: &str = "atmWithdraw";
    pub const TRANSFER: &str = "atmTransfer";
    pub const CLOSE_ATM: &str = "closeATM";
    pub const TOGGLE_CARD_BLOCK: &str = "toggleCardBlock";
}

/// Outbound side of the NUI bridge: request/response calls into the host.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// Send `payload` under `action`. Empty or unparsable response bodies
    /// resolve to `{}`; only transport faults are errors.
    async fn send(&self, action: &str, payload: Value) -> Result<Value>;

    async fn verify_pin(&self, pin: &str, card_id: i64, account_id: i64) -> Result<VerifyPinResponse> {
        let payload = serde_json::to_value(VerifyPinRequest { pin, card_id, account_id })?;
        let body = self.send(actions::VERIFY_PIN, payload).await?;
        serde_json::from_value(body).context("malformed atmVerifyPin response")
    }

    /// The response is not inspected; the balance was already updated locally.
    async fn dispatch(&self, mutation: &Mutation) -> Result<()> {
        let payload = match *mutation {
            Mutation::Deposit { account_id, amount } | Mutation::Withdraw { account_id, amount } => {
                serde_json::to_value(AccountAmountRequest { account_id, amount })?
            }
            Mutation::Transfer { from_account_id, to_account_id, amount } => {
                serde_json::to_value(TransferRequest { from_account_id, to_account_id, amount })?
            }
        };
        self.send(mutation.action(), payload).await?;
        Ok(())
    }

    async fn close_atm(&self) -> Result<()> {
        self.send(actions::CLOSE_ATM, json!({})).await?;
        Ok(())
    }

    async fn toggle_card_block(&self, card_id: i64, block: bool) -> Result<Ack> {
        let payload = serde_json::to_value(ToggleCardBlockRequest { card_id, block })?;
        let body = self.send(actions::TOGGLE_CARD_BLOCK, payload).await?;
        serde_json::from_value(body).context("malformed toggleCardBlock response")
    }
}
