use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::HostBridge;
use crate::session::Mutation;

/// Fire-and-forget requests. Nobody awaits their outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Mutation(Mutation),
    CloseAtm,
}

/// Delivers outbound requests in submission order on a background task, so a
/// deposit followed by a withdrawal reaches the host in that order.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    pub fn spawn(bridge: Arc<dyn HostBridge>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                deliver(bridge.as_ref(), message).await;
            }
        });

        Self { tx }
    }

    pub fn push(&self, message: Outbound) {
        if let Err(err) = self.tx.send(message) {
            warn!(message = ?err.0, "host outbox closed, dropping request");
        }
    }
}

async fn deliver(bridge: &dyn HostBridge, message: Outbound) {
    let result = match &message {
        Outbound::Mutation(mutation) => {
            info!(action = mutation.action(), ?mutation, "dispatching balance mutation");
            bridge.dispatch(mutation).await
        }
        Outbound::CloseAtm => bridge.close_atm().await,
    };

    if let Err(err) = result {
        warn!(?message, error = %err, "host request failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{MockHostBridge, actions};
    use rust_decimal::Decimal;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_outbox_preserves_order() {
        let bridge = Arc::new(MockHostBridge::new().with_account(1, "A1", Decimal::from(100)));
        let outbox = Outbox::spawn(bridge.clone());

        outbox.push(Outbound::Mutation(Mutation::Deposit { account_id: 1, amount: Decimal::from(5) }));
        outbox.push(Outbound::Mutation(Mutation::Withdraw { account_id: 1, amount: Decimal::from(7) }));
        outbox.push(Outbound::CloseAtm);
        settle().await;

        let names: Vec<String> = bridge.calls().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec![actions::DEPOSIT, actions::WITHDRAW, actions::CLOSE_ATM]);
        assert_eq!(bridge.account(1).unwrap().balance, Decimal::from(98));
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_stop_delivery() {
        let bridge = Arc::new(MockHostBridge::new().failing(actions::DEPOSIT));
        let outbox = Outbox::spawn(bridge.clone());

        outbox.push(Outbound::Mutation(Mutation::Deposit { account_id: 1, amount: Decimal::ONE }));
        outbox.push(Outbound::CloseAtm);
        settle().await;

        assert_eq!(bridge.calls().len(), 2);
        assert_eq!(bridge.calls_to(actions::CLOSE_ATM).len(), 1);
    }
}
