use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::AtmError;
use crate::models::Account;

/// Balance shown for the selected account.
///
/// Mutations are dispatched without waiting for the host, so the figure drifts
/// into `Optimistic` until the next authoritative push overwrites it through
/// [`DisplayedBalance::reconcile`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DisplayedBalance {
    Authoritative {
        value: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    Optimistic {
        value: Decimal,
        /// Last value the host confirmed.
        authoritative: Decimal,
        /// Mutations applied locally since then.
        pending: u32,
        since: DateTime<Utc>,
    },
}

impl DisplayedBalance {
    pub fn authoritative(value: Decimal) -> Self {
        Self::Authoritative { value }
    }

    pub fn value(&self) -> Decimal {
        match self {
            Self::Authoritative { value } | Self::Optimistic { value, .. } => *value,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, Self::Optimistic { .. })
    }

    /// Apply a signed delta locally, without confirmation from the host.
    /// A delta the displayed value cannot represent leaves it untouched.
    pub fn apply(&mut self, delta: Decimal) -> Result<(), AtmError> {
        let value = self.value().checked_add(delta).ok_or(AtmError::InvalidAmount)?;
        *self = match *self {
            Self::Authoritative { value: authoritative } => Self::Optimistic {
                value,
                authoritative,
                pending: 1,
                since: Utc::now(),
            },
            Self::Optimistic { authoritative, pending, since, .. } => Self::Optimistic {
                value,
                authoritative,
                pending: pending.saturating_add(1),
                since,
            },
        };
        Ok(())
    }

    pub fn reconcile(&mut self, value: Decimal) {
        *self = Self::Authoritative { value };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedAccount {
    pub id: i64,
    pub account_name: String,
    pub balance: DisplayedBalance,
}

impl From<Account> for SelectedAccount {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            account_name: account.account_name,
            balance: DisplayedBalance::authoritative(account.balance),
        }
    }
}

impl SelectedAccount {
    /// Overwrite local optimism with the host's view of this account.
    pub fn reconcile(&mut self, account: &Account) {
        self.account_name = account.account_name.clone();
        self.balance.reconcile(account.balance);
    }
}
