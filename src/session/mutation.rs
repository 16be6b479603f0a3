use rust_decimal::Decimal;
use std::str::FromStr;

use super::AtmError;
use crate::bridge::actions;

/// A balance-mutating request, built only from validated form input.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Deposit {
        account_id: i64,
        amount: Decimal,
    },
    Withdraw {
        account_id: i64,
        amount: Decimal,
    },
    Transfer {
        from_account_id: i64,
        to_account_id: i64,
        amount: Decimal,
    },
}

impl Mutation {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => actions::DEPOSIT,
            Self::Withdraw { .. } => actions::WITHDRAW,
            Self::Transfer { .. } => actions::TRANSFER,
        }
    }

    /// Signed change to the source account's displayed balance.
    /// The destination of a transfer is never updated locally.
    pub fn delta(&self) -> Decimal {
        match self {
            Self::Deposit { amount, .. } => *amount,
            Self::Withdraw { amount, .. } | Self::Transfer { amount, .. } => -*amount,
        }
    }
}

/// Amounts must parse to a number strictly greater than zero.
pub fn parse_amount(input: &str) -> Result<Decimal, AtmError> {
    let input = input.trim();
    let amount = Decimal::from_str(input)
        .or_else(|_| Decimal::from_scientific(input))
        .map_err(|_| AtmError::InvalidAmount)?;

    if amount <= Decimal::ZERO {
        return Err(AtmError::InvalidAmount);
    }

    Ok(amount)
}

pub fn parse_target_account(input: &str) -> Result<i64, AtmError> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| AtmError::InvalidTargetAccount)
}
