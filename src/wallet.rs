use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::CreateTransactionCommand;

/// Fractional digits kept for every stored amount and balance.
pub const DECIMAL_SCALE: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of a transaction, derived from the sign of its amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Credit,
    Debit,
}

impl TransactionKind {
    /// Zero is never a legal amount, so it falls on the debit side.
    pub fn of(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            Self::Credit
        } else {
            Self::Debit
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Credit => "Credit",
            Self::Debit => "Debit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    #[serde(rename = "_id", alias = "id")]
    pub id: WalletId,
    pub name: String,
    pub balance: Decimal,
    /// Optimistic concurrency token, bumped once per accepted transaction.
    #[serde(rename = "__v", alias = "version", default)]
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(alias = "_id")]
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    /// Wallet balance right after this transaction was applied.
    pub balance: Decimal,
    pub description: String,
    pub date: DateTime<Utc>,
}

impl Transaction {
    pub fn kind(&self) -> TransactionKind {
        TransactionKind::of(self.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletEventKind {
    Credited,
    Debited,
}

#[derive(Debug)]
pub struct WalletEvent {
    kind: WalletEventKind,
    transaction: Transaction,
}

impl WalletEvent {
    pub fn kind(&self) -> WalletEventKind {
        self.kind
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("Wallet version mismatch: expected {expected}, current is {current}")]
    VersionMismatch { expected: u64, current: u64 },
    #[error("Transaction for wallet `{requested}` cannot be applied to wallet `{wallet}`")]
    WalletMismatch {
        wallet: WalletId,
        requested: WalletId,
    },
    #[error("Balance overflow")]
    BalanceOverflow,
}

impl Wallet {
    /// Validates a transaction against the current state and produces the
    /// event that appends it. The wallet itself is left untouched.
    pub fn handle_create_transaction(
        &self,
        command: &CreateTransactionCommand,
        transaction_id: TransactionId,
        date: DateTime<Utc>,
    ) -> Result<WalletEvent, WalletError> {
        if command.wallet_id() != &self.id {
            return Err(WalletError::WalletMismatch {
                wallet: self.id.clone(),
                requested: command.wallet_id().clone(),
            });
        }
        if command.expected_version() != self.version {
            return Err(WalletError::VersionMismatch {
                expected: command.expected_version(),
                current: self.version,
            });
        }

        let amount = scaled(command.amount());
        let balance = self
            .balance
            .checked_add(amount)
            .map(scaled)
            .ok_or(WalletError::BalanceOverflow)?;
        let kind = match TransactionKind::of(amount) {
            TransactionKind::Credit => WalletEventKind::Credited,
            TransactionKind::Debit => WalletEventKind::Debited,
        };
        Ok(WalletEvent {
            kind,
            transaction: Transaction {
                id: transaction_id,
                wallet_id: self.id.clone(),
                amount,
                balance,
                description: command.description().to_owned(),
                date,
            },
        })
    }

    pub fn apply(&mut self, event: &WalletEvent) {
        self.balance = event.transaction.balance;
        self.version += 1;
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Balance chain broken at transaction `{transaction_id}`: expected {expected}, recorded {recorded}")]
pub struct BalanceChainError {
    pub transaction_id: TransactionId,
    pub expected: Decimal,
    pub recorded: Decimal,
}

/// Walks a creation-ordered transaction sequence and checks that every
/// snapshot equals the previous one plus its amount. Returns the final balance.
pub fn check_balance_chain<'a>(
    initial_balance: Decimal,
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Result<Decimal, BalanceChainError> {
    transactions
        .into_iter()
        .try_fold(initial_balance, |previous, tx| {
            let expected = previous + tx.amount;
            if expected == tx.balance {
                Ok(tx.balance)
            } else {
                Err(BalanceChainError {
                    transaction_id: tx.id.clone(),
                    expected,
                    recorded: tx.balance,
                })
            }
        })
}

pub(crate) fn scaled(mut value: Decimal) -> Decimal {
    value.rescale(DECIMAL_SCALE);
    value
}
