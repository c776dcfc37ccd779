use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::wallet::{DECIMAL_SCALE, TransactionKind, WalletId, scaled};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Please enter an amount")]
    AmountRequired,
    #[error("Amount `{0}` is not a number")]
    AmountNotNumeric(String),
    #[error("Amount must be a positive number")]
    NonPositiveAmount,
    #[error("Amount must not be zero")]
    ZeroAmount,
    #[error("Amount {0} has more than {scale} fractional digits", scale = DECIMAL_SCALE)]
    TooPrecise(Decimal),
    #[error("Please enter a description")]
    DescriptionRequired,
    #[error("Please enter a name")]
    NameRequired,
    #[error("Balance must be a non-negative number")]
    NegativeBalance,
}

/// Request body for `POST /wallet`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateWalletCommand {
    name: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    balance: Option<Decimal>,
}

impl CreateWalletCommand {
    /// Validates the wallet creation form. A blank balance means "start from zero".
    pub fn parse(name: &str, balance: Option<&str>) -> Result<Self, CommandError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::NameRequired);
        }
        let balance = match balance.map(str::trim).filter(|b| !b.is_empty()) {
            None => None,
            Some(text) => {
                let value = parse_decimal(text)?;
                if value < Decimal::ZERO {
                    return Err(CommandError::NegativeBalance);
                }
                Some(scaled(check_precision(value)?))
            }
        };
        Ok(Self {
            name: name.to_owned(),
            balance,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_balance(&self) -> Decimal {
        self.balance.unwrap_or(Decimal::ZERO)
    }
}

/// A validated transaction form that is not yet bound to a wallet version.
///
/// Drafts are built before any network call, so invalid input never reaches
/// the store and never touches the cached wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    amount: Decimal,
    description: String,
}

impl TransactionDraft {
    /// Parses a user-entered, unsigned amount and applies the chosen direction.
    ///
    /// Thousands separators and a leading `$` are tolerated, as they are what
    /// the amount field displays back to the user.
    pub fn parse(
        amount: &str,
        description: &str,
        kind: TransactionKind,
    ) -> Result<Self, CommandError> {
        let cleaned: String = amount
            .trim()
            .trim_start_matches('$')
            .chars()
            .filter(|c| *c != ',')
            .collect();
        if cleaned.is_empty() {
            return Err(CommandError::AmountRequired);
        }
        let value = parse_decimal(&cleaned)?;
        if value <= Decimal::ZERO {
            return Err(CommandError::NonPositiveAmount);
        }
        let signed = match kind {
            TransactionKind::Credit => value,
            TransactionKind::Debit => -value,
        };
        Self::from_signed(signed, description)
    }

    /// Builds a draft from an already signed amount.
    pub fn from_signed(amount: Decimal, description: &str) -> Result<Self, CommandError> {
        if amount.is_zero() {
            return Err(CommandError::ZeroAmount);
        }
        let amount = check_precision(amount)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(CommandError::DescriptionRequired);
        }
        Ok(Self {
            amount: scaled(amount),
            description: description.to_owned(),
        })
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> TransactionKind {
        TransactionKind::of(self.amount)
    }

    /// Binds the draft to the caller's last known wallet version.
    pub fn into_command(self, wallet_id: WalletId, expected_version: u64) -> CreateTransactionCommand {
        CreateTransactionCommand {
            wallet_id,
            amount: self.amount,
            description: self.description,
            expected_version,
        }
    }
}

/// Request body for `POST /transaction`.
///
/// Only constructible from a [`TransactionDraft`], so the amount is always
/// non-zero and the description never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionCommand {
    wallet_id: WalletId,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    description: String,
    #[serde(rename = "version")]
    expected_version: u64,
}

impl CreateTransactionCommand {
    pub fn new(
        wallet_id: WalletId,
        amount: Decimal,
        description: &str,
        expected_version: u64,
    ) -> Result<Self, CommandError> {
        Ok(TransactionDraft::from_signed(amount, description)?
            .into_command(wallet_id, expected_version))
    }

    pub fn wallet_id(&self) -> &WalletId {
        &self.wallet_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn expected_version(&self) -> u64 {
        self.expected_version
    }
}

fn parse_decimal(text: &str) -> Result<Decimal, CommandError> {
    Decimal::from_str(text).map_err(|_| CommandError::AmountNotNumeric(text.to_owned()))
}

fn check_precision(value: Decimal) -> Result<Decimal, CommandError> {
    if value.normalize().scale() > DECIMAL_SCALE {
        Err(CommandError::TooPrecise(value))
    } else {
        Ok(value)
    }
}
