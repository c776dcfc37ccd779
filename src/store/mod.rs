use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    command::{CommandError, CreateTransactionCommand, CreateWalletCommand},
    export::ExportError,
    query::{QueryError, TransactionPage, TransactionQuery},
    session::SessionStorageError,
    wallet::{Transaction, Wallet, WalletId},
};

pub mod http_store;
pub mod in_memory_store;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] CommandError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("Wallet `{wallet_id}` was changed elsewhere (expected version {expected})")]
    VersionMismatch { wallet_id: WalletId, expected: u64 },
    #[error("A wallet named `{name}` already exists")]
    DuplicateName { name: String },
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Malformed server response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Session(#[from] SessionStorageError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("No wallet is active, create or select one first")]
    NoActiveWallet,
    #[error("A transaction for wallet `{wallet_id}` is already being submitted")]
    SubmissionInFlight { wallet_id: WalletId },
}

impl LedgerError {
    /// Message to show the user for this failure.
    pub fn notice(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Query(err) => err.to_string(),
            Self::VersionMismatch { .. } => {
                "The wallet was updated elsewhere. It has been refreshed, please try again."
                    .to_string()
            }
            Self::DuplicateName { name } => {
                format!("A wallet already exists with the name {name}.")
            }
            Self::NotFound { .. } => {
                "The wallet could not be found anymore. Please create a new one.".to_string()
            }
            Self::Server { message, .. } if !message.is_empty() => message.clone(),
            Self::Network(_) | Self::Server { .. } | Self::Decode(_) => {
                "Something went wrong, please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Faults after which nothing is assumed to have changed, so the same
    /// request can simply be sent again. A 4xx rejection is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Server { status, .. } => *status >= 500,
            Self::Network(_) | Self::Decode(_) | Self::SubmissionInFlight { .. } => true,
            _ => false,
        }
    }
}

/// The backing wallet store as the client sees it.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fails with [`LedgerError::DuplicateName`] when the name is taken.
    async fn create_wallet(&self, command: &CreateWalletCommand) -> Result<Wallet, LedgerError>;

    async fn find_wallet_by_id(&self, id: &WalletId) -> Result<Wallet, LedgerError>;

    async fn find_wallet_by_name(&self, name: &str) -> Result<Wallet, LedgerError>;

    /// Unknown wallets produce an empty page, not an error.
    async fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, LedgerError>;

    /// Appends a transaction if the command's expected version is still the
    /// wallet's current one, otherwise fails with [`LedgerError::VersionMismatch`].
    async fn create_transaction(
        &self,
        command: &CreateTransactionCommand,
    ) -> Result<Transaction, LedgerError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn create_wallet(&self, command: &CreateWalletCommand) -> Result<Wallet, LedgerError> {
        (**self).create_wallet(command).await
    }

    async fn find_wallet_by_id(&self, id: &WalletId) -> Result<Wallet, LedgerError> {
        (**self).find_wallet_by_id(id).await
    }

    async fn find_wallet_by_name(&self, name: &str) -> Result<Wallet, LedgerError> {
        (**self).find_wallet_by_name(name).await
    }

    async fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, LedgerError> {
        (**self).query_transactions(query).await
    }

    async fn create_transaction(
        &self,
        command: &CreateTransactionCommand,
    ) -> Result<Transaction, LedgerError> {
        (**self).create_transaction(command).await
    }
}
