use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::{
    command::{CreateTransactionCommand, CreateWalletCommand},
    query::{self, TransactionPage, TransactionQuery},
    wallet::{
        BalanceChainError, Transaction, TransactionId, Wallet, WalletError, WalletId,
        check_balance_chain, scaled,
    },
};

use super::{LedgerError, LedgerStore};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Default)]
struct LedgerState {
    wallets: HashMap<WalletId, Wallet>,
    initial_balances: HashMap<WalletId, Decimal>,
    names: HashMap<String, WalletId>,
    // append-only, in creation order
    transactions: Vec<Transaction>,
    next_id: u64,
}

impl LedgerState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:024x}", self.next_id)
    }
}

/// Process-local store with the same semantics as the wallet backend.
///
/// The version check and the append happen under one lock, so at most one
/// transaction can be accepted per wallet version.
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
    clock: Clock,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::with_clock(Utc::now)
    }
}

impl InMemoryLedgerStore {
    pub fn with_clock(clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::default(),
            clock: Box::new(clock),
        }
    }

    /// Transactions of one wallet in the order they were appended.
    pub fn transactions_of(&self, wallet_id: &WalletId) -> Vec<Transaction> {
        let state = self.state.lock();
        state
            .transactions
            .iter()
            .filter(|tx| &tx.wallet_id == wallet_id)
            .cloned()
            .collect()
    }

    /// Replays a wallet's history from its initial balance and checks it
    /// ends at the stored balance.
    pub fn audit(&self, wallet_id: &WalletId) -> Result<Decimal, BalanceChainError> {
        let initial = self
            .state
            .lock()
            .initial_balances
            .get(wallet_id)
            .copied()
            .unwrap_or_default();
        check_balance_chain(initial, &self.transactions_of(wallet_id))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_wallet(&self, command: &CreateWalletCommand) -> Result<Wallet, LedgerError> {
        let mut state = self.state.lock();
        if state.names.contains_key(command.name()) {
            return Err(LedgerError::DuplicateName {
                name: command.name().to_owned(),
            });
        }
        let id = WalletId::new(state.next_id());
        let wallet = Wallet {
            id: id.clone(),
            name: command.name().to_owned(),
            balance: scaled(command.initial_balance()),
            version: 0,
        };
        state.names.insert(wallet.name.clone(), id.clone());
        state.initial_balances.insert(id.clone(), wallet.balance);
        state.wallets.insert(id, wallet.clone());
        debug!(wallet_id = %wallet.id, name = %wallet.name, "wallet created");
        Ok(wallet)
    }

    async fn find_wallet_by_id(&self, id: &WalletId) -> Result<Wallet, LedgerError> {
        self.state
            .lock()
            .wallets
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound {
                what: format!("Wallet `{id}`"),
            })
    }

    async fn find_wallet_by_name(&self, name: &str) -> Result<Wallet, LedgerError> {
        let state = self.state.lock();
        state
            .names
            .get(name)
            .and_then(|id| state.wallets.get(id))
            .cloned()
            .ok_or_else(|| LedgerError::NotFound {
                what: format!("Wallet named `{name}`"),
            })
    }

    async fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, LedgerError> {
        let state = self.state.lock();
        Ok(query::execute(query, &state.transactions)?)
    }

    async fn create_transaction(
        &self,
        command: &CreateTransactionCommand,
    ) -> Result<Transaction, LedgerError> {
        let date = (self.clock)();
        let mut state = self.state.lock();
        let tx_id = TransactionId::new(state.next_id());
        let wallet = state
            .wallets
            .get_mut(command.wallet_id())
            .ok_or_else(|| LedgerError::NotFound {
                what: format!("Wallet `{}`", command.wallet_id()),
            })?;

        let event = wallet
            .handle_create_transaction(command, tx_id, date)
            .map_err(|err| match err {
                WalletError::VersionMismatch { expected, .. } => LedgerError::VersionMismatch {
                    wallet_id: command.wallet_id().clone(),
                    expected,
                },
                other => LedgerError::Server {
                    status: 422,
                    message: other.to_string(),
                },
            })?;
        wallet.apply(&event);
        debug!(
            wallet_id = %command.wallet_id(),
            version = wallet.version,
            "transaction appended"
        );
        // append only when the wallet accepted it
        let tx = event.into_transaction();
        state.transactions.push(tx.clone());
        Ok(tx)
    }
}
