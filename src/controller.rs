use std::collections::HashSet;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    command::{CreateWalletCommand, TransactionDraft},
    export::{self, ExportFile, ExportScope},
    query::{QueryTracker, TransactionPage, TransactionQuery},
    session::{SessionStorage, SubscriptionId, WalletSession},
    store::{LedgerError, LedgerStore},
    wallet::{Transaction, Wallet, WalletId},
};

/// Outcome of a wallet creation request.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletCreation {
    /// The wallet was created and is now active.
    Created(Wallet),
    /// The name belongs to an existing wallet, which the caller may adopt
    /// with [`WalletController::adopt_wallet`].
    NameTaken(Wallet),
}

#[derive(Debug, Clone)]
struct HistoryView {
    query: TransactionQuery,
    page: TransactionPage,
}

/// Marks a wallet as having a transaction in flight until dropped.
struct SubmissionGuard<'a> {
    in_flight: &'a parking_lot::Mutex<HashSet<WalletId>>,
    wallet_id: WalletId,
}

impl<'a> SubmissionGuard<'a> {
    fn try_acquire(
        in_flight: &'a parking_lot::Mutex<HashSet<WalletId>>,
        wallet_id: &WalletId,
    ) -> Option<Self> {
        if !in_flight.lock().insert(wallet_id.clone()) {
            return None;
        }
        Some(Self {
            in_flight,
            wallet_id: wallet_id.clone(),
        })
    }
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.wallet_id);
    }
}

/// Client-side coordinator between the wallet session and the store.
///
/// Transactions are always submitted with the session's cached version. A
/// confirmed transaction is mirrored into the session; a version mismatch
/// triggers a refresh and is reported, never retried with stale data.
pub struct WalletController<S, K> {
    store: S,
    session: Mutex<WalletSession<K>>,
    in_flight: parking_lot::Mutex<HashSet<WalletId>>,
    queries: QueryTracker,
    view: parking_lot::Mutex<Option<HistoryView>>,
}

impl<S, K> WalletController<S, K>
where
    S: LedgerStore,
    K: SessionStorage,
{
    pub fn new(store: S, storage: K) -> Self {
        Self {
            store,
            session: Mutex::new(WalletSession::new(storage)),
            in_flight: parking_lot::Mutex::default(),
            queries: QueryTracker::default(),
            view: parking_lot::Mutex::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn active_wallet(&self) -> Option<Wallet> {
        self.session.lock().await.wallet().cloned()
    }

    pub async fn subscribe(
        &self,
        subscriber: impl Fn(Option<&Wallet>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.session.lock().await.subscribe(subscriber)
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.session.lock().await.unsubscribe(id)
    }

    /// Runs `f` with read access to the session.
    pub async fn with_session<R>(&self, f: impl FnOnce(&WalletSession<K>) -> R) -> R {
        f(&*self.session.lock().await)
    }

    /// Reloads the wallet whose id was persisted by a previous run.
    pub async fn restore(&self) -> Result<Option<Wallet>, LedgerError> {
        let mut session = self.session.lock().await;
        let Some(id) = session.persisted_wallet_id()? else {
            return Ok(None);
        };
        match self.store.find_wallet_by_id(&id).await {
            Ok(wallet) => {
                session.load(wallet.clone())?;
                Ok(Some(wallet))
            }
            Err(err @ LedgerError::NotFound { .. }) => {
                warn!(wallet_id = %id, "persisted wallet no longer exists");
                session.clear()?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn create_wallet(
        &self,
        command: CreateWalletCommand,
    ) -> Result<WalletCreation, LedgerError> {
        match self.store.create_wallet(&command).await {
            Ok(wallet) => {
                info!(wallet_id = %wallet.id, name = %wallet.name, "wallet created");
                self.session.lock().await.load(wallet.clone())?;
                self.reset_view();
                Ok(WalletCreation::Created(wallet))
            }
            Err(LedgerError::DuplicateName { name }) => {
                debug!(%name, "wallet name taken, looking up the existing wallet");
                let existing = self.store.find_wallet_by_name(&name).await?;
                Ok(WalletCreation::NameTaken(existing))
            }
            Err(err) => Err(err),
        }
    }

    /// Makes an existing wallet the active one.
    pub async fn adopt_wallet(&self, wallet: Wallet) -> Result<(), LedgerError> {
        info!(wallet_id = %wallet.id, "adopting existing wallet");
        self.session.lock().await.load(wallet)?;
        self.reset_view();
        Ok(())
    }

    /// Re-fetches the active wallet. The session is not locked while the
    /// request is in flight; a wallet switched meanwhile is left alone.
    pub async fn refresh(&self) -> Result<Wallet, LedgerError> {
        let wallet_id = self
            .session
            .lock()
            .await
            .wallet()
            .map(|w| w.id.clone())
            .ok_or(LedgerError::NoActiveWallet)?;
        let fetched = self.store.find_wallet_by_id(&wallet_id).await;

        let mut session = self.session.lock().await;
        let still_active = session.wallet().is_some_and(|w| w.id == wallet_id);
        match fetched {
            Ok(wallet) => {
                if still_active {
                    session.load(wallet.clone())?;
                }
                Ok(wallet)
            }
            Err(err @ LedgerError::NotFound { .. }) => {
                warn!(wallet_id = %wallet_id, "active wallet no longer exists");
                if still_active {
                    session.clear()?;
                    self.reset_view();
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn logout(&self) -> Result<(), LedgerError> {
        self.session.lock().await.clear()?;
        self.reset_view();
        Ok(())
    }

    /// Submits a validated draft against the active wallet.
    ///
    /// Only one submission per wallet may be in flight; a second one fails
    /// with [`LedgerError::SubmissionInFlight`] without reaching the store.
    pub async fn submit_transaction(
        &self,
        draft: TransactionDraft,
    ) -> Result<Transaction, LedgerError> {
        let (wallet_id, version) = {
            let session = self.session.lock().await;
            let wallet = session.wallet().ok_or(LedgerError::NoActiveWallet)?;
            (wallet.id.clone(), wallet.version)
        };
        let _guard = SubmissionGuard::try_acquire(&self.in_flight, &wallet_id).ok_or_else(
            || LedgerError::SubmissionInFlight {
                wallet_id: wallet_id.clone(),
            },
        )?;

        let command = draft.into_command(wallet_id.clone(), version);
        match self.store.create_transaction(&command).await {
            Ok(tx) => {
                let mut session = self.session.lock().await;
                // mirror only if the session still holds the snapshot we submitted against
                let unchanged = session
                    .wallet()
                    .is_some_and(|w| w.id == wallet_id && w.version == version);
                if unchanged {
                    session.set_balance(tx.balance);
                    session.increment_version();
                }
                info!(
                    wallet_id = %wallet_id,
                    amount = %tx.amount,
                    balance = %tx.balance,
                    version = version + 1,
                    "transaction confirmed"
                );
                Ok(tx)
            }
            Err(err @ LedgerError::VersionMismatch { .. }) => {
                warn!(wallet_id = %wallet_id, version, "stale wallet version, refreshing");
                if let Err(refresh_err) = self.refresh().await {
                    warn!(error = %refresh_err, "wallet refresh after version mismatch failed");
                }
                Err(err)
            }
            Err(err @ LedgerError::NotFound { .. }) => {
                self.session.lock().await.clear()?;
                self.reset_view();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Fetches a history page and makes it the displayed one. Returns `None`
    /// when a newer request started meanwhile, even if this one failed; the
    /// newer response wins.
    pub async fn load_history(
        &self,
        query: TransactionQuery,
    ) -> Result<Option<TransactionPage>, LedgerError> {
        let ticket = self.queries.begin();
        let result = self.store.query_transactions(&query).await;
        if !self.queries.is_current(ticket) {
            debug!(wallet_id = %query.wallet_id, skip = query.skip, "dropping superseded history response");
            return Ok(None);
        }
        let page = result?;
        *self.view.lock() = Some(HistoryView {
            query,
            page: page.clone(),
        });
        Ok(Some(page))
    }

    /// Exports either the displayed page or every row matching its filter
    /// and sort. Without a displayed page the export holds only the header.
    pub async fn export(&self, scope: ExportScope) -> Result<ExportFile, LedgerError> {
        let view = self.view.lock().clone();
        match (scope, view) {
            (ExportScope::Page, Some(view)) => Ok(export::export_page(&view.page)?),
            (ExportScope::All, Some(view)) => {
                export::export_all(&self.store, &view.query, view.page.total_count).await
            }
            (scope, None) => Ok(ExportFile {
                filename: scope.filename(),
                contents: export::render_csv(std::iter::empty())?,
            }),
        }
    }

    fn reset_view(&self) {
        *self.view.lock() = None;
    }
}
