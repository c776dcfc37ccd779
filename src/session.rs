use std::{
    collections::{BTreeMap, HashMap},
    fs, io,
    path::{Path, PathBuf},
};

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    store::{LedgerError, LedgerStore},
    wallet::{Wallet, WalletId},
};

/// Key under which the active wallet id is persisted.
pub const WALLET_ID_KEY: &str = "walletId";

#[derive(Debug, Error)]
pub enum SessionStorageError {
    #[error("Failed to access session file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Session file `{path}` is corrupted: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Small key-value persistence for client state that must survive restarts.
pub trait SessionStorage: Send {
    fn get(&self, key: &str) -> Result<Option<String>, SessionStorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionStorageError>;
    fn clear(&mut self, key: &str) -> Result<(), SessionStorageError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemorySessionStorage {
    values: HashMap<String, String>,
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionStorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionStorageError> {
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<(), SessionStorageError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Stores values as a flat JSON object in a single file.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>, SessionStorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(self.io_error(source)),
        };
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text).map_err(|source| SessionStorageError::Corrupted {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, values: &BTreeMap<String, String>) -> Result<(), SessionStorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let text = serde_json::to_string_pretty(values).map_err(|source| {
            SessionStorageError::Corrupted {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, text).map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: io::Error) -> SessionStorageError {
        SessionStorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionStorageError> {
        Ok(self.read()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionStorageError> {
        let mut values = self.read()?;
        values.insert(key.to_owned(), value.to_owned());
        self.write(&values)
    }

    fn clear(&mut self, key: &str) -> Result<(), SessionStorageError> {
        let mut values = self.read()?;
        if values.remove(key).is_some() {
            self.write(&values)?;
        }
        Ok(())
    }
}

pub type Subscriber = Box<dyn Fn(Option<&Wallet>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Holds the single active wallet and tells subscribers about every change.
///
/// The cached balance and version only ever move in two ways: wholesale from
/// a store response ([`load`](Self::load), [`refresh`](Self::refresh)) or
/// through [`set_balance`](Self::set_balance) and
/// [`increment_version`](Self::increment_version) after the store confirmed
/// a transaction. Subscribers are called synchronously, in subscription order.
pub struct WalletSession<K> {
    wallet: Option<Wallet>,
    storage: K,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl<K: SessionStorage> WalletSession<K> {
    pub fn new(storage: K) -> Self {
        Self {
            wallet: None,
            storage,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn wallet(&self) -> Option<&Wallet> {
        self.wallet.as_ref()
    }

    pub fn storage(&self) -> &K {
        &self.storage
    }

    /// Wallet id left behind by a previous run, if any.
    pub fn persisted_wallet_id(&self) -> Result<Option<WalletId>, SessionStorageError> {
        Ok(self.storage.get(WALLET_ID_KEY)?.map(WalletId::new))
    }

    pub fn subscribe(
        &mut self,
        subscriber: impl Fn(Option<&Wallet>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    /// Persists the wallet id, then replaces the held wallet. Nothing changes
    /// when persisting fails.
    pub fn load(&mut self, wallet: Wallet) -> Result<(), SessionStorageError> {
        self.storage.set(WALLET_ID_KEY, wallet.id.as_str())?;
        debug!(wallet_id = %wallet.id, version = wallet.version, "session wallet loaded");
        self.wallet = Some(wallet);
        self.notify();
        Ok(())
    }

    /// Drops the held wallet and forgets the persisted id.
    pub fn clear(&mut self) -> Result<(), SessionStorageError> {
        debug!("session cleared");
        self.wallet = None;
        self.notify();
        self.storage.clear(WALLET_ID_KEY)
    }

    /// Updates the cached balance only. Returns false when no wallet is held.
    pub fn set_balance(&mut self, value: Decimal) -> bool {
        let Some(wallet) = self.wallet.as_mut() else {
            return false;
        };
        wallet.balance = value;
        self.notify();
        true
    }

    /// Mirrors one confirmed mutation. Returns false when no wallet is held.
    pub fn increment_version(&mut self) -> bool {
        let Some(wallet) = self.wallet.as_mut() else {
            return false;
        };
        wallet.version += 1;
        self.notify();
        true
    }

    /// Re-fetches the held wallet and replaces the snapshot. A wallet the
    /// store no longer knows clears the session.
    pub async fn refresh<S>(&mut self, store: &S) -> Result<Wallet, LedgerError>
    where
        S: LedgerStore + ?Sized,
    {
        let id = self
            .wallet
            .as_ref()
            .map(|w| w.id.clone())
            .ok_or(LedgerError::NoActiveWallet)?;
        match store.find_wallet_by_id(&id).await {
            Ok(wallet) => {
                self.load(wallet.clone())?;
                Ok(wallet)
            }
            Err(err @ LedgerError::NotFound { .. }) => {
                warn!(wallet_id = %id, "active wallet no longer exists");
                self.clear()?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn notify(&self) {
        let wallet = self.wallet.as_ref();
        for (_, subscriber) in &self.subscribers {
            subscriber(wallet);
        }
    }
}
