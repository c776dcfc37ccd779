/// Wallet and transaction types, plus the rule that turns a transaction
/// command into an event against a wallet snapshot.
pub mod wallet;

/// Validated requests sent to the store: wallet creation and transactions.
pub mod command;

/// Transaction history queries, and the in-process engine that answers them.
pub mod query;

/// Ledger store interface, with an "in memory" and an HTTP implementation.
///
/// NOTE: the in memory store enforces the same optimistic concurrency as
/// the backend, which makes it usable for tests and offline work.
pub mod store;

/// The client's single source of truth for the active wallet.
pub mod session;

/// Coordinates session, store and history view for one client.
pub mod controller;

/// CSV export of transaction history.
pub mod export;

/// Client configuration from `LEDGER_*` environment variables.
pub mod config;

/// Command line front end. It lives in the library so integration tests can
/// drive it the same way the binary does.
pub mod bin_utils;
