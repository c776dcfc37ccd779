use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    command::{CreateTransactionCommand, CreateWalletCommand},
    config::ClientConfig,
    query::{TransactionPage, TransactionQuery},
    wallet::{Transaction, Wallet, WalletId},
};

use super::{LedgerError, LedgerStore};

/// Message the backend sends when an optimistic version check fails.
pub const DEFAULT_VERSION_MISMATCH_MESSAGE: &str = "Wallet version mismatch";
/// Fragment of the backend message for a unique-name violation.
pub const DUPLICATE_VALUE_MARKER: &str = "Duplicate value";

const VERSION_MISMATCH_CODE: &str = "WALLET_VERSION_MISMATCH";
const DUPLICATE_NAME_CODE: &str = "DUPLICATE_NAME";

/// What a request was about, so a failure can be mapped to a precise error.
#[derive(Debug, Clone)]
pub enum RequestContext {
    CreateWallet { name: String },
    FindWallet { what: String },
    QueryTransactions,
    CreateTransaction { wallet_id: WalletId, expected: u64 },
}

/// [`LedgerStore`] backed by the wallet REST API.
#[derive(Debug, Clone)]
pub struct HttpLedgerStore {
    client: Client,
    base_url: Url,
    version_mismatch_message: String,
}

impl HttpLedgerStore {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            version_mismatch_message: DEFAULT_VERSION_MISMATCH_MESSAGE.to_owned(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, LedgerError> {
        Ok(Self::new(config.api_url.clone(), config.request_timeout)?
            .with_version_mismatch_message(config.version_mismatch_message.clone()))
    }

    pub fn with_version_mismatch_message(mut self, message: impl Into<String>) -> Self {
        self.version_mismatch_message = message.into();
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Sends a request and returns the decoded JSON body of a successful
    /// response, or the classified failure.
    async fn send(
        &self,
        request: RequestBuilder,
        context: &RequestContext,
    ) -> Result<Value, LedgerError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_error(
                status,
                &body,
                context,
                &self.version_mismatch_message,
            ));
        }
        let value: Value = serde_json::from_str(&body)?;
        if value.get("status").and_then(Value::as_str) == Some("ERROR") {
            return Err(classify_error(
                status,
                &body,
                context,
                &self.version_mismatch_message,
            ));
        }
        Ok(value)
    }

    async fn send_data<T>(
        &self,
        request: RequestBuilder,
        context: &RequestContext,
    ) -> Result<T, LedgerError>
    where
        T: DeserializeOwned,
    {
        let mut value = self.send(request, context).await?;
        let data = value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok(serde_json::from_value(data)?)
    }
}

#[async_trait]
impl LedgerStore for HttpLedgerStore {
    async fn create_wallet(&self, command: &CreateWalletCommand) -> Result<Wallet, LedgerError> {
        let url = self.endpoint(&["wallet"]);
        debug!(%url, name = command.name(), "creating wallet");
        let context = RequestContext::CreateWallet {
            name: command.name().to_owned(),
        };
        self.send_data(self.client.post(url).json(command), &context)
            .await
    }

    async fn find_wallet_by_id(&self, id: &WalletId) -> Result<Wallet, LedgerError> {
        let url = self.endpoint(&["wallet", id.as_str()]);
        debug!(%url, "fetching wallet");
        let context = RequestContext::FindWallet {
            what: format!("Wallet `{id}`"),
        };
        self.send_data(self.client.get(url), &context).await
    }

    async fn find_wallet_by_name(&self, name: &str) -> Result<Wallet, LedgerError> {
        let url = self.endpoint(&["wallet", "name", name]);
        debug!(%url, "fetching wallet by name");
        let context = RequestContext::FindWallet {
            what: format!("Wallet named `{name}`"),
        };
        self.send_data(self.client.get(url), &context).await
    }

    async fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, LedgerError> {
        query.validate()?;
        let url = self.endpoint(&["transaction", "query"]);
        debug!(%url, wallet_id = %query.wallet_id, skip = query.skip, limit = query.limit, "querying transactions");
        let request = self.client.get(url).query(&query.to_params());
        let value = self
            .send(request, &RequestContext::QueryTransactions)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn create_transaction(
        &self,
        command: &CreateTransactionCommand,
    ) -> Result<Transaction, LedgerError> {
        let url = self.endpoint(&["transaction"]);
        debug!(%url, wallet_id = %command.wallet_id(), version = command.expected_version(), "creating transaction");
        let context = RequestContext::CreateTransaction {
            wallet_id: command.wallet_id().clone(),
            expected: command.expected_version(),
        };
        self.send_data(self.client.post(url).json(command), &context)
            .await
    }
}

/// Maps an error response onto the ledger error taxonomy.
///
/// A structured `code` is preferred. Without one the backend's message text
/// is matched: the version-mismatch sentinel by equality, a duplicate wallet
/// name by the `Duplicate value` fragment.
pub fn classify_error(
    status: StatusCode,
    body: &str,
    context: &RequestContext,
    version_mismatch_message: &str,
) -> LedgerError {
    let (message, code) = error_details(body);

    let is_mismatch = code.as_deref() == Some(VERSION_MISMATCH_CODE)
        || message.trim() == version_mismatch_message;
    if let (true, RequestContext::CreateTransaction { wallet_id, expected }) =
        (is_mismatch, context)
    {
        warn!(%wallet_id, expected, "wallet version mismatch");
        return LedgerError::VersionMismatch {
            wallet_id: wallet_id.clone(),
            expected: *expected,
        };
    }

    let is_duplicate =
        code.as_deref() == Some(DUPLICATE_NAME_CODE) || message.contains(DUPLICATE_VALUE_MARKER);
    if let (true, RequestContext::CreateWallet { name }) = (is_duplicate, context) {
        return LedgerError::DuplicateName { name: name.clone() };
    }

    if status == StatusCode::NOT_FOUND {
        let what = match context {
            RequestContext::FindWallet { what } => what.clone(),
            RequestContext::CreateTransaction { wallet_id, .. } => format!("Wallet `{wallet_id}`"),
            _ => "Resource".to_owned(),
        };
        return LedgerError::NotFound { what };
    }

    LedgerError::Server {
        status: status.as_u16(),
        message,
    }
}

/// Pulls `message` and `code` out of `{status, data: {message, code}}` or a
/// flat `{message, code}` body. Non-JSON bodies become the message verbatim.
fn error_details(body: &str) -> (String, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (body.trim().to_owned(), None);
    };
    let field = |name: &str| {
        value
            .get("data")
            .and_then(|data| data.get(name))
            .or_else(|| value.get(name))
            .and_then(Value::as_str)
            .map(str::to_owned)
    };
    (field("message").unwrap_or_default(), field("code"))
}
