use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    query::{DEFAULT_PAGE_SIZE, SortField, SortOrder, TransactionQuery},
    wallet::WalletId,
};

#[derive(Debug, Parser)]
#[command(name = "wallet-ledger", version, about = "Wallet balance and transaction history client")]
pub struct Cli {
    /// Backend base url, overrides LEDGER_API_URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// File holding the active wallet id, overrides LEDGER_SESSION_FILE
    #[arg(long, global = true)]
    pub session_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create a wallet and make it the active one
    Create {
        name: String,
        /// Initial balance, zero when omitted
        #[arg(long)]
        balance: Option<String>,
    },
    /// Show the active wallet
    Show,
    /// Fetch the latest state of the active wallet
    Refresh,
    /// Forget the active wallet
    Logout,
    Deposit {
        amount: String,
        description: String,
    },
    Withdraw {
        amount: String,
        description: String,
    },
    /// List one page of transactions
    History(HistoryArgs),
    /// Write transactions as CSV
    Export {
        #[command(flatten)]
        view: HistoryArgs,
        /// Export every matching transaction instead of one page
        #[arg(long)]
        all: bool,
        /// Directory the file is written to
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
pub struct HistoryArgs {
    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    pub page: u64,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub size: u64,
    /// Case-insensitive text matched against description, amount and balance
    #[arg(long)]
    pub search: Option<String>,
    /// `date` or `amount`
    #[arg(long)]
    pub sort: Option<SortField>,
    /// `asc` or `desc`
    #[arg(long)]
    pub order: Option<SortOrder>,
}

impl Default for HistoryArgs {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
            search: None,
            sort: None,
            order: None,
        }
    }
}

impl HistoryArgs {
    pub fn to_query(&self, wallet_id: WalletId) -> TransactionQuery {
        let mut query = TransactionQuery::for_page(wallet_id, self.page, self.size);
        if let Some(search) = &self.search {
            query = query.with_search(search.as_str());
        }
        match (self.sort, self.order) {
            (Some(field), order) => query.sorted_by(field, order),
            // an order on its own applies to the date
            (None, Some(order)) => query.sorted_by(SortField::Date, Some(order)),
            (None, None) => query,
        }
    }
}
