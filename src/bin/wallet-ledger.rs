use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wallet_ledger::{
    bin_utils::{Service, args::Cli},
    config::ClientConfig,
    controller::WalletController,
    session::FileSessionStorage,
    store::{LedgerError, http_store::HttpLedgerStore},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url)?;
    }
    if let Some(path) = cli.session_file {
        config = config.with_session_file(path);
    }

    let store = HttpLedgerStore::from_config(&config).context("Failed to build HTTP client")?;
    let storage = FileSessionStorage::new(&config.session_file);

    let mut service = Service {
        controller: WalletController::new(store, storage),
        input: std::io::stdin().lock(),
        output: &mut std::io::stdout(),
        error_printer: Box::new(|err: &LedgerError| eprintln!("Error: {}", err.notice())),
    };
    service.run(cli.command).await
}
