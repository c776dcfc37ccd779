//! Command line front end over [`WalletController`](crate::controller::WalletController).
//! The binary only wires configuration and real I/O into [`Service`].

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::debug;

use crate::{
    command::{CreateWalletCommand, TransactionDraft},
    controller::{WalletController, WalletCreation},
    export::{ExportScope, format_amount},
    session::SessionStorage,
    store::{LedgerError, LedgerStore},
    wallet::{TransactionKind, Wallet},
};
use args::Command;
use printer::{print_page, print_wallet};
pub mod args;
pub mod printer;

pub struct Service<'w, S, K, R, W: 'w> {
    pub controller: WalletController<S, K>,
    /// Answers to interactive questions, one per line.
    pub input: R,
    pub output: &'w mut W,
    pub error_printer: Box<dyn FnMut(&LedgerError) + 'w>,
}

impl<'w, S, K, R, W> Service<'w, S, K, R, W>
where
    S: LedgerStore,
    K: SessionStorage,
    R: BufRead,
    W: Write + 'w,
{
    /// Runs one command. Ledger failures are reported through the error
    /// printer; only I/O failures of the service itself are returned.
    pub async fn run(&mut self, command: Command) -> Result<()> {
        match self.execute(command).await {
            Ok(()) => Ok(()),
            Err(err) => match err.downcast::<LedgerError>() {
                Ok(err) => {
                    (self.error_printer)(&err);
                    Ok(())
                }
                Err(err) => Err(err),
            },
        }
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        if !matches!(command, Command::Create { .. }) {
            self.restore().await?;
        }
        match command {
            Command::Create { name, balance } => {
                let command = CreateWalletCommand::parse(&name, balance.as_deref())
                    .map_err(LedgerError::from)?;
                self.create(command).await?;
            }
            Command::Show => match self.controller.active_wallet().await {
                Some(wallet) => print_wallet(self.output, &wallet)?,
                None => writeln!(
                    self.output,
                    "No active wallet. Create one with `wallet-ledger create <name>`."
                )?,
            },
            Command::Refresh => {
                let wallet = self.controller.refresh().await?;
                print_wallet(self.output, &wallet)?;
            }
            Command::Logout => {
                self.controller.logout().await?;
                writeln!(self.output, "Logged out")?;
            }
            Command::Deposit {
                amount,
                description,
            } => self.submit(&amount, &description, TransactionKind::Credit).await?,
            Command::Withdraw {
                amount,
                description,
            } => self.submit(&amount, &description, TransactionKind::Debit).await?,
            Command::History(view) => {
                let wallet = self.active_wallet().await?;
                if let Some(page) = self.controller.load_history(view.to_query(wallet.id)).await? {
                    print_page(self.output, &page)?;
                }
            }
            Command::Export { view, all, out } => {
                let wallet = self.active_wallet().await?;
                self.controller.load_history(view.to_query(wallet.id)).await?;
                let scope = if all { ExportScope::All } else { ExportScope::Page };
                let file = self.controller.export(scope).await?;
                let path = out.join(file.filename);
                std::fs::write(&path, &file.contents)
                    .with_context(|| format!("Failed to write `{}`", path.display()))?;
                writeln!(self.output, "Exported to {}", path.display())?;
            }
        }
        Ok(())
    }

    async fn restore(&mut self) -> Result<()> {
        match self.controller.restore().await {
            Ok(wallet) => {
                debug!(restored = wallet.is_some(), "session restored");
                Ok(())
            }
            // the session is already cleared, the command decides what is missing
            Err(err @ LedgerError::NotFound { .. }) => {
                (self.error_printer)(&err);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn create(&mut self, command: CreateWalletCommand) -> Result<()> {
        let wallet = match self.controller.create_wallet(command).await? {
            WalletCreation::Created(wallet) => {
                writeln!(self.output, "Wallet created successfully for {}", wallet.name)?;
                wallet
            }
            WalletCreation::NameTaken(existing) => {
                write!(
                    self.output,
                    "A wallet already exists with the name {}. Use it instead? [y/N] ",
                    existing.name
                )?;
                self.output.flush()?;
                if !self.confirm()? {
                    writeln!(self.output, "Wallet not created")?;
                    return Ok(());
                }
                self.controller.adopt_wallet(existing.clone()).await?;
                writeln!(self.output, "Using wallet {}", existing.name)?;
                existing
            }
        };
        print_wallet(self.output, &wallet)
    }

    async fn submit(&mut self, amount: &str, description: &str, kind: TransactionKind) -> Result<()> {
        let draft = TransactionDraft::parse(amount, description, kind).map_err(LedgerError::from)?;
        let tx = self.controller.submit_transaction(draft).await?;
        let verb = match tx.kind() {
            TransactionKind::Credit => "Added",
            TransactionKind::Debit => "Deducted",
        };
        writeln!(
            self.output,
            "Transaction successful: {verb} {}, balance {}",
            format_amount(tx.amount.abs()),
            format_amount(tx.balance)
        )?;
        Ok(())
    }

    async fn active_wallet(&self) -> Result<Wallet, LedgerError> {
        self.controller
            .active_wallet()
            .await
            .ok_or(LedgerError::NoActiveWallet)
    }

    fn confirm(&mut self) -> Result<bool> {
        let mut answer = String::new();
        self.input
            .read_line(&mut answer)
            .context("Failed to read answer")?;
        writeln!(self.output)?;
        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}
