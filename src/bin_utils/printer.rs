use std::io::Write;

use anyhow::Result;

use crate::{export::format_amount, query::TransactionPage, wallet::Wallet};

pub fn print_wallet<W>(output: &mut W, wallet: &Wallet) -> Result<()>
where
    W: Write,
{
    writeln!(output, "Wallet:  {}", wallet.name)?;
    writeln!(output, "Id:      {}", wallet.id)?;
    writeln!(output, "Balance: {}", format_amount(wallet.balance))?;
    writeln!(output, "Version: {}", wallet.version)?;
    Ok(())
}

/// One line per transaction, then a page footer.
pub fn print_page<W>(output: &mut W, page: &TransactionPage) -> Result<()>
where
    W: Write,
{
    writeln!(
        output,
        "{:<6}  {:<10}  {:>16}  {:>16}  Description",
        "Type", "Date", "Amount", "Balance"
    )?;
    for tx in &page.data {
        writeln!(
            output,
            "{:<6}  {:<10}  {:>16}  {:>16}  {}",
            tx.kind().label(),
            tx.date.format("%Y-%m-%d"),
            format_amount(tx.amount),
            format_amount(tx.balance),
            tx.description
        )?;
    }
    let pages = page.total_count.div_ceil(page.size.max(1)).max(1);
    writeln!(
        output,
        "Page {} of {}, {} transactions in total",
        page.page, pages, page.total_count
    )?;
    Ok(())
}
