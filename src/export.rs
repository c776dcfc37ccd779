use std::io::Write;

use csv::{Terminator, WriterBuilder};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

use crate::{
    query::{TransactionPage, TransactionQuery},
    store::{LedgerError, LedgerStore},
    wallet::Transaction,
};

pub const PAGE_EXPORT_FILENAME: &str = "page_transactions.csv";
pub const ALL_EXPORT_FILENAME: &str = "all_transactions.csv";

const HEADERS: [&str; 6] = [
    "Type",
    "Date",
    "Amount",
    "Updated Balance",
    "Description",
    "Wallet ID",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to flush CSV writer: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    /// Only the rows currently on screen.
    Page,
    /// Every row matching the current filter and sort.
    All,
}

impl ExportScope {
    pub fn filename(self) -> &'static str {
        match self {
            Self::Page => PAGE_EXPORT_FILENAME,
            Self::All => ALL_EXPORT_FILENAME,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: &'static str,
    pub contents: String,
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    kind: &'static str,
    date: String,
    amount: String,
    balance: String,
    description: &'a str,
    wallet_id: &'a str,
}

impl<'a> From<&'a Transaction> for ExportRow<'a> {
    fn from(tx: &'a Transaction) -> Self {
        Self {
            kind: tx.kind().label(),
            date: tx.date.format("%-m/%-d/%Y").to_string(),
            amount: fixed_2(tx.amount.abs()),
            balance: fixed_2(tx.balance),
            description: &tx.description,
            wallet_id: tx.wallet_id.as_str(),
        }
    }
}

/// Writes the header and one row per transaction, keeping the given order.
pub fn write_transactions<'a, W>(
    output: &mut W,
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Result<(), ExportError>
where
    W: Write,
{
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(output);
    writer.write_record(HEADERS)?;
    for tx in transactions {
        writer.serialize(ExportRow::from(tx))?;
    }
    writer.flush()?;
    Ok(())
}

/// Renders transactions as newline-joined CSV text without a trailing newline.
pub fn render_csv<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_transactions(&mut buffer, transactions)?;
    let mut text = String::from_utf8(buffer)?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

pub fn export_page(page: &TransactionPage) -> Result<ExportFile, ExportError> {
    Ok(ExportFile {
        filename: ExportScope::Page.filename(),
        contents: render_csv(&page.data)?,
    })
}

/// Re-queries every row matching `query`'s filter and sort, using the
/// total count the current view reported.
pub async fn export_all<S>(
    store: &S,
    query: &TransactionQuery,
    total_count: u64,
) -> Result<ExportFile, LedgerError>
where
    S: LedgerStore + ?Sized,
{
    let contents = if total_count == 0 {
        render_csv(std::iter::empty())?
    } else {
        let page = store.query_transactions(&query.covering(total_count)).await?;
        render_csv(&page.data)?
    };
    Ok(ExportFile {
        filename: ExportScope::All.filename(),
        contents,
    })
}

fn fixed_2(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.2}")
}

/// Human-readable amount with thousands separators and four fractional digits.
pub fn format_amount(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.4}", rounded.abs());
    let (integer, fraction) = text.split_once('.').unwrap_or((text.as_str(), "0000"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{fraction}")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::wallet::{TransactionId, WalletId};

    fn tx(amount: Decimal, balance: Decimal, description: &str) -> Transaction {
        Transaction {
            id: TransactionId::new("t1"),
            wallet_id: WalletId::new("w1"),
            amount,
            balance,
            description: description.to_string(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 15, 30, 0).unwrap(),
        }
    }

    #[test]
    fn print_transactions() {
        let rows = [
            tx(Decimal::new(-10_00, 2), Decimal::new(90_00, 2), "x"),
            tx(Decimal::new(25_1250, 4), Decimal::new(115_1250, 4), "salary"),
        ];
        let csv = render_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            [
                "Type,Date,Amount,Updated Balance,Description,Wallet ID",
                "Debit,1/1/2024,10.00,90.00,x,w1",
                "Credit,1/1/2024,25.13,115.13,salary,w1",
            ]
        );
        assert!(!csv.ends_with('\n'));
    }

    #[test]
    fn empty_export_keeps_the_header() {
        let csv = render_csv(std::iter::empty()).unwrap();
        assert_eq!(csv, "Type,Date,Amount,Updated Balance,Description,Wallet ID");
    }

    #[test]
    fn descriptions_with_commas_are_quoted() {
        let csv = render_csv(&[tx(Decimal::ONE, Decimal::ONE, "coffee, large")]).unwrap();
        assert_eq!(
            csv.lines().nth(1),
            Some("Credit,1/1/2024,1.00,1.00,\"coffee, large\",w1")
        );
    }

    #[test]
    fn page_export_uses_page_filename() {
        let page = TransactionPage {
            page: 1,
            size: 10,
            total_count: 1,
            data: vec![tx(Decimal::new(-10, 0), Decimal::new(90, 0), "x")],
        };
        let file = export_page(&page).unwrap();
        assert_eq!(file.filename, "page_transactions.csv");
        assert_eq!(file.contents.lines().count(), 2);
    }

    #[test]
    fn display_amounts() {
        assert_eq!(format_amount(Decimal::new(1_234_567_5, 1)), "1,234,567.5000");
        assert_eq!(format_amount(Decimal::new(-150_5, 1)), "-150.5000");
        assert_eq!(format_amount(Decimal::new(999, 0)), "999.0000");
        assert_eq!(format_amount(Decimal::ZERO), "0.0000");
    }
}
