use std::{
    cmp::Ordering,
    fmt,
    str::FromStr,
    sync::atomic::{self, AtomicU64},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wallet::{Transaction, WalletId};

pub const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Date,
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Amount => "amount",
        }
    }
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Page size must be greater than zero")]
    ZeroLimit,
    #[error("Unknown sort field `{0}`, expected `date` or `amount`")]
    UnknownSortField(String),
    #[error("Unknown sort order `{0}`, expected `asc` or `desc`")]
    UnknownSortOrder(String),
}

impl FromStr for SortField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "date" => Ok(Self::Date),
            "amount" => Ok(Self::Amount),
            _ => Err(QueryError::UnknownSortField(s.to_owned())),
        }
    }
}

impl FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascend" => Ok(Self::Asc),
            "desc" | "descend" => Ok(Self::Desc),
            _ => Err(QueryError::UnknownSortOrder(s.to_owned())),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter, sort and pagination parameters for one page of a wallet's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    pub wallet_id: WalletId,
    pub skip: u64,
    pub limit: u64,
    pub search: Option<String>,
    pub sort_field: Option<SortField>,
    pub sort_order: Option<SortOrder>,
}

impl TransactionQuery {
    pub fn new(wallet_id: WalletId) -> Self {
        Self {
            wallet_id,
            skip: 0,
            limit: DEFAULT_PAGE_SIZE,
            search: None,
            sort_field: None,
            sort_order: None,
        }
    }

    /// Query for a 1-based page number.
    pub fn for_page(wallet_id: WalletId, page: u64, size: u64) -> Self {
        Self {
            skip: page.saturating_sub(1).saturating_mul(size),
            limit: size,
            ..Self::new(wallet_id)
        }
    }

    /// Sets the search text; blank text clears the filter.
    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = if text.trim().is_empty() {
            None
        } else {
            Some(text)
        };
        self
    }

    pub fn sorted_by(mut self, field: SortField, order: Option<SortOrder>) -> Self {
        self.sort_field = Some(field);
        self.sort_order = order;
        self
    }

    /// Same filter and sort, covering `limit` rows from the first one.
    pub fn covering(&self, limit: u64) -> Self {
        Self {
            skip: 0,
            limit,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.limit == 0 {
            return Err(QueryError::ZeroLimit);
        }
        Ok(())
    }

    /// Most recent first unless told otherwise. An order without a field
    /// applies to the date.
    pub fn effective_sort(&self) -> (SortField, SortOrder) {
        (
            self.sort_field.unwrap_or(SortField::Date),
            self.sort_order.unwrap_or(SortOrder::Desc),
        )
    }

    pub fn page_number(&self) -> u64 {
        if self.limit == 0 {
            1
        } else {
            self.skip / self.limit + 1
        }
    }

    /// Case-insensitive substring match on description, amount or balance.
    pub fn matches(&self, tx: &Transaction) -> bool {
        let Some(search) = self.search.as_deref() else {
            return true;
        };
        let needle = search.trim().to_lowercase();
        tx.description.to_lowercase().contains(&needle)
            || tx.amount.to_string().contains(&needle)
            || tx.balance.to_string().contains(&needle)
    }

    pub(crate) fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("walletId", self.wallet_id.to_string()),
            ("skip", self.skip.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(search) = &self.search {
            params.push(("search", search.clone()));
        }
        if let Some(field) = self.sort_field {
            params.push(("sortField", field.to_string()));
        }
        if let Some(order) = self.sort_order {
            params.push(("sortOrder", order.to_string()));
        }
        params
    }

    fn compare(&self, a: &Transaction, b: &Transaction) -> Ordering {
        let (field, order) = self.effective_sort();
        let by_key = match field {
            SortField::Date => a.date.cmp(&b.date),
            SortField::Amount => a.amount.cmp(&b.amount),
        };
        let by_key = match order {
            SortOrder::Asc => by_key,
            SortOrder::Desc => by_key.reverse(),
        };
        // ties always resolve by ascending id so pages never overlap
        by_key.then_with(|| a.id.cmp(&b.id))
    }
}

/// One page of query results plus the size of the whole matching set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub size: u64,
    pub total_count: u64,
    pub data: Vec<Transaction>,
}

impl TransactionPage {
    pub fn empty(query: &TransactionQuery) -> Self {
        Self {
            page: query.page_number(),
            size: query.limit,
            total_count: 0,
            data: Vec::new(),
        }
    }
}

/// Runs a query over an in-memory transaction set.
pub fn execute<'a>(
    query: &TransactionQuery,
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Result<TransactionPage, QueryError> {
    query.validate()?;
    let mut matching: Vec<&Transaction> = transactions
        .into_iter()
        .filter(|tx| tx.wallet_id == query.wallet_id && query.matches(tx))
        .collect();
    matching.sort_by(|a, b| query.compare(a, b));

    let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
    let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
    Ok(TransactionPage {
        page: query.page_number(),
        size: query.limit,
        total_count: matching.len() as u64,
        data: matching
            .into_iter()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect(),
    })
}

/// Hands out tickets so that a response to a superseded request can be
/// recognised and dropped.
#[derive(Debug, Default)]
pub struct QueryTracker {
    latest: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTicket(u64);

impl QueryTracker {
    pub fn begin(&self) -> QueryTicket {
        QueryTicket(self.latest.fetch_add(1, atomic::Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: QueryTicket) -> bool {
        self.latest.load(atomic::Ordering::SeqCst) == ticket.0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::*;
    use crate::wallet::TransactionId;

    fn tx(id: &str, day: u32, amount: i64, description: &str) -> Transaction {
        Transaction {
            id: TransactionId::new(id),
            wallet_id: WalletId::new("w1"),
            amount: Decimal::new(amount * 10_000, 4),
            balance: Decimal::new(1_000_0000 + amount * 10_000, 4),
            description: description.to_string(),
            date: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("a", 1, 25, "Coffee shop purchase"),
            tx("b", 2, -40, "Grocery shopping"),
            tx("c", 2, 25, "Salary"),
            tx("d", 3, -7, "coffee beans"),
            tx("e", 4, 300, "Bonus"),
        ]
    }

    fn ids(page: &TransactionPage) -> Vec<&str> {
        page.data.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn default_order_is_most_recent_first() {
        let data = sample();
        let page = execute(&TransactionQuery::new(WalletId::new("w1")), &data).unwrap();
        // b and c share a date and fall back to ascending id
        assert_eq!(ids(&page), ["e", "d", "b", "c", "a"]);
        assert_eq!(page.total_count, 5);
        assert_eq!(page.page, 1);
        assert_eq!(page.size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn sort_by_amount_with_tie_break() {
        let data = sample();
        let query = TransactionQuery::new(WalletId::new("w1"))
            .sorted_by(SortField::Amount, Some(SortOrder::Asc));
        assert_eq!(ids(&execute(&query, &data).unwrap()), ["b", "d", "a", "c", "e"]);

        let query = query.sorted_by(SortField::Amount, Some(SortOrder::Desc));
        // equal amounts still ascend by id
        assert_eq!(ids(&execute(&query, &data).unwrap()), ["e", "a", "c", "d", "b"]);
    }

    #[test]
    fn pages_partition_the_result() {
        let data = sample();
        let mut seen = Vec::new();
        for page in 1..=3 {
            let query = TransactionQuery::for_page(WalletId::new("w1"), page, 2);
            let result = execute(&query, &data).unwrap();
            assert_eq!(result.total_count, 5);
            assert_eq!(result.page, page);
            seen.extend(result.data.into_iter().map(|t| t.id));
        }
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(seen.len(), 5);
        assert_eq!(unique.len(), 5);
        let all = execute(&TransactionQuery::new(WalletId::new("w1")), &data).unwrap();
        assert_eq!(seen, all.data.into_iter().map(|t| t.id).collect::<Vec<_>>());
    }

    #[test]
    fn search_is_case_insensitive_and_covers_numbers() {
        let data = sample();
        let query = TransactionQuery::new(WalletId::new("w1")).with_search("COFFEE");
        let page = execute(&query, &data).unwrap();
        assert_eq!(ids(&page), ["d", "a"]);
        assert_eq!(page.total_count, 2);

        let query = TransactionQuery::new(WalletId::new("w1")).with_search("300");
        assert_eq!(ids(&execute(&query, &data).unwrap()), ["e"]);

        // matches the balance snapshot 960.0000 of "b"
        let query = TransactionQuery::new(WalletId::new("w1")).with_search("960");
        assert_eq!(ids(&execute(&query, &data).unwrap()), ["b"]);

        let query = TransactionQuery::new(WalletId::new("w1")).with_search("   ");
        assert_eq!(query.search, None);
    }

    #[test]
    fn unknown_wallet_yields_empty_page() {
        let data = sample();
        let page = execute(&TransactionQuery::new(WalletId::new("nope")), &data).unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.total_count, 0);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let query = TransactionQuery::for_page(WalletId::new("w1"), 1, 0);
        assert_eq!(execute(&query, &Vec::new()).unwrap_err(), QueryError::ZeroLimit);
    }

    #[test]
    fn query_params() {
        let query = TransactionQuery::for_page(WalletId::new("w1"), 3, 20)
            .with_search("rent")
            .sorted_by(SortField::Amount, Some(SortOrder::Asc));
        assert_eq!(
            query.to_params(),
            vec![
                ("walletId", "w1".to_string()),
                ("skip", "40".to_string()),
                ("limit", "20".to_string()),
                ("search", "rent".to_string()),
                ("sortField", "amount".to_string()),
                ("sortOrder", "asc".to_string()),
            ]
        );
        assert_eq!("Descend".parse::<SortOrder>(), Ok(SortOrder::Desc));
        assert!("size".parse::<SortField>().is_err());
    }

    #[test]
    fn only_latest_ticket_is_current() {
        let tracker = QueryTracker::default();
        let first = tracker.begin();
        assert!(tracker.is_current(first));
        let second = tracker.begin();
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
    }
}
