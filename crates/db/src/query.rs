//! Query building for catalog listings.
//!
//! Raw listing parameters ([`BookListParams`], [`RecordListParams`]) come in
//! as loosely typed strings straight off a query string. [`build`] turns them
//! into a [`BookQuery`] / [`RecordQuery`]: a conjunction of filters, one
//! allow-listed sort key and a page window. Stores evaluate those queries and
//! hand back a [`Page`] with its [`Pagination`] metadata.
//!
//! Parsing is lenient where the old clients relied on it: non-numeric page
//! numbers fall back to defaults, blank filters and unknown status values are
//! ignored. Sorting is strict: an unknown `sort_by` or `sort_order` is an
//! error.
//!
//! [`build`]: BookListParams::build

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Book, BookId, BorrowRecord, BorrowStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid sort_by '{field}'; expected one of: {}", .allowed.join(", "))]
    UnknownSortField {
        field: String,
        allowed: &'static [&'static str],
    },

    #[error("invalid sort_order '{0}'; expected asc or desc")]
    InvalidSortOrder(String),
}

/// Page size bounds applied to every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_per_page: 10,
            max_per_page: 100,
        }
    }
}

/// A 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32, limits: &PageLimits) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, limits.max_per_page.max(1)),
        }
    }

    /// Parse raw query-string values, falling back to defaults on garbage.
    pub fn parse(page: Option<&str>, per_page: Option<&str>, limits: &PageLimits) -> Self {
        let page = page
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(1);
        let per_page = per_page
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(i64::from(limits.default_per_page));

        Self::new(
            page.clamp(1, i64::from(u32::MAX)) as u32,
            per_page.clamp(1, i64::from(u32::MAX)) as u32,
            limits,
        )
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.per_page as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

impl Pagination {
    pub fn new(total: u64, request: PageRequest) -> Self {
        let per_page = u64::from(request.per_page.max(1));
        let pages = u32::try_from(total.div_ceil(per_page)).unwrap_or(u32::MAX);
        let has_next = request.page < pages;
        let has_prev = request.page > 1;

        Self {
            total,
            page: request.page,
            per_page: request.per_page,
            pages,
            has_next,
            has_prev,
            next_page: has_next.then(|| request.page + 1),
            prev_page: has_prev.then(|| request.page - 1),
        }
    }
}

/// One page of results. A page past the end is empty, never an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    /// Cut the requested window out of an already filtered and sorted list.
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let pagination = Pagination::new(all.len() as u64, request);
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.per_page as usize)
            .collect();
        Self { items, pagination }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(QueryError::InvalidSortOrder(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookSortField {
    Title,
    Author,
    #[default]
    CreatedAt,
    Isbn,
    Quantity,
    Available,
}

impl BookSortField {
    pub const ALLOWED: &'static [&'static str] = &[
        "title",
        "author",
        "created_at",
        "isbn",
        "quantity",
        "available",
    ];

    fn compare(self, a: &Book, b: &Book) -> Ordering {
        match self {
            BookSortField::Title => cmp_text(&a.title, &b.title),
            BookSortField::Author => cmp_text(&a.author, &b.author),
            BookSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            BookSortField::Isbn => a.isbn.cmp(&b.isbn),
            BookSortField::Quantity => a.quantity.cmp(&b.quantity),
            BookSortField::Available => a.available.cmp(&b.available),
        }
    }
}

impl FromStr for BookSortField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "title" => Ok(BookSortField::Title),
            "author" => Ok(BookSortField::Author),
            "created_at" => Ok(BookSortField::CreatedAt),
            "isbn" => Ok(BookSortField::Isbn),
            "quantity" => Ok(BookSortField::Quantity),
            "available" => Ok(BookSortField::Available),
            other => Err(QueryError::UnknownSortField {
                field: other.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordSortField {
    #[default]
    BorrowDate,
    ReturnDate,
    BorrowerName,
    BorrowerEmail,
    Status,
}

impl RecordSortField {
    pub const ALLOWED: &'static [&'static str] = &[
        "borrow_date",
        "return_date",
        "borrower_name",
        "borrower_email",
        "status",
    ];

    fn compare(self, a: &BorrowRecord, b: &BorrowRecord) -> Ordering {
        match self {
            RecordSortField::BorrowDate => a.borrow_date.cmp(&b.borrow_date),
            // Open loans (no return date) order before closed ones.
            RecordSortField::ReturnDate => a.return_date.cmp(&b.return_date),
            RecordSortField::BorrowerName => cmp_text(&a.borrower_name, &b.borrower_name),
            RecordSortField::BorrowerEmail => cmp_text(&a.borrower_email, &b.borrower_email),
            RecordSortField::Status => a.status.cmp(&b.status),
        }
    }
}

impl FromStr for RecordSortField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "borrow_date" => Ok(RecordSortField::BorrowDate),
            "return_date" => Ok(RecordSortField::ReturnDate),
            "borrower_name" => Ok(RecordSortField::BorrowerName),
            "borrower_email" => Ok(RecordSortField::BorrowerEmail),
            "status" => Ok(RecordSortField::Status),
            other => Err(QueryError::UnknownSortField {
                field: other.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sort<F> {
    pub field: F,
    pub order: SortOrder,
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn contains_folded(haystack: &str, folded_needle: &str) -> bool {
    haystack.to_lowercase().contains(folded_needle)
}

/// Trimmed, lowercased needle; `None` when the parameter is blank.
fn needle(raw: Option<&String>) -> Option<String> {
    raw.map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

fn parse_flag(raw: Option<&String>) -> bool {
    matches!(
        raw.map(|value| value.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    )
}

fn parse_sort<F>(sort_by: Option<&String>, sort_order: Option<&String>) -> Result<Sort<F>, QueryError>
where
    F: FromStr<Err = QueryError> + Default,
{
    let field = match sort_by.map(|raw| raw.trim()).filter(|raw| !raw.is_empty()) {
        Some(raw) => raw.parse()?,
        None => F::default(),
    };
    let order = match sort_order.map(|raw| raw.trim()).filter(|raw| !raw.is_empty()) {
        Some(raw) => raw.parse()?,
        None => SortOrder::default(),
    };
    Ok(Sort { field, order })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookFilter {
    /// Case-insensitive substring on the title; the needle is pre-folded.
    Title(String),
    Author(String),
    Isbn(String),
    AvailableOnly,
}

impl BookFilter {
    pub fn matches(&self, book: &Book) -> bool {
        match self {
            BookFilter::Title(needle) => contains_folded(&book.title, needle),
            BookFilter::Author(needle) => contains_folded(&book.author, needle),
            BookFilter::Isbn(needle) => contains_folded(&book.isbn, needle),
            BookFilter::AvailableOnly => book.available > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookQuery {
    pub filters: Vec<BookFilter>,
    pub sort: Sort<BookSortField>,
    pub page: PageRequest,
}

impl BookQuery {
    /// Every filter must hold.
    pub fn matches(&self, book: &Book) -> bool {
        self.filters.iter().all(|filter| filter.matches(book))
    }

    /// Total order: the sort key, then the id so equal keys are deterministic.
    pub fn compare(&self, a: &Book, b: &Book) -> Ordering {
        self.sort
            .order
            .apply(self.sort.field.compare(a, b).then_with(|| a.id.cmp(&b.id)))
    }
}

/// Raw `GET /books` parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookListParams {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub available_only: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl BookListParams {
    pub fn build(&self, limits: &PageLimits) -> Result<BookQuery, QueryError> {
        let mut filters = Vec::new();
        if let Some(needle) = needle(self.title.as_ref()) {
            filters.push(BookFilter::Title(needle));
        }
        if let Some(needle) = needle(self.author.as_ref()) {
            filters.push(BookFilter::Author(needle));
        }
        if let Some(needle) = needle(self.isbn.as_ref()) {
            filters.push(BookFilter::Isbn(needle));
        }
        if parse_flag(self.available_only.as_ref()) {
            filters.push(BookFilter::AvailableOnly);
        }

        Ok(BookQuery {
            filters,
            sort: parse_sort(self.sort_by.as_ref(), self.sort_order.as_ref())?,
            page: PageRequest::parse(self.page.as_deref(), self.per_page.as_deref(), limits),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    BorrowerName(String),
    BorrowerEmail(String),
    Status(BorrowStatus),
    Book(BookId),
}

impl RecordFilter {
    pub fn matches(&self, record: &BorrowRecord) -> bool {
        match self {
            RecordFilter::BorrowerName(needle) => contains_folded(&record.borrower_name, needle),
            RecordFilter::BorrowerEmail(needle) => contains_folded(&record.borrower_email, needle),
            RecordFilter::Status(status) => record.status == *status,
            RecordFilter::Book(book_id) => record.book_id == *book_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub filters: Vec<RecordFilter>,
    pub sort: Sort<RecordSortField>,
    pub page: PageRequest,
}

impl RecordQuery {
    pub fn matches(&self, record: &BorrowRecord) -> bool {
        self.filters.iter().all(|filter| filter.matches(record))
    }

    pub fn compare(&self, a: &BorrowRecord, b: &BorrowRecord) -> Ordering {
        self.sort
            .order
            .apply(self.sort.field.compare(a, b).then_with(|| a.id.cmp(&b.id)))
    }
}

/// Raw `GET /borrow-records` parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordListParams {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub status: Option<String>,
    pub borrower_name: Option<String>,
    pub borrower_email: Option<String>,
    pub book_id: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl RecordListParams {
    pub fn build(&self, limits: &PageLimits) -> Result<RecordQuery, QueryError> {
        let mut filters = Vec::new();
        if let Some(needle) = needle(self.borrower_name.as_ref()) {
            filters.push(RecordFilter::BorrowerName(needle));
        }
        if let Some(needle) = needle(self.borrower_email.as_ref()) {
            filters.push(RecordFilter::BorrowerEmail(needle));
        }
        if let Some(status) = self.status.as_deref().and_then(|raw| raw.parse().ok()) {
            filters.push(RecordFilter::Status(status));
        }
        if let Some(book_id) = self.book_id.as_deref().and_then(|raw| raw.parse().ok()) {
            filters.push(RecordFilter::Book(book_id));
        }

        Ok(RecordQuery {
            filters,
            sort: parse_sort(self.sort_by.as_ref(), self.sort_order.as_ref())?,
            page: PageRequest::parse(self.page.as_deref(), self.per_page.as_deref(), limits),
        })
    }
}
