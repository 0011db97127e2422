//! Wire types of the library API as seen from the client.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub use biblio_db::{Book, BookId, BorrowRecord, BorrowStatus, Pagination, RecordId};

/// Query parameters of `GET /books`. Pairs are emitted in a fixed order so
/// equal filters always produce the same cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilters {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub available_only: bool,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl BookFilters {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        push(&mut pairs, "page", self.page.map(|p| p.to_string()));
        push(&mut pairs, "per_page", self.per_page.map(|p| p.to_string()));
        push(&mut pairs, "title", self.title.clone());
        push(&mut pairs, "author", self.author.clone());
        push(&mut pairs, "isbn", self.isbn.clone());
        if self.available_only {
            pairs.push(("available_only", "true".to_owned()));
        }
        push(&mut pairs, "sort_by", self.sort_by.clone());
        push(&mut pairs, "sort_order", self.sort_order.clone());
        pairs
    }
}

/// Query parameters of `GET /borrow-records`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilters {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<BorrowStatus>,
    pub borrower_name: Option<String>,
    pub borrower_email: Option<String>,
    pub book_id: Option<BookId>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl RecordFilters {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        push(&mut pairs, "page", self.page.map(|p| p.to_string()));
        push(&mut pairs, "per_page", self.per_page.map(|p| p.to_string()));
        push(&mut pairs, "status", self.status.map(|s| s.to_string()));
        push(&mut pairs, "borrower_name", self.borrower_name.clone());
        push(&mut pairs, "borrower_email", self.borrower_email.clone());
        push(&mut pairs, "book_id", self.book_id.map(|id| id.to_string()));
        push(&mut pairs, "sort_by", self.sort_by.clone());
        push(&mut pairs, "sort_order", self.sort_order.clone());
        pairs
    }
}

fn push(pairs: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        pairs.push((key, value));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BorrowRequest {
    pub book_id: BookId,
    pub borrower_name: String,
    pub borrower_email: String,
}

/// A borrow record with the title and author of its book, when the book
/// still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    #[serde(flatten)]
    pub record: BorrowRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookPage {
    pub books: Vec<Book>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPage {
    pub records: Vec<LoanRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookStatistics {
    pub total_titles: u64,
    pub total_copies: u64,
    pub available_copies: u64,
    pub borrowed_copies: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatistics {
    pub total: u64,
    pub borrowed: u64,
    pub returned: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub books: BookStatistics,
    pub borrow_records: RecordStatistics,
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub valid: bool,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    pub id: BookId,
}
