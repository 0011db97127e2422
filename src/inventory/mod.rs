//! Inventory rules: copy accounting for borrow and return, guarded deletes
//! and validated catalog edits.
//!
//! Every mutating operation reads the entities it depends on, decides, and
//! commits one [`WriteBatch`] guarded by the revisions it read. A guard that
//! no longer holds means another request won the race; the operation starts
//! over from a fresh read, up to `max_commit_retries` times.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use biblio_db::query::{BookListParams, RecordListParams};
use biblio_db::{
    Book, BookId, BorrowRecord, CatalogTotals, Page, PageLimits, QueryError, RecordId, Store,
    StoreError, WriteBatch,
};
use biblio_kernel::settings::CatalogSettings;

#[cfg(test)]
mod tests;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").unwrap());

/// One rejected input field, surfaced in error `details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub error: String,
}

impl FieldError {
    fn new(field: &'static str, error: impl Into<String>) -> Self {
        Self {
            field,
            error: error.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("A book with this ISBN already exists")]
    DuplicateIsbn,

    #[error("Book is not available for borrowing")]
    OutOfStock,

    #[error("Cannot delete book. {borrowed} copies are currently borrowed")]
    BookBorrowed { borrowed: u64 },

    #[error("Book has already been returned")]
    AlreadyReturned,

    #[error("catalog is busy, gave up after {attempts} attempts")]
    Contention { attempts: u32 },

    #[error(transparent)]
    Store(StoreError),
}

impl InventoryError {
    fn invalid(details: Vec<FieldError>) -> Self {
        let message = match details.as_slice() {
            [only] => only.error.clone(),
            _ => "Validation failed".to_string(),
        };
        Self::Validation { message, details }
    }

    fn invalid_field(field: &'static str, error: impl Into<String>) -> Self {
        Self::invalid(vec![FieldError::new(field, error)])
    }

    fn book_not_found(id: BookId) -> Self {
        Self::NotFound {
            entity: "Book",
            id: id.to_string(),
        }
    }

    fn record_not_found(id: RecordId) -> Self {
        Self::NotFound {
            entity: "Borrow record",
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for InventoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unique { field: "isbn", .. } => InventoryError::DuplicateIsbn,
            other => InventoryError::Store(other),
        }
    }
}

impl From<QueryError> for InventoryError {
    fn from(err: QueryError) -> Self {
        let field = match err {
            QueryError::UnknownSortField { .. } => "sort_by",
            QueryError::InvalidSortOrder(_) => "sort_order",
        };
        InventoryError::invalid_field(field, err.to_string())
    }
}

pub type InventoryResult<T> = Result<T, InventoryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryConfig {
    pub isbn_length: usize,
    pub max_commit_retries: u32,
    pub limits: PageLimits,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self::from(&CatalogSettings::default())
    }
}

impl From<&CatalogSettings> for InventoryConfig {
    fn from(settings: &CatalogSettings) -> Self {
        Self {
            isbn_length: settings.isbn_length,
            max_commit_retries: settings.max_commit_retries.max(1),
            limits: PageLimits {
                default_per_page: settings.default_per_page,
                max_per_page: settings.max_per_page,
            },
        }
    }
}

/// Input for [`Inventory::create_book`]. Quantity is signed so negative
/// input can be rejected as a validation error rather than a parse error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub quantity: i64,
}

/// Partial update; `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub quantity: Option<i64>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none() && self.isbn.is_none() && self.quantity.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowRequest {
    pub book_id: BookId,
    pub borrower_name: String,
    pub borrower_email: String,
}

/// A borrow record expanded with the title and author of its book. The
/// expansion is absent once the book has been deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: BorrowRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_author: Option<String>,
}

impl RecordView {
    fn new(record: BorrowRecord, book: Option<&Book>) -> Self {
        Self {
            record,
            book_title: book.map(|b| b.title.clone()),
            book_author: book.map(|b| b.author.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookStatistics {
    pub total_titles: u64,
    pub total_copies: u64,
    pub available_copies: u64,
    pub borrowed_copies: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordStatistics {
    pub total: u64,
    pub borrowed: u64,
    pub returned: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub books: BookStatistics,
    pub borrow_records: RecordStatistics,
}

impl From<CatalogTotals> for Statistics {
    fn from(totals: CatalogTotals) -> Self {
        Self {
            books: BookStatistics {
                total_titles: totals.titles,
                total_copies: totals.copies,
                available_copies: totals.available,
                borrowed_copies: totals.borrowed,
            },
            borrow_records: RecordStatistics {
                total: totals.records,
                borrowed: totals.borrowed,
                returned: totals.returned,
            },
        }
    }
}

/// The catalog service shared by every HTTP module.
#[derive(Clone)]
pub struct Inventory {
    store: Arc<dyn Store>,
    config: InventoryConfig,
}

impl Inventory {
    pub fn new(store: Arc<dyn Store>, config: InventoryConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub async fn create_book(&self, input: NewBook) -> InventoryResult<Book> {
        let mut errors = Vec::new();
        let title = required_text("title", &input.title, &mut errors);
        let author = required_text("author", &input.author, &mut errors);
        let isbn = self.checked_isbn(&input.isbn, &mut errors);
        let quantity = checked_quantity(input.quantity, &mut errors);
        if !errors.is_empty() {
            return Err(InventoryError::invalid(errors));
        }

        let book = Book::new(title, author, isbn, quantity);
        self.store.commit(WriteBatch::new().put(book.clone())).await?;

        tracing::info!(book_id = %book.id, isbn = %book.isbn, "book created");
        Ok(book)
    }

    pub async fn get_book(&self, id: BookId) -> InventoryResult<Book> {
        self.store
            .book(id)
            .await?
            .map(|b| b.into_inner())
            .ok_or_else(|| InventoryError::book_not_found(id))
    }

    pub async fn update_book(&self, id: BookId, patch: BookPatch) -> InventoryResult<Book> {
        if patch.is_empty() {
            return Err(InventoryError::invalid(vec![FieldError::new(
                "body",
                "No data provided",
            )]));
        }

        let mut errors = Vec::new();
        let title = patch
            .title
            .as_deref()
            .map(|title| required_text("title", title, &mut errors));
        let author = patch
            .author
            .as_deref()
            .map(|author| required_text("author", author, &mut errors));
        let isbn = patch
            .isbn
            .as_deref()
            .map(|isbn| self.checked_isbn(isbn, &mut errors));
        let quantity = patch
            .quantity
            .map(|quantity| checked_quantity(quantity, &mut errors));
        if !errors.is_empty() {
            return Err(InventoryError::invalid(errors));
        }

        let patch = &(title, author, isbn, quantity);
        let book = self
            .retrying("update_book", move || async move {
                let (title, author, isbn, quantity) = patch;
                let current = self
                    .store
                    .book(id)
                    .await?
                    .ok_or_else(|| InventoryError::book_not_found(id))?;

                let mut book = current.value.clone();
                if let Some(title) = title {
                    book.title = title.clone();
                }
                if let Some(author) = author {
                    book.author = author.clone();
                }
                if let Some(isbn) = isbn {
                    book.isbn = isbn.clone();
                }
                if let Some(quantity) = *quantity {
                    let borrowed = book.borrowed();
                    if quantity < borrowed {
                        return Err(InventoryError::invalid_field(
                            "quantity",
                            format!(
                                "Cannot reduce quantity. {borrowed} copies are currently borrowed"
                            ),
                        ));
                    }
                    book.quantity = quantity;
                    book.available = quantity - borrowed;
                }
                book.updated_at = OffsetDateTime::now_utc();

                self.store
                    .commit(WriteBatch::new().guard_book(&current).put(book.clone()))
                    .await?;
                Ok(book)
            })
            .await?;

        tracing::info!(book_id = %id, quantity = book.quantity, available = book.available, "book updated");
        Ok(book)
    }

    pub async fn delete_book(&self, id: BookId) -> InventoryResult<()> {
        self.retrying("delete_book", move || async move {
            let current = self
                .store
                .book(id)
                .await?
                .ok_or_else(|| InventoryError::book_not_found(id))?;

            let borrowed = self.store.outstanding_loans(id).await?;
            if borrowed > 0 {
                tracing::warn!(book_id = %id, borrowed, "refusing to delete borrowed book");
                return Err(InventoryError::BookBorrowed { borrowed });
            }

            // The guard fails if a borrow lands between the count and the delete.
            self.store
                .commit(WriteBatch::new().guard_book(&current).delete_book(id))
                .await?;
            Ok(())
        })
        .await?;

        tracing::info!(book_id = %id, "book deleted");
        Ok(())
    }

    pub async fn list_books(&self, params: &BookListParams) -> InventoryResult<Page<Book>> {
        let query = params.build(&self.config.limits)?;
        Ok(self.store.find_books(&query).await?)
    }

    pub async fn borrow(&self, request: BorrowRequest) -> InventoryResult<RecordView> {
        let mut errors = Vec::new();
        let name = required_text("borrower_name", &request.borrower_name, &mut errors);
        let email = required_text("borrower_email", &request.borrower_email, &mut errors);
        if !email.is_empty() && !EMAIL.is_match(&email) {
            errors.push(FieldError::new("borrower_email", "Invalid email format"));
        }
        if !errors.is_empty() {
            return Err(InventoryError::invalid(errors));
        }

        let book_id = request.book_id;
        let (name, email) = (&name, &email);
        let view = self
            .retrying("borrow", move || async move {
                let current = self
                    .store
                    .book(book_id)
                    .await?
                    .ok_or_else(|| InventoryError::book_not_found(book_id))?;
                if current.value.available == 0 {
                    tracing::warn!(book_id = %book_id, "borrow rejected, no copies available");
                    return Err(InventoryError::OutOfStock);
                }

                let mut book = current.value.clone();
                book.available -= 1;
                book.updated_at = OffsetDateTime::now_utc();
                let record = BorrowRecord::open(book_id, name.as_str(), email.as_str());

                self.store
                    .commit(
                        WriteBatch::new()
                            .guard_book(&current)
                            .put(book.clone())
                            .put(record.clone()),
                    )
                    .await?;
                Ok(RecordView::new(record, Some(&book)))
            })
            .await?;

        tracing::info!(record_id = %view.record.id, book_id = %book_id, "book borrowed");
        Ok(view)
    }

    pub async fn return_book(&self, id: RecordId) -> InventoryResult<RecordView> {
        let view = self
            .retrying("return_book", move || async move {
                let current = self
                    .store
                    .record(id)
                    .await?
                    .ok_or_else(|| InventoryError::record_not_found(id))?;
                if !current.value.is_outstanding() {
                    return Err(InventoryError::AlreadyReturned);
                }

                let now = OffsetDateTime::now_utc();
                let mut record = current.value.clone();
                record.close(now);
                let mut batch = WriteBatch::new().guard_record(&current).put(record.clone());

                let book = match self.store.book(record.book_id).await? {
                    Some(shelved) => {
                        let mut book = shelved.value.clone();
                        book.available = (book.available + 1).min(book.quantity);
                        book.updated_at = now;
                        batch = batch.guard_book(&shelved).put(book.clone());
                        Some(book)
                    }
                    None => None,
                };

                self.store.commit(batch).await?;
                Ok(RecordView::new(record, book.as_ref()))
            })
            .await?;

        tracing::info!(record_id = %id, book_id = %view.record.book_id, "book returned");
        Ok(view)
    }

    pub async fn get_record(&self, id: RecordId) -> InventoryResult<RecordView> {
        let record = self
            .store
            .record(id)
            .await?
            .ok_or_else(|| InventoryError::record_not_found(id))?
            .into_inner();
        let book = self.store.book(record.book_id).await?;
        Ok(RecordView::new(record, book.as_ref().map(|b| &b.value)))
    }

    pub async fn list_records(&self, params: &RecordListParams) -> InventoryResult<Page<RecordView>> {
        let query = params.build(&self.config.limits)?;
        let page = self.store.find_records(&query).await?;

        let ids: Vec<BookId> = page
            .items
            .iter()
            .map(|record| record.book_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let books = self.store.books(&ids).await?;

        Ok(page.map(|record| {
            let book = books.get(&record.book_id);
            RecordView::new(record, book)
        }))
    }

    pub async fn statistics(&self) -> InventoryResult<Statistics> {
        Ok(self.store.totals().await?.into())
    }

    fn checked_isbn(&self, raw: &str, errors: &mut Vec<FieldError>) -> String {
        let isbn = raw.trim();
        let length = self.config.isbn_length;
        if isbn.len() != length || !isbn.bytes().all(|b| b.is_ascii_digit()) {
            errors.push(FieldError::new(
                "isbn",
                format!("ISBN must be exactly {length} digits"),
            ));
        }
        isbn.to_string()
    }

    /// Run `attempt` until it commits, retrying only on stale guards.
    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> InventoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = InventoryResult<T>>,
    {
        let attempts = self.config.max_commit_retries;
        for n in 1..=attempts {
            match attempt().await {
                Err(InventoryError::Store(err)) if err.is_retryable() => {
                    tracing::debug!(operation, attempt = n, error = %err, "commit lost a race, retrying");
                }
                outcome => return outcome,
            }
        }

        tracing::warn!(operation, attempts, "giving up after repeated commit conflicts");
        Err(InventoryError::Contention { attempts })
    }
}

fn required_text(field: &'static str, raw: &str, errors: &mut Vec<FieldError>) -> String {
    let value = raw.trim();
    if value.is_empty() {
        errors.push(FieldError::new(field, format!("{field} is required")));
    }
    value.to_string()
}

fn checked_quantity(raw: i64, errors: &mut Vec<FieldError>) -> u32 {
    match u32::try_from(raw) {
        Ok(quantity) => quantity,
        Err(_) => {
            errors.push(FieldError::new(
                "quantity",
                "Quantity must be a non-negative integer",
            ));
            0
        }
    }
}
