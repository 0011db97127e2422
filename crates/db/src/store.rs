use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::{Book, BookId, BorrowRecord, RecordId, Versioned};
use crate::query::{BookQuery, Page, RecordQuery};

/// Precondition checked before any mutation of a batch is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The book must still exist at exactly this revision.
    Book { id: BookId, revision: u64 },
    /// The record must still exist at exactly this revision.
    Record { id: RecordId, revision: u64 },
}

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert or replace a book. The ISBN index is kept unique.
    PutBook(Book),
    /// Insert or replace a borrow record.
    PutRecord(BorrowRecord),
    DeleteBook(BookId),
}

impl From<Book> for Mutation {
    fn from(book: Book) -> Self {
        Mutation::PutBook(book)
    }
}

impl From<BorrowRecord> for Mutation {
    fn from(record: BorrowRecord) -> Self {
        Mutation::PutRecord(record)
    }
}

/// Guards plus mutations, committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    guards: Vec<Guard>,
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the commit unless the book is still at the revision it was read at.
    pub fn guard_book(mut self, book: &Versioned<Book>) -> Self {
        self.guards.push(Guard::Book {
            id: book.value.id,
            revision: book.revision,
        });
        self
    }

    pub fn guard_record(mut self, record: &Versioned<BorrowRecord>) -> Self {
        self.guards.push(Guard::Record {
            id: record.value.id,
            revision: record.revision,
        });
        self
    }

    pub fn put(mut self, mutation: impl Into<Mutation>) -> Self {
        self.mutations.push(mutation.into());
        self
    }

    pub fn delete_book(mut self, id: BookId) -> Self {
        self.mutations.push(Mutation::DeleteBook(id));
        self
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Aggregate counts over the whole catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogTotals {
    pub titles: u64,
    pub copies: u64,
    pub available: u64,
    pub records: u64,
    pub borrowed: u64,
    pub returned: u64,
}

/// Data-access interface for the catalog.
///
/// Implementations apply each [`WriteBatch`] atomically: either every guard
/// holds and every mutation becomes visible at once, or nothing changes.
/// Concurrent readers never observe part of a batch.
#[async_trait]
pub trait Store: Send + Sync {
    async fn book(&self, id: BookId) -> StoreResult<Option<Versioned<Book>>>;

    async fn record(&self, id: RecordId) -> StoreResult<Option<Versioned<BorrowRecord>>>;

    /// Look up several books at once; unknown ids are simply absent.
    async fn books(&self, ids: &[BookId]) -> StoreResult<HashMap<BookId, Book>>;

    async fn find_books(&self, query: &BookQuery) -> StoreResult<Page<Book>>;

    async fn find_records(&self, query: &RecordQuery) -> StoreResult<Page<BorrowRecord>>;

    /// Number of records for `book` still in the borrowed state.
    async fn outstanding_loans(&self, book: BookId) -> StoreResult<u64>;

    async fn totals(&self) -> StoreResult<CatalogTotals>;

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}
