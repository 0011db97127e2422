//! In-process [`Store`] backed by hash maps behind a single async `RwLock`.
//!
//! Every commit validates and applies its batch while holding the write lock,
//! so readers see either the state before the batch or the state after it.
//! With a snapshot path configured the whole catalog is written out as JSON
//! after each commit (temp file, then rename) and read back by [`MemoryStore::open`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::model::{Book, BookId, BorrowRecord, RecordId, Versioned};
use crate::query::{BookQuery, Page, RecordQuery};
use crate::store::{CatalogTotals, Guard, Mutation, Store, WriteBatch};

#[derive(Debug, Default)]
struct Tables {
    books: HashMap<BookId, Versioned<Book>>,
    records: HashMap<RecordId, Versioned<BorrowRecord>>,
    isbn_index: HashMap<String, BookId>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    books: Vec<Book>,
    records: Vec<BorrowRecord>,
}

impl Tables {
    fn from_snapshot(snapshot: Snapshot) -> StoreResult<Self> {
        let mut tables = Tables::default();
        for book in snapshot.books {
            if tables.isbn_index.insert(book.isbn.clone(), book.id).is_some() {
                return Err(StoreError::Unique {
                    field: "isbn",
                    value: book.isbn,
                });
            }
            tables.books.insert(
                book.id,
                Versioned {
                    value: book,
                    revision: 1,
                },
            );
        }
        let mut outstanding: HashMap<BookId, u32> = HashMap::new();
        for record in snapshot.records.iter().filter(|r| r.is_outstanding()) {
            if !tables.books.contains_key(&record.book_id) {
                return Err(StoreError::Inconsistent {
                    id: record.book_id.to_string(),
                    reason: format!("outstanding loan {} has no book", record.id),
                });
            }
            *outstanding.entry(record.book_id).or_default() += 1;
        }
        for entry in tables.books.values() {
            let book = &entry.value;
            let borrowed = outstanding.get(&book.id).copied().unwrap_or(0);
            if book.available > book.quantity {
                return Err(StoreError::Inconsistent {
                    id: book.id.to_string(),
                    reason: format!(
                        "available {} exceeds quantity {}",
                        book.available, book.quantity
                    ),
                });
            }
            if book.quantity - book.available != borrowed {
                return Err(StoreError::Inconsistent {
                    id: book.id.to_string(),
                    reason: format!(
                        "{} copies out but {borrowed} outstanding loans",
                        book.quantity - book.available
                    ),
                });
            }
        }

        for record in snapshot.records {
            tables.records.insert(
                record.id,
                Versioned {
                    value: record,
                    revision: 1,
                },
            );
        }
        Ok(tables)
    }

    fn to_snapshot(&self) -> Snapshot {
        let mut books: Vec<Book> = self.books.values().map(|b| b.value.clone()).collect();
        books.sort_by_key(|book| book.id);
        let mut records: Vec<BorrowRecord> =
            self.records.values().map(|r| r.value.clone()).collect();
        records.sort_by_key(|record| record.id);
        Snapshot { books, records }
    }

    fn check(&self, guard: &Guard) -> StoreResult<()> {
        let (entity, id, expected, found) = match guard {
            Guard::Book { id, revision } => (
                "book",
                id.to_string(),
                *revision,
                self.books.get(id).map(|b| b.revision),
            ),
            Guard::Record { id, revision } => (
                "borrow record",
                id.to_string(),
                *revision,
                self.records.get(id).map(|r| r.revision),
            ),
        };

        if found == Some(expected) {
            Ok(())
        } else {
            Err(StoreError::Stale {
                entity,
                id,
                expected,
                found,
            })
        }
    }

    /// Dry-run the ISBN index changes of a batch without touching the tables.
    fn check_unique(&self, mutations: &[Mutation]) -> StoreResult<()> {
        // isbn -> owner, and book -> isbn, as they would be after each step.
        let mut owners: HashMap<&str, Option<BookId>> = HashMap::new();
        let mut isbn_of: HashMap<BookId, Option<&str>> = HashMap::new();

        for mutation in mutations {
            match mutation {
                Mutation::PutBook(book) => {
                    let owner = match owners.get(book.isbn.as_str()) {
                        Some(owner) => *owner,
                        None => self.isbn_index.get(&book.isbn).copied(),
                    };
                    if owner.is_some_and(|owner| owner != book.id) {
                        return Err(StoreError::Unique {
                            field: "isbn",
                            value: book.isbn.clone(),
                        });
                    }

                    let previous = self.current_isbn(&isbn_of, book.id);
                    if let Some(previous) = previous.filter(|isbn| *isbn != book.isbn) {
                        owners.insert(previous, None);
                    }
                    owners.insert(book.isbn.as_str(), Some(book.id));
                    isbn_of.insert(book.id, Some(book.isbn.as_str()));
                }
                Mutation::DeleteBook(id) => {
                    if let Some(previous) = self.current_isbn(&isbn_of, *id) {
                        owners.insert(previous, None);
                    }
                    isbn_of.insert(*id, None);
                }
                Mutation::PutRecord(_) => {}
            }
        }
        Ok(())
    }

    fn current_isbn<'a>(
        &'a self,
        overlay: &HashMap<BookId, Option<&'a str>>,
        id: BookId,
    ) -> Option<&'a str> {
        match overlay.get(&id) {
            Some(isbn) => *isbn,
            None => self.books.get(&id).map(|b| b.value.isbn.as_str()),
        }
    }

    fn apply(&mut self, mutations: Vec<Mutation>) {
        for mutation in mutations {
            match mutation {
                Mutation::PutBook(book) => {
                    let revision = match self.books.get(&book.id) {
                        Some(previous) => {
                            if previous.value.isbn != book.isbn {
                                self.isbn_index.remove(&previous.value.isbn);
                            }
                            previous.revision + 1
                        }
                        None => 1,
                    };
                    self.isbn_index.insert(book.isbn.clone(), book.id);
                    self.books.insert(
                        book.id,
                        Versioned {
                            value: book,
                            revision,
                        },
                    );
                }
                Mutation::PutRecord(record) => {
                    let revision = self
                        .records
                        .get(&record.id)
                        .map_or(1, |previous| previous.revision + 1);
                    self.records.insert(
                        record.id,
                        Versioned {
                            value: record,
                            revision,
                        },
                    );
                }
                Mutation::DeleteBook(id) => {
                    if let Some(previous) = self.books.remove(&id) {
                        self.isbn_index.remove(&previous.value.isbn);
                    }
                }
            }
        }
    }
}

/// Catalog store kept in memory, optionally mirrored to a JSON snapshot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// An empty, purely in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store mirrored to `path`, loading the snapshot if one exists.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => Tables::from_snapshot(serde_json::from_slice(&bytes)?)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(source) => return Err(StoreError::Snapshot { path, source }),
        };

        tracing::info!(
            target: "biblio-db",
            path = %path.display(),
            books = tables.books.len(),
            records = tables.records.len(),
            "catalog snapshot loaded"
        );

        Ok(Self {
            tables: RwLock::new(tables),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    async fn persist(path: &Path, tables: &Tables) -> StoreResult<()> {
        let io_err = |source| StoreError::Snapshot {
            path: path.to_path_buf(),
            source,
        };

        let bytes = serde_json::to_vec_pretty(&tables.to_snapshot())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn book(&self, id: BookId) -> StoreResult<Option<Versioned<Book>>> {
        Ok(self.tables.read().await.books.get(&id).cloned())
    }

    async fn record(&self, id: RecordId) -> StoreResult<Option<Versioned<BorrowRecord>>> {
        Ok(self.tables.read().await.records.get(&id).cloned())
    }

    async fn books(&self, ids: &[BookId]) -> StoreResult<HashMap<BookId, Book>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.books.get(id).map(|b| (*id, b.value.clone())))
            .collect())
    }

    async fn find_books(&self, query: &BookQuery) -> StoreResult<Page<Book>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<Book> = tables
            .books
            .values()
            .map(|b| &b.value)
            .filter(|book| query.matches(book))
            .cloned()
            .collect();
        drop(tables);

        matching.sort_by(|a, b| query.compare(a, b));
        Ok(Page::from_sorted(matching, query.page))
    }

    async fn find_records(&self, query: &RecordQuery) -> StoreResult<Page<BorrowRecord>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<BorrowRecord> = tables
            .records
            .values()
            .map(|r| &r.value)
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        drop(tables);

        matching.sort_by(|a, b| query.compare(a, b));
        Ok(Page::from_sorted(matching, query.page))
    }

    async fn outstanding_loans(&self, book: BookId) -> StoreResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .values()
            .filter(|r| r.value.book_id == book && r.value.is_outstanding())
            .count() as u64)
    }

    async fn totals(&self) -> StoreResult<CatalogTotals> {
        let tables = self.tables.read().await;
        let mut totals = CatalogTotals {
            titles: tables.books.len() as u64,
            records: tables.records.len() as u64,
            ..CatalogTotals::default()
        };
        for book in tables.books.values() {
            totals.copies += u64::from(book.value.quantity);
            totals.available += u64::from(book.value.available);
        }
        for record in tables.records.values() {
            if record.value.is_outstanding() {
                totals.borrowed += 1;
            } else {
                totals.returned += 1;
            }
        }
        Ok(totals)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        for guard in batch.guards() {
            tables.check(guard)?;
        }
        if batch.is_empty() {
            return Ok(());
        }
        tables.check_unique(batch.mutations())?;
        tables.apply(batch.into_mutations());

        if let Some(path) = &self.snapshot_path {
            // The in-memory state stays authoritative; the next commit retries.
            if let Err(err) = Self::persist(path, &tables).await {
                tracing::error!(target: "biblio-db", error = %err, "failed to write catalog snapshot");
            }
        }
        Ok(())
    }
}
