use std::collections::HashMap;

use async_trait::async_trait;
use biblio_db::{BookQuery, CatalogTotals, MemoryStore, RecordQuery, StoreResult, Versioned};

use super::*;

fn inventory() -> Inventory {
    Inventory::new(Arc::new(MemoryStore::new()), InventoryConfig::default())
}

fn dune(quantity: i64) -> NewBook {
    NewBook {
        title: "Dune".into(),
        author: "Frank Herbert".into(),
        isbn: "9780441172719".into(),
        quantity,
    }
}

fn loan(book_id: BookId, name: &str) -> BorrowRequest {
    BorrowRequest {
        book_id,
        borrower_name: name.into(),
        borrower_email: format!("{}@example.com", name.to_lowercase()),
    }
}

fn assert_validation(err: InventoryError, field: &str) {
    match err {
        InventoryError::Validation { details, .. } => {
            assert!(
                details.iter().any(|d| d.field == field),
                "expected a {field} error, got {details:?}"
            );
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn create_trims_and_fills_available() {
    let inventory = inventory();
    let book = inventory
        .create_book(NewBook {
            title: "  Dune ".into(),
            ..dune(3)
        })
        .await
        .unwrap();

    assert_eq!(book.title, "Dune");
    assert_eq!(book.quantity, 3);
    assert_eq!(book.available, 3);
    assert_eq!(inventory.get_book(book.id).await.unwrap(), book);
}

#[tokio::test]
async fn create_accepts_zero_copies() {
    let book = inventory().create_book(dune(0)).await.unwrap();
    assert_eq!(book.available, 0);
}

#[tokio::test]
async fn create_rejects_bad_input() {
    let inventory = inventory();

    let short_isbn = inventory
        .create_book(NewBook {
            isbn: "12345".into(),
            ..dune(1)
        })
        .await
        .unwrap_err();
    assert_validation(short_isbn, "isbn");

    let letters = inventory
        .create_book(NewBook {
            isbn: "97804411727X9".into(),
            ..dune(1)
        })
        .await
        .unwrap_err();
    assert_validation(letters, "isbn");

    assert_validation(inventory.create_book(dune(-1)).await.unwrap_err(), "quantity");

    let blank = inventory
        .create_book(NewBook {
            title: "   ".into(),
            author: String::new(),
            ..dune(1)
        })
        .await
        .unwrap_err();
    match blank {
        InventoryError::Validation { message, details } => {
            assert_eq!(message, "Validation failed");
            assert_eq!(details.len(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(inventory.statistics().await.unwrap().books.total_titles, 0);
}

#[tokio::test]
async fn create_rejects_duplicate_isbn() {
    let inventory = inventory();
    inventory.create_book(dune(1)).await.unwrap();
    let err = inventory.create_book(dune(2)).await.unwrap_err();
    assert!(matches!(err, InventoryError::DuplicateIsbn));
}

#[tokio::test]
async fn borrow_and_return_move_one_copy() {
    let inventory = inventory();
    let book = inventory.create_book(dune(2)).await.unwrap();

    let view = inventory.borrow(loan(book.id, "Ann")).await.unwrap();
    assert_eq!(view.record.status, biblio_db::BorrowStatus::Borrowed);
    assert_eq!(view.book_title.as_deref(), Some("Dune"));
    assert_eq!(inventory.get_book(book.id).await.unwrap().available, 1);

    let returned = inventory.return_book(view.record.id).await.unwrap();
    assert_eq!(returned.record.status, biblio_db::BorrowStatus::Returned);
    assert!(returned.record.return_date.is_some());
    assert_eq!(inventory.get_book(book.id).await.unwrap().available, 2);
}

#[tokio::test]
async fn borrow_fails_when_no_copies_left() {
    let inventory = inventory();
    let book = inventory.create_book(dune(1)).await.unwrap();
    inventory.borrow(loan(book.id, "Ann")).await.unwrap();

    let err = inventory.borrow(loan(book.id, "Bob")).await.unwrap_err();
    assert!(matches!(err, InventoryError::OutOfStock));
    assert_eq!(inventory.get_book(book.id).await.unwrap().available, 0);
}

#[tokio::test]
async fn borrow_validates_borrower_before_lookup() {
    let inventory = inventory();
    let unknown = BookId::new();

    let err = inventory
        .borrow(BorrowRequest {
            borrower_email: "not-an-email".into(),
            ..loan(unknown, "Ann")
        })
        .await
        .unwrap_err();
    assert_validation(err, "borrower_email");

    let err = inventory
        .borrow(BorrowRequest {
            borrower_name: " ".into(),
            ..loan(unknown, "Ann")
        })
        .await
        .unwrap_err();
    assert_validation(err, "borrower_name");

    let err = inventory.borrow(loan(unknown, "Ann")).await.unwrap_err();
    assert!(matches!(err, InventoryError::NotFound { entity: "Book", .. }));
}

#[tokio::test]
async fn second_return_is_rejected() {
    let inventory = inventory();
    let book = inventory.create_book(dune(1)).await.unwrap();
    let view = inventory.borrow(loan(book.id, "Ann")).await.unwrap();
    inventory.return_book(view.record.id).await.unwrap();

    let err = inventory.return_book(view.record.id).await.unwrap_err();
    assert!(matches!(err, InventoryError::AlreadyReturned));
    assert_eq!(inventory.get_book(book.id).await.unwrap().available, 1);

    let missing = inventory.return_book(RecordId::new()).await.unwrap_err();
    assert!(matches!(missing, InventoryError::NotFound { entity: "Borrow record", .. }));
}

#[tokio::test]
async fn delete_is_blocked_while_borrowed() {
    let inventory = inventory();
    let book = inventory.create_book(dune(2)).await.unwrap();
    let view = inventory.borrow(loan(book.id, "Ann")).await.unwrap();

    let err = inventory.delete_book(book.id).await.unwrap_err();
    assert!(matches!(err, InventoryError::BookBorrowed { borrowed: 1 }));
    assert!(inventory.get_book(book.id).await.is_ok());

    inventory.return_book(view.record.id).await.unwrap();
    inventory.delete_book(book.id).await.unwrap();
    assert!(matches!(
        inventory.get_book(book.id).await.unwrap_err(),
        InventoryError::NotFound { .. }
    ));

    // History survives, without the book expansion.
    let record = inventory.get_record(view.record.id).await.unwrap();
    assert!(record.book_title.is_none());
    assert_eq!(inventory.statistics().await.unwrap().borrow_records.returned, 1);
}

#[tokio::test]
async fn update_recomputes_available_from_borrowed() {
    let inventory = inventory();
    let book = inventory.create_book(dune(3)).await.unwrap();
    inventory.borrow(loan(book.id, "Ann")).await.unwrap();
    inventory.borrow(loan(book.id, "Bob")).await.unwrap();

    let grown = inventory
        .update_book(
            book.id,
            BookPatch {
                quantity: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(grown.quantity, 5);
    assert_eq!(grown.available, 3);

    let err = inventory
        .update_book(
            book.id,
            BookPatch {
                quantity: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_validation(err, "quantity");

    let exact = inventory
        .update_book(
            book.id,
            BookPatch {
                quantity: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(exact.available, 0);
}

#[tokio::test]
async fn update_edits_text_fields_and_checks_isbn() {
    let inventory = inventory();
    let first = inventory.create_book(dune(1)).await.unwrap();
    let second = inventory
        .create_book(NewBook {
            title: "Emma".into(),
            author: "Jane Austen".into(),
            isbn: "9780141439587".into(),
            quantity: 1,
        })
        .await
        .unwrap();

    let renamed = inventory
        .update_book(
            second.id,
            BookPatch {
                title: Some("Emma (Penguin)".into()),
                isbn: Some(second.isbn.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.title, "Emma (Penguin)");
    assert!(renamed.updated_at >= second.updated_at);

    let taken = inventory
        .update_book(
            second.id,
            BookPatch {
                isbn: Some(first.isbn.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(taken, InventoryError::DuplicateIsbn));

    let empty = inventory
        .update_book(second.id, BookPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(empty, InventoryError::Validation { ref message, .. } if message == "No data provided"));

    let missing = inventory
        .update_book(
            BookId::new(),
            BookPatch {
                title: Some("x".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(missing, InventoryError::NotFound { .. }));
}

#[tokio::test]
async fn listings_filter_and_expand() {
    let inventory = inventory();
    let book = inventory.create_book(dune(3)).await.unwrap();
    let ann = inventory.borrow(loan(book.id, "Ann")).await.unwrap();
    inventory.borrow(loan(book.id, "Bob")).await.unwrap();
    inventory.return_book(ann.record.id).await.unwrap();

    let page = inventory
        .list_records(&RecordListParams {
            status: Some("borrowed".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.items[0].record.borrower_name, "Bob");
    assert_eq!(page.items[0].book_author.as_deref(), Some("Frank Herbert"));

    let err = inventory
        .list_books(&BookListParams {
            sort_by: Some("price".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_validation(err, "sort_by");
}

#[tokio::test]
async fn statistics_reflect_loans() {
    let inventory = inventory();
    let book = inventory.create_book(dune(3)).await.unwrap();
    let ann = inventory.borrow(loan(book.id, "Ann")).await.unwrap();
    inventory.borrow(loan(book.id, "Bob")).await.unwrap();
    inventory.return_book(ann.record.id).await.unwrap();

    let stats = inventory.statistics().await.unwrap();
    assert_eq!(
        stats,
        Statistics {
            books: BookStatistics {
                total_titles: 1,
                total_copies: 3,
                available_copies: 2,
                borrowed_copies: 1,
            },
            borrow_records: RecordStatistics {
                total: 2,
                borrowed: 1,
                returned: 1,
            },
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_borrows_of_last_copy() {
    let inventory = inventory();
    let book = inventory.create_book(dune(1)).await.unwrap();

    let (a, b) = tokio::join!(
        inventory.borrow(loan(book.id, "Ann")),
        inventory.borrow(loan(book.id, "Bob"))
    );
    let outcomes = [a, b];

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(InventoryError::OutOfStock))));
    assert_eq!(inventory.get_book(book.id).await.unwrap().available, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn borrow_storm_never_oversells() {
    let inventory = inventory();
    let book_id = inventory.create_book(dune(5)).await.unwrap().id;

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let inventory = inventory.clone();
            tokio::spawn(async move { inventory.borrow(loan(book_id, &format!("Reader{i}"))).await })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => granted += 1,
            Err(InventoryError::OutOfStock) => {}
            Err(other) => panic!("unexpected {other:?}"),
        }
    }

    assert_eq!(granted, 5);
    let stats = inventory.statistics().await.unwrap();
    assert_eq!(stats.books.available_copies, 0);
    assert_eq!(stats.borrow_records.borrowed, 5);
}

/// Store whose commits always lose the race.
struct AlwaysStale(MemoryStore);

#[async_trait]
impl Store for AlwaysStale {
    async fn book(&self, id: BookId) -> StoreResult<Option<Versioned<Book>>> {
        self.0.book(id).await
    }

    async fn record(&self, id: RecordId) -> StoreResult<Option<Versioned<BorrowRecord>>> {
        self.0.record(id).await
    }

    async fn books(&self, ids: &[BookId]) -> StoreResult<HashMap<BookId, Book>> {
        self.0.books(ids).await
    }

    async fn find_books(&self, query: &BookQuery) -> StoreResult<Page<Book>> {
        self.0.find_books(query).await
    }

    async fn find_records(&self, query: &RecordQuery) -> StoreResult<Page<BorrowRecord>> {
        self.0.find_records(query).await
    }

    async fn outstanding_loans(&self, book: BookId) -> StoreResult<u64> {
        self.0.outstanding_loans(book).await
    }

    async fn totals(&self) -> StoreResult<CatalogTotals> {
        self.0.totals().await
    }

    async fn commit(&self, _batch: WriteBatch) -> StoreResult<()> {
        Err(StoreError::Stale {
            entity: "book",
            id: "any".into(),
            expected: 1,
            found: Some(2),
        })
    }
}

#[tokio::test]
async fn persistent_conflicts_surface_as_contention() {
    let backing = MemoryStore::new();
    let book = Book::new("Dune", "Frank Herbert", "9780441172719", 1);
    backing.commit(WriteBatch::new().put(book.clone())).await.unwrap();

    let inventory = Inventory::new(
        Arc::new(AlwaysStale(backing)),
        InventoryConfig {
            max_commit_retries: 3,
            ..InventoryConfig::default()
        },
    );

    let err = inventory.borrow(loan(book.id, "Ann")).await.unwrap_err();
    assert!(matches!(err, InventoryError::Contention { attempts: 3 }));
}

#[test]
fn catalog_settings_always_allow_one_commit_attempt() {
    let settings = CatalogSettings {
        max_commit_retries: 0,
        isbn_length: 10,
        ..CatalogSettings::default()
    };
    let inventory = Inventory::new(Arc::new(MemoryStore::new()), InventoryConfig::from(&settings));
    assert_eq!(inventory.config().max_commit_retries, 1);
    assert_eq!(inventory.config().isbn_length, 10);
}
