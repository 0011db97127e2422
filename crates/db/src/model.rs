use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh, time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

entity_id!(
    /// Identifier of a [`Book`].
    BookId
);

entity_id!(
    /// Identifier of a [`BorrowRecord`].
    RecordId
);

/// A catalog title and its copy accounting.
///
/// `available` is the number of copies on the shelf; `quantity - available`
/// copies are out on loan and each of them has a [`BorrowRecord`] with
/// status [`BorrowStatus::Borrowed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub quantity: u32,
    pub available: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Book {
    /// A new title with every copy on the shelf.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        isbn: impl Into<String>,
        quantity: u32,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: BookId::new(),
            title: title.into(),
            author: author.into(),
            isbn: isbn.into(),
            quantity,
            available: quantity,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copies currently out on loan.
    pub fn borrowed(&self) -> u32 {
        self.quantity.saturating_sub(self.available)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Borrowed,
    Returned,
}

impl BorrowStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Borrowed => "borrowed",
            BorrowStatus::Returned => "returned",
        }
    }
}

impl fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BorrowStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "borrowed" => Ok(BorrowStatus::Borrowed),
            "returned" => Ok(BorrowStatus::Returned),
            _ => Err(()),
        }
    }
}

/// One loan of one copy. Created on borrow, closed exactly once on return,
/// never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRecord {
    pub id: RecordId,
    pub book_id: BookId,
    pub borrower_name: String,
    pub borrower_email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub borrow_date: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub return_date: Option<OffsetDateTime>,
    pub status: BorrowStatus,
}

impl BorrowRecord {
    /// Open a loan for `book_id`.
    pub fn open(
        book_id: BookId,
        borrower_name: impl Into<String>,
        borrower_email: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            book_id,
            borrower_name: borrower_name.into(),
            borrower_email: borrower_email.into(),
            borrow_date: OffsetDateTime::now_utc(),
            return_date: None,
            status: BorrowStatus::Borrowed,
        }
    }

    pub fn is_outstanding(&self) -> bool {
        self.status == BorrowStatus::Borrowed
    }

    /// Close the loan, stamping the return time.
    pub fn close(&mut self, at: OffsetDateTime) {
        self.status = BorrowStatus::Returned;
        self.return_date = Some(at);
    }
}

/// A stored value together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: u64,
}

impl<T> Versioned<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}
