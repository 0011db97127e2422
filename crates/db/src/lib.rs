//! Resource store for the library catalog.
//!
//! Two entity kinds live here, [`Book`] and [`BorrowRecord`]. Writes go
//! through [`WriteBatch`]es that commit atomically and can be guarded by the
//! revision a caller last read, which is what the inventory rules build their
//! optimistic read-modify-write loops on. Listing goes through the query
//! builder in [`query`].

pub mod error;
pub mod memory;
pub mod model;
pub mod query;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use model::{Book, BookId, BorrowRecord, BorrowStatus, RecordId, Versioned};
pub use query::{
    BookQuery, Page, PageLimits, PageRequest, Pagination, QueryError, RecordQuery, SortOrder,
};
pub use store::{CatalogTotals, Guard, Mutation, Store, WriteBatch};
