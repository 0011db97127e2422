use serde::{Deserialize, Serialize};

use biblio_db::{Book, Pagination};

use crate::inventory::{BookPatch, NewBook};

/// `data` of `GET /api/books`.
#[derive(Debug, Clone, Serialize)]
pub struct BookList {
    pub books: Vec<Book>,
    pub pagination: Pagination,
}

/// Body of `POST /api/books`. Every field is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub quantity: Option<i64>,
}

impl CreateBook {
    pub fn fields_present(&self) -> [(&'static str, bool); 4] {
        [
            ("title", self.title.is_some()),
            ("author", self.author.is_some()),
            ("isbn", self.isbn.is_some()),
            ("quantity", self.quantity.is_some()),
        ]
    }

    pub fn into_new_book(self) -> NewBook {
        NewBook {
            title: self.title.unwrap_or_default(),
            author: self.author.unwrap_or_default(),
            isbn: self.isbn.unwrap_or_default(),
            quantity: self.quantity.unwrap_or_default(),
        }
    }
}

/// Body of `PUT /api/books/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub quantity: Option<i64>,
}

impl From<UpdateBook> for BookPatch {
    fn from(body: UpdateBook) -> Self {
        BookPatch {
            title: body.title,
            author: body.author,
            isbn: body.isbn,
            quantity: body.quantity,
        }
    }
}
