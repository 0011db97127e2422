use serde::{Deserialize, Serialize};

use biblio_db::Pagination;

use crate::inventory::RecordView;

/// `data` of `GET /api/borrow-records`.
#[derive(Debug, Clone, Serialize)]
pub struct RecordList {
    pub records: Vec<RecordView>,
    pub pagination: Pagination,
}

/// Body of `POST /api/borrow-records`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBorrow {
    pub book_id: Option<String>,
    pub borrower_name: Option<String>,
    pub borrower_email: Option<String>,
}

impl CreateBorrow {
    pub fn fields_present(&self) -> [(&'static str, bool); 3] {
        [
            ("book_id", self.book_id.is_some()),
            ("borrower_name", self.borrower_name.is_some()),
            ("borrower_email", self.borrower_email.is_some()),
        ]
    }
}
