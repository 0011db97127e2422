//! HTTP modules. Each one owns a slice of the API mounted at `/api/{name}`.

pub mod auth;
pub mod books;
pub mod borrow_records;
pub mod statistics;

use std::sync::Arc;

use axum::extract::{rejection::JsonRejection, FromRef};
use axum::Json;
use serde_json::json;

use biblio_authz::TokenService;
use biblio_http::AppError;
use biblio_kernel::{settings::CacheSettings, ModuleRegistry};

use crate::inventory::{Inventory, InventoryError};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub inventory: Inventory,
    pub tokens: Arc<TokenService>,
    pub cache: CacheSettings,
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

/// Register every API module with the registry
pub fn register_all(registry: &mut ModuleRegistry, state: &AppState) -> anyhow::Result<()> {
    registry.register(auth::create_module(state.clone()))?;
    registry.register(books::create_module(state.clone()))?;
    registry.register(borrow_records::create_module(state.clone()))?;
    registry.register(statistics::create_module(state.clone()))?;
    Ok(())
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        let message = err.to_string();
        match err {
            InventoryError::Validation { message, details } => {
                let details = details
                    .into_iter()
                    .map(|d| json!({ "field": d.field, "error": d.error }))
                    .collect();
                AppError::validation(details, message)
            }
            InventoryError::NotFound { .. } => AppError::not_found(message),
            InventoryError::DuplicateIsbn => {
                AppError::conflict(vec![json!({ "field": "isbn" })], message).with_code("duplicate_isbn")
            }
            InventoryError::OutOfStock => AppError::conflict(vec![], message).with_code("out_of_stock"),
            InventoryError::BookBorrowed { borrowed } => {
                AppError::conflict(vec![json!({ "borrowed": borrowed })], message)
                    .with_code("book_borrowed")
            }
            InventoryError::AlreadyReturned => {
                AppError::conflict(vec![], message).with_code("already_returned")
            }
            InventoryError::Contention { .. } => AppError::unavailable(message).with_code("contention"),
            InventoryError::Store(source) => AppError::Internal(anyhow::Error::new(source)),
        }
    }
}

/// Unwrap a JSON body, turning axum's rejection into the error envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

/// Fail with `400` naming every absent field, in declaration order.
pub(crate) fn require_fields(present: &[(&str, bool)]) -> Result<(), AppError> {
    let missing: Vec<&str> = present
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}
