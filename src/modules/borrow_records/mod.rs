pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde_json::json;

use biblio_authz::AuthUser;
use biblio_db::{query::RecordListParams, RecordId};
use biblio_http::{cached_json, response::created, AppError, CachePolicy, Envelope, NoStore};
use biblio_kernel::{InitCtx, Module};

use super::{books::parse_book_id, json_body, require_fields, AppState};
use crate::inventory::BorrowRequest;
use models::{CreateBorrow, RecordList};

/// Loans: every route requires a bearer token
pub struct BorrowRecordsModule {
    state: AppState,
}

impl BorrowRecordsModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for BorrowRecordsModule {
    fn name(&self) -> &'static str {
        "borrow-records"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "borrow records module initialized");
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(list_records).post(borrow_book))
            .route("/{id}", get(get_record))
            .route("/{id}/return", put(return_book))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = json!({
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } } }
        });
        let id_param = json!([{ "name": "id", "in": "path", "required": true, "schema": { "type": "string", "format": "uuid" } }]);
        let secured = json!([{ "bearerAuth": [] }]);

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List borrow records",
                        "tags": ["Borrow records"],
                        "security": secured,
                        "responses": { "200": { "description": "Page of records" }, "304": { "description": "Not modified" }, "401": error, "422": error }
                    },
                    "post": {
                        "summary": "Borrow one copy of a book",
                        "tags": ["Borrow records"],
                        "security": secured,
                        "requestBody": {
                            "required": true,
                            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/CreateBorrow" } } }
                        },
                        "responses": { "201": { "description": "Borrowed" }, "400": error, "401": error, "404": error, "409": error, "422": error }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get a borrow record",
                        "tags": ["Borrow records"],
                        "security": secured,
                        "parameters": id_param,
                        "responses": { "200": { "description": "The record" }, "401": error, "404": error }
                    }
                },
                "/{id}/return": {
                    "put": {
                        "summary": "Return a borrowed copy",
                        "tags": ["Borrow records"],
                        "security": secured,
                        "parameters": id_param,
                        "responses": { "200": { "description": "Returned" }, "401": error, "404": error, "409": error }
                    }
                }
            },
            "components": {
                "schemas": {
                    "CreateBorrow": {
                        "type": "object",
                        "properties": {
                            "book_id": { "type": "string", "format": "uuid" },
                            "borrower_name": { "type": "string" },
                            "borrower_email": { "type": "string", "format": "email" }
                        },
                        "required": ["book_id", "borrower_name", "borrower_email"]
                    }
                }
            }
        }))
    }
}

fn parse_record_id(raw: &str) -> Result<RecordId, AppError> {
    raw.parse()
        .map_err(|_| AppError::bad_request("Invalid record ID format"))
}

async fn list_records(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<RecordListParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let page = state.inventory.list_records(&params).await?;
    let body = Envelope::ok(RecordList {
        records: page.items,
        pagination: page.pagination,
    });
    cached_json(&headers, CachePolicy::private(state.cache.borrow_records), &body)
}

async fn get_record(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let record = state.inventory.get_record(parse_record_id(&id)?).await?;
    cached_json(
        &headers,
        CachePolicy::private(state.cache.borrow_record),
        &Envelope::ok(record),
    )
}

async fn borrow_book(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateBorrow>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(payload)?;
    require_fields(&body.fields_present())?;

    let book_id = parse_book_id(body.book_id.as_deref().unwrap_or_default())?;
    let record = state
        .inventory
        .borrow(BorrowRequest {
            book_id,
            borrower_name: body.borrower_name.unwrap_or_default(),
            borrower_email: body.borrower_email.unwrap_or_default(),
        })
        .await?;

    tracing::info!(record_id = %record.record.id, by = %user.username, "loan recorded");
    Ok(NoStore(created(record, "Book borrowed successfully")))
}

async fn return_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.inventory.return_book(parse_record_id(&id)?).await?;
    Ok(NoStore(
        Envelope::ok(record).with_message("Book returned successfully"),
    ))
}

/// Create a new instance of the borrow records module
pub fn create_module(state: AppState) -> Arc<dyn Module> {
    Arc::new(BorrowRecordsModule::new(state))
}
