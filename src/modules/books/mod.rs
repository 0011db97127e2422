pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use biblio_authz::AuthUser;
use biblio_db::{query::BookListParams, BookId};
use biblio_http::{cached_json, response::created, AppError, CachePolicy, Envelope, NoStore};
use biblio_kernel::{InitCtx, Module};

use super::{json_body, require_fields, AppState};
use models::{BookList, CreateBook, UpdateBook};

/// Catalog titles: public reads, authenticated writes
pub struct BooksModule {
    state: AppState,
}

impl BooksModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            isbn_length = self.state.inventory.config().isbn_length,
            max_age = ctx.settings.cache.books,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(list_books).post(create_book))
            .route("/{id}", get(get_book).put(update_book).delete(delete_book))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = json!({
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } } }
        });
        let id_param = json!([{ "name": "id", "in": "path", "required": true, "schema": { "type": "string", "format": "uuid" } }]);
        let list_params: Vec<serde_json::Value> = [
            "page", "per_page", "title", "author", "isbn", "available_only", "sort_by", "sort_order",
        ]
        .iter()
        .map(|name| json!({ "name": name, "in": "query", "required": false, "schema": { "type": "string" } }))
        .collect();

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List books",
                        "tags": ["Books"],
                        "parameters": list_params,
                        "responses": {
                            "200": { "description": "Page of books; carries ETag and Cache-Control" },
                            "304": { "description": "Not modified" },
                            "422": error
                        }
                    },
                    "post": {
                        "summary": "Add a book",
                        "tags": ["Books"],
                        "security": [{ "bearerAuth": [] }],
                        "requestBody": {
                            "required": true,
                            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/CreateBook" } } }
                        },
                        "responses": {
                            "201": { "description": "Created" },
                            "400": error,
                            "401": error,
                            "409": error,
                            "422": error
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get a book",
                        "tags": ["Books"],
                        "parameters": id_param,
                        "responses": { "200": { "description": "The book" }, "304": { "description": "Not modified" }, "404": error }
                    },
                    "put": {
                        "summary": "Update a book",
                        "tags": ["Books"],
                        "security": [{ "bearerAuth": [] }],
                        "parameters": id_param,
                        "responses": { "200": { "description": "Updated" }, "401": error, "404": error, "409": error, "422": error }
                    },
                    "delete": {
                        "summary": "Delete a book",
                        "tags": ["Books"],
                        "security": [{ "bearerAuth": [] }],
                        "parameters": id_param,
                        "responses": { "200": { "description": "Deleted" }, "401": error, "404": error, "409": error }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "format": "uuid" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "isbn": { "type": "string", "description": "Fixed-length digit string" },
                            "quantity": { "type": "integer", "minimum": 0 },
                            "available": { "type": "integer", "minimum": 0 },
                            "created_at": { "type": "string", "format": "date-time" },
                            "updated_at": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "title", "author", "isbn", "quantity", "available", "created_at"]
                    },
                    "CreateBook": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "isbn": { "type": "string" },
                            "quantity": { "type": "integer", "minimum": 0 }
                        },
                        "required": ["title", "author", "isbn", "quantity"]
                    }
                }
            }
        }))
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

pub(crate) fn parse_book_id(raw: &str) -> Result<BookId, AppError> {
    raw.parse()
        .map_err(|_| AppError::bad_request("Invalid book ID format"))
}

async fn list_books(
    State(state): State<AppState>,
    Query(params): Query<BookListParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let page = state.inventory.list_books(&params).await?;
    let body = Envelope::ok(BookList {
        books: page.items,
        pagination: page.pagination,
    });
    cached_json(&headers, CachePolicy::public(state.cache.books), &body)
}

async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let book = state.inventory.get_book(parse_book_id(&id)?).await?;
    cached_json(&headers, CachePolicy::public(state.cache.book), &Envelope::ok(book))
}

async fn create_book(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateBook>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(payload)?;
    require_fields(&body.fields_present())?;

    let book = state.inventory.create_book(body.into_new_book()).await?;
    tracing::info!(book_id = %book.id, by = %user.username, "book added to catalog");
    Ok(NoStore(created(book, "Book created successfully")))
}

async fn update_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateBook>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_book_id(&id)?;
    let body = json_body(payload)?;

    let book = state.inventory.update_book(id, body.into()).await?;
    Ok(NoStore(
        Envelope::ok(book).with_message("Book updated successfully"),
    ))
}

async fn delete_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_book_id(&id)?;
    state.inventory.delete_book(id).await?;
    Ok(NoStore(
        Envelope::ok(json!({ "id": id })).with_message("Book deleted successfully"),
    ))
}

/// Create a new instance of the books module
pub fn create_module(state: AppState) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(state))
}
