//! End-to-end checks of the HTTP surface, driven in-process.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use biblio_db::MemoryStore;
use biblio_kernel::Settings;

async fn app() -> Router {
    let (_registry, router) = biblio_app::build_app(Arc::new(MemoryStore::new()), &Settings::default())
        .await
        .unwrap();
    router
}

async fn call(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn json_of(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn login(router: &Router) -> String {
    let response = call(
        router,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "librarian", "password": "secret" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    body["data"]["token"].as_str().unwrap().to_owned()
}

async fn add_book(router: &Router, token: &str, isbn: &str, quantity: u32) -> Value {
    let response = call(
        router,
        request(
            "POST",
            "/api/books",
            Some(token),
            Some(json!({ "title": "Dune", "author": "Frank Herbert", "isbn": isbn, "quantity": quantity })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_of(response).await["data"].clone()
}

#[tokio::test]
async fn writes_require_a_bearer_token() {
    let router = app().await;
    let response = call(
        &router,
        request("POST", "/api/books", None, Some(json!({ "title": "Dune" }))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let body = json_of(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Token is missing in Authorization header");
}

#[tokio::test]
async fn login_without_password_is_a_bad_request() {
    let router = app().await;
    let response = call(
        &router,
        request("POST", "/api/auth/login", None, Some(json!({ "username": "ann" }))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn created_books_start_fully_available_and_are_not_cacheable() {
    let router = app().await;
    let token = login(&router).await;

    let response = call(
        &router,
        request(
            "POST",
            "/api/books",
            Some(&token),
            Some(json!({ "title": "Dune", "author": "Frank Herbert", "isbn": "9780441172719", "quantity": 3 })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers()[header::CACHE_CONTROL]
        .to_str()
        .unwrap()
        .starts_with("no-store"));
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");

    let body = json_of(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Book created successfully");
    assert_eq!(body["data"]["available"], 3);
}

#[tokio::test]
async fn missing_fields_are_named() {
    let router = app().await;
    let token = login(&router).await;
    let response = call(
        &router,
        request("POST", "/api/books", Some(&token), Some(json!({ "title": "Dune" }))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_of(response).await["message"],
        "Missing required fields: author, isbn, quantity"
    );
}

#[tokio::test]
async fn invalid_input_is_unprocessable_and_duplicates_conflict() {
    let router = app().await;
    let token = login(&router).await;

    let response = call(
        &router,
        request(
            "POST",
            "/api/books",
            Some(&token),
            Some(json!({ "title": "Dune", "author": "Frank Herbert", "isbn": "123", "quantity": 1 })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_of(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["details"][0]["field"], "isbn");

    add_book(&router, &token, "9780441172719", 1).await;
    let response = call(
        &router,
        request(
            "POST",
            "/api/books",
            Some(&token),
            Some(json!({ "title": "Other", "author": "Someone", "isbn": "9780441172719", "quantity": 1 })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_of(response).await;
    assert_eq!(body["error"]["code"], "duplicate_isbn");
    assert_eq!(body["message"], "A book with this ISBN already exists");
}

#[tokio::test]
async fn malformed_ids_are_rejected_before_lookup() {
    let router = app().await;
    let response = call(&router, request("GET", "/api/books/not-a-uuid", None, None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(response).await["message"], "Invalid book ID format");

    let response = call(
        &router,
        request("GET", &format!("/api/books/{}", biblio_db::BookId::new()), None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listings_carry_validators_and_answer_304() {
    let router = app().await;
    let token = login(&router).await;
    add_book(&router, &token, "9780441172719", 2).await;

    let first = call(&router, request("GET", "/api/books?sort_by=title", None, None)).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[header::CACHE_CONTROL], "public, max-age=60");
    let etag = first.headers()[header::ETAG].to_str().unwrap().to_owned();
    let body = json_of(first).await;
    assert_eq!(body["data"]["books"][0]["title"], "Dune");
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let revalidated = call(
        &router,
        Request::builder()
            .uri("/api/books?sort_by=title")
            .header(header::IF_NONE_MATCH, &etag)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(revalidated.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(revalidated.headers()[header::ETAG], etag.as_str());
    let bytes = to_bytes(revalidated.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn unknown_sort_fields_are_validation_errors() {
    let router = app().await;
    let response = call(&router, request("GET", "/api/books?sort_by=price", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn lending_flow_keeps_counts_consistent() {
    let router = app().await;
    let token = login(&router).await;
    let book = add_book(&router, &token, "9780441172719", 1).await;
    let book_id = book["id"].as_str().unwrap().to_owned();

    let stats_before = call(&router, request("GET", "/api/statistics", None, None)).await;
    let etag_before = stats_before.headers()[header::ETAG].clone();

    let borrow = json!({ "book_id": book_id, "borrower_name": "Ann", "borrower_email": "ann@example.com" });
    let response = call(
        &router,
        request("POST", "/api/borrow-records", Some(&token), Some(borrow.clone())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let record = json_of(response).await["data"].clone();
    assert_eq!(record["status"], "borrowed");
    assert_eq!(record["book_title"], "Dune");

    let response = call(
        &router,
        request("POST", "/api/borrow-records", Some(&token), Some(borrow)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_of(response).await["error"]["code"], "out_of_stock");

    let response = call(
        &router,
        request("DELETE", &format!("/api/books/{book_id}"), Some(&token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_of(response).await["error"]["code"], "book_borrowed");

    let stats_after = call(&router, request("GET", "/api/statistics", None, None)).await;
    assert_ne!(stats_after.headers()[header::ETAG], etag_before);
    let stats = json_of(stats_after).await;
    assert_eq!(stats["data"]["books"]["borrowed_copies"], 1);
    assert_eq!(stats["data"]["borrow_records"]["borrowed"], 1);

    let record_id = record["id"].as_str().unwrap();
    let return_uri = format!("/api/borrow-records/{record_id}/return");
    let response = call(&router, request("PUT", &return_uri, Some(&token), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_of(response).await["data"]["status"], "returned");

    let response = call(&router, request("PUT", &return_uri, Some(&token), None)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_of(response).await["error"]["code"], "already_returned");

    let response = call(
        &router,
        request("DELETE", &format!("/api/books/{book_id}"), Some(&token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn borrow_records_are_private() {
    let router = app().await;
    let response = call(&router, request("GET", "/api/borrow-records", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = login(&router).await;
    let response = call(&router, request("GET", "/api/borrow-records", Some(&token), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "private, max-age=30");
    assert_eq!(response.headers()[header::VARY], "Authorization");
    assert_eq!(json_of(response).await["data"]["records"], json!([]));
}

#[tokio::test]
async fn expired_or_forged_tokens_are_unauthorized() {
    let router = app().await;
    let response = call(
        &router,
        request("GET", "/api/auth/verify", Some("not.a.jwt"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_of(response).await["message"], "Invalid token");

    let token = login(&router).await;
    let response = call(&router, request("GET", "/api/auth/verify", Some(&token), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_of(response).await["data"]["username"], "librarian");
}
