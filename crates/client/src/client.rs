use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION, ETAG, IF_NONE_MATCH};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{CacheConfig, ConditionalCache, FetchPolicy};
use crate::credentials::{CredentialStore, Credentials, MemoryCredentials};
use crate::error::{ClientError, ClientResult};
use crate::models::{
    Book, BookFilters, BookId, BookPage, BookUpdate, BorrowRequest, Deleted, LoanRecord, NewBook,
    RecordFilters, RecordId, RecordPage, Session, Statistics, Verification,
};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Typed access to the library API.
///
/// Reads go through the [`ConditionalCache`] according to their
/// [`FetchPolicy`]. Successful mutations purge dependent cache entries before
/// they return. Any `401` discards the stored credentials and every cache
/// entry.
#[derive(Clone)]
pub struct LibraryClient {
    base: String,
    transport: Arc<dyn Transport>,
    cache: Arc<ConditionalCache>,
    credentials: Arc<dyn CredentialStore>,
}

#[derive(Deserialize)]
struct SuccessBody {
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: Option<String>,
}

impl LibraryClient {
    /// `base_url` is the API root, e.g. `http://localhost:8080/api`.
    pub fn new(
        base_url: &str,
        transport: Arc<dyn Transport>,
        cache: Arc<ConditionalCache>,
        credentials: Arc<dyn CredentialStore>,
    ) -> ClientResult<Self> {
        let base = base_url.trim().trim_end_matches('/').to_owned();
        Url::parse(&base).map_err(|err| ClientError::Url(format!("{base}: {err}")))?;
        Ok(Self {
            base,
            transport,
            cache,
            credentials,
        })
    }

    /// A client over reqwest with the default cache and in-memory credentials.
    pub fn connect(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        Self::new(
            base_url,
            Arc::new(ReqwestTransport::new(timeout)?),
            Arc::new(ConditionalCache::new(CacheConfig::default())),
            Arc::new(MemoryCredentials::new()),
        )
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn cache(&self) -> &ConditionalCache {
        &self.cache
    }

    pub fn credentials(&self) -> ClientResult<Option<Credentials>> {
        Ok(self.credentials.load()?)
    }

    pub async fn login(&self, username: &str, password: &str) -> ClientResult<Session> {
        let body = serde_json::json!({ "username": username, "password": password });
        let session: Session = self.mutate(Method::POST, "/auth/login", Some(body)).await?;

        self.credentials.save(&Credentials {
            token: session.token.clone(),
            username: session.username.clone(),
        })?;
        self.cache.clear();
        tracing::debug!(username = %session.username, "logged in");
        Ok(session)
    }

    /// Tell the server, then forget the token and every cached response
    /// whatever the server answered.
    pub async fn logout(&self) -> ClientResult<()> {
        if let Err(err) = self
            .mutate::<Value>(Method::POST, "/auth/logout", None)
            .await
        {
            tracing::debug!(error = %err, "logout request failed; clearing local state anyway");
        }
        self.credentials.clear()?;
        self.cache.clear();
        Ok(())
    }

    pub async fn verify(&self) -> ClientResult<Verification> {
        self.get("/auth/verify", Vec::new(), FetchPolicy::Reload)
            .await
    }

    pub async fn list_books(
        &self,
        filters: &BookFilters,
        policy: FetchPolicy,
    ) -> ClientResult<BookPage> {
        self.get("/books", filters.query_pairs(), policy).await
    }

    pub async fn get_book(&self, id: BookId, policy: FetchPolicy) -> ClientResult<Book> {
        self.get(&format!("/books/{id}"), Vec::new(), policy).await
    }

    pub async fn create_book(&self, book: &NewBook) -> ClientResult<Book> {
        self.mutate(Method::POST, "/books", Some(to_body(book)?))
            .await
    }

    pub async fn update_book(&self, id: BookId, update: &BookUpdate) -> ClientResult<Book> {
        self.mutate(Method::PUT, &format!("/books/{id}"), Some(to_body(update)?))
            .await
    }

    pub async fn delete_book(&self, id: BookId) -> ClientResult<Deleted> {
        self.mutate(Method::DELETE, &format!("/books/{id}"), None)
            .await
    }

    pub async fn list_records(
        &self,
        filters: &RecordFilters,
        policy: FetchPolicy,
    ) -> ClientResult<RecordPage> {
        self.get("/borrow-records", filters.query_pairs(), policy)
            .await
    }

    pub async fn get_record(&self, id: RecordId, policy: FetchPolicy) -> ClientResult<LoanRecord> {
        self.get(&format!("/borrow-records/{id}"), Vec::new(), policy)
            .await
    }

    pub async fn borrow(&self, request: &BorrowRequest) -> ClientResult<LoanRecord> {
        self.mutate(Method::POST, "/borrow-records", Some(to_body(request)?))
            .await
    }

    pub async fn return_book(&self, id: RecordId) -> ClientResult<LoanRecord> {
        self.mutate(Method::PUT, &format!("/borrow-records/{id}/return"), None)
            .await
    }

    pub async fn statistics(&self, policy: FetchPolicy) -> ClientResult<Statistics> {
        self.get("/statistics", Vec::new(), policy).await
    }

    fn url(&self, path: &str, query: Vec<(&'static str, String)>) -> ClientResult<Url> {
        let raw = format!("{}{}", self.base, path);
        let mut url = Url::parse(&raw).map_err(|err| ClientError::Url(format!("{raw}: {err}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> ClientResult<HttpRequest> {
        let mut request = HttpRequest::new(method, url);
        if let Some(credentials) = self.credentials.load()? {
            let value = HeaderValue::from_str(&format!("Bearer {}", credentials.token))
                .map_err(|err| ClientError::Decode(format!("stored token: {err}")))?;
            request.headers.insert(AUTHORIZATION, value);
        }
        Ok(request)
    }

    /// Send, and turn a `401` into a full reset of the local auth state.
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        let response = self.transport.send(request).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            self.cache.clear();
            self.credentials.clear()?;
            tracing::debug!("unauthorized response; credentials and cache cleared");
            let (_, message) = error_parts(&response);
            return Err(ClientError::Unauthorized { message });
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(&'static str, String)>,
        policy: FetchPolicy,
    ) -> ClientResult<T> {
        let url = self.url(path, query)?;
        let payload = self.fetch(url, policy).await?;
        decode(payload)
    }

    async fn fetch(&self, url: Url, policy: FetchPolicy) -> ClientResult<Value> {
        let key = url.as_str().to_owned();
        let cached = match policy {
            FetchPolicy::Reload => None,
            FetchPolicy::Revalidate | FetchPolicy::CacheFirst => self.cache.lookup(&key),
        };

        if policy == FetchPolicy::CacheFirst {
            if let Some(entry) = &cached {
                tracing::debug!(key = %key, "cache hit");
                return Ok(entry.payload.clone());
            }
        }

        let mut request = self.request(Method::GET, url.clone())?;
        if let Some(entry) = &cached {
            if let Ok(etag) = HeaderValue::from_str(&entry.etag) {
                request.headers.insert(IF_NONE_MATCH, etag);
            }
        }

        let response = self.send(request).await?;
        if response.status == StatusCode::NOT_MODIFIED {
            if let Some(payload) = self.cache.revalidated(&key) {
                tracing::debug!(key = %key, "revalidated");
                return Ok(payload);
            }
            tracing::debug!(key = %key, "entry vanished during revalidation; refetching");
            let response = self.send(self.request(Method::GET, url)?).await?;
            return self.accept_read(&key, response);
        }
        self.accept_read(&key, response)
    }

    fn accept_read(&self, key: &str, response: HttpResponse) -> ClientResult<Value> {
        let data = success_data(&response)?;
        if let Some(etag) = response
            .headers
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
        {
            self.cache.store(key, etag, data.clone());
        }
        Ok(data)
    }

    async fn mutate<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ClientResult<T> {
        let mut request = self.request(method, self.url(path, Vec::new())?)?;
        request.body = body;

        let response = self.send(request).await?;
        // The server has applied a 2xx even when its body fails to decode.
        if response.status.is_success() {
            self.cache.invalidate_for(path);
        }
        decode(success_data(&response)?)
    }
}

impl std::fmt::Debug for LibraryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryClient")
            .field("base", &self.base)
            .field("cached_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

fn to_body<T: Serialize>(value: &T) -> ClientResult<Value> {
    serde_json::to_value(value).map_err(|err| ClientError::Decode(err.to_string()))
}

fn decode<T: DeserializeOwned>(data: Value) -> ClientResult<T> {
    serde_json::from_value(data).map_err(|err| ClientError::Decode(err.to_string()))
}

/// The `data` of a success envelope, or the server's error as a
/// [`ClientError::Api`].
fn success_data(response: &HttpResponse) -> ClientResult<Value> {
    if !response.status.is_success() {
        let (code, message) = error_parts(response);
        return Err(ClientError::Api {
            status: response.status,
            code,
            message,
        });
    }
    serde_json::from_slice::<SuccessBody>(&response.body)
        .map(|body| body.data)
        .map_err(|err| ClientError::Decode(err.to_string()))
}

fn error_parts(response: &HttpResponse) -> (Option<String>, String) {
    let parsed = serde_json::from_slice::<ErrorBody>(&response.body).ok();
    let code = parsed
        .as_ref()
        .and_then(|body| body.error.as_ref())
        .and_then(|detail| detail.code.clone());
    let message = parsed
        .and_then(|body| body.message)
        .unwrap_or_else(|| {
            response
                .status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_owned()
        });
    (code, message)
}
