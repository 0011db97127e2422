//! Client for the biblio API.
//!
//! [`LibraryClient`] wraps the HTTP surface in typed calls and keeps a
//! [`ConditionalCache`] of ETag-validated reads. The network is reached only
//! through the [`Transport`] trait.

pub mod cache;
mod client;
pub mod credentials;
pub mod error;
pub mod models;
pub mod transport;

pub use cache::{CacheConfig, CacheEntry, ConditionalCache, FetchPolicy, InvalidationRule};
pub use client::LibraryClient;
pub use credentials::{
    CredentialError, CredentialStore, Credentials, FileCredentials, MemoryCredentials,
};
pub use error::{ClientError, ClientResult};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
