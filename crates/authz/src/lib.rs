//! Bearer-token authentication: a stateless [`TokenService`] and the
//! [`AuthUser`] extractor that guards protected handlers.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};

use biblio_http::AppError;

mod token;

pub use token::{bearer_token, AuthError, Claims, IssuedToken, TokenService};

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => AppError::bad_request(err.to_string()),
            AuthError::Signing(source) => AppError::Internal(anyhow::Error::new(source)),
            other => AppError::unauthorized(other.to_string()),
        }
    }
}

/// The authenticated caller. Extracting it rejects the request with `401`
/// unless a valid bearer token is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
    pub claims: Claims,
}

impl<S> FromRequestParts<S> for AuthUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = Arc::<TokenService>::from_ref(state);
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let claims = bearer_token(header)
            .and_then(|token| tokens.verify(token))
            .map_err(|err| {
                tracing::warn!(reason = %err, path = %parts.uri.path(), "request rejected");
                AppError::from(err)
            })?;

        Ok(AuthUser {
            username: claims.sub.clone(),
            claims,
        })
    }
}
