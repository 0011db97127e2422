use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use biblio_authz::AuthUser;
use biblio_http::{AppError, Envelope, NoStore};
use biblio_kernel::{InitCtx, Module};

use super::{json_body, AppState};

/// Stateless login: tokens are issued here and verified on every request
pub struct AuthModule {
    state: AppState,
}

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[async_trait]
impl Module for AuthModule {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            token_ttl_hours = ctx.settings.auth.token_ttl_hours,
            "auth module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/login", post(login))
            .route("/logout", post(logout))
            .route("/verify", get(verify))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = json!({
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } } }
        });
        Some(json!({
            "paths": {
                "/login": {
                    "post": {
                        "summary": "Obtain a bearer token",
                        "tags": ["Auth"],
                        "requestBody": {
                            "required": true,
                            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Login" } } }
                        },
                        "responses": { "200": { "description": "Token issued" }, "400": error }
                    }
                },
                "/logout": {
                    "post": { "summary": "Log out", "tags": ["Auth"], "responses": { "200": { "description": "OK" } } }
                },
                "/verify": {
                    "get": {
                        "summary": "Check the presented token",
                        "tags": ["Auth"],
                        "security": [{ "bearerAuth": [] }],
                        "responses": { "200": { "description": "Token is valid" }, "401": error }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Login": {
                        "type": "object",
                        "properties": { "username": { "type": "string" }, "password": { "type": "string" } },
                        "required": ["username", "password"]
                    }
                }
            }
        }))
    }
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(payload)?;
    let issued = state.tokens.login(
        body.username.as_deref().unwrap_or_default(),
        body.password.as_deref().unwrap_or_default(),
    )?;

    tracing::info!(username = %issued.username, "login succeeded");
    Ok(NoStore(Envelope::ok(issued).with_message("Login successful")))
}

async fn logout() -> impl IntoResponse {
    NoStore(Envelope::ok(json!({})).with_message("Logout successful"))
}

async fn verify(user: AuthUser) -> impl IntoResponse {
    NoStore(Envelope::ok(json!({ "valid": true, "username": user.username })))
}

pub fn create_module(state: AppState) -> Arc<dyn Module> {
    Arc::new(AuthModule { state })
}
