use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, http::HeaderMap, response::Response, routing::get, Router};
use serde_json::json;

use biblio_http::{cached_json, AppError, CachePolicy, Envelope};
use biblio_kernel::Module;

use super::AppState;

/// Aggregate catalog counts
pub struct StatisticsModule {
    state: AppState,
}

#[async_trait]
impl Module for StatisticsModule {
    fn name(&self) -> &'static str {
        "statistics"
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(statistics))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let count = json!({ "type": "integer", "minimum": 0 });
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "Catalog statistics",
                        "tags": ["Statistics"],
                        "responses": {
                            "200": {
                                "description": "Totals over books and borrow records",
                                "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Statistics" } } }
                            },
                            "304": { "description": "Not modified" }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Statistics": {
                        "type": "object",
                        "properties": {
                            "books": {
                                "type": "object",
                                "properties": {
                                    "total_titles": count,
                                    "total_copies": count,
                                    "available_copies": count,
                                    "borrowed_copies": count
                                }
                            },
                            "borrow_records": {
                                "type": "object",
                                "properties": { "total": count, "borrowed": count, "returned": count }
                            }
                        }
                    }
                }
            }
        }))
    }
}

async fn statistics(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let stats = state.inventory.statistics().await?;
    cached_json(
        &headers,
        CachePolicy::public(state.cache.statistics),
        &Envelope::ok(stats),
    )
}

pub fn create_module(state: AppState) -> Arc<dyn Module> {
    Arc::new(StatisticsModule { state })
}
