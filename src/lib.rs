//! Biblio application library
//!
//! Wires the catalog store, the inventory rules and the HTTP modules into a
//! runnable service.

pub mod inventory;
pub mod modules;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;

use biblio_authz::TokenService;
use biblio_db::{MemoryStore, Store};
use biblio_kernel::{InitCtx, ModuleRegistry, Settings};

use inventory::{Inventory, InventoryConfig};
pub use modules::AppState;

/// Open the configured store, loading its snapshot when one is configured.
pub async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn Store>> {
    match &settings.database.snapshot_path {
        Some(path) => {
            let store = MemoryStore::open(path)
                .await
                .with_context(|| format!("failed to open catalog snapshot {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("no snapshot configured, catalog is in-memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub fn app_state(store: Arc<dyn Store>, settings: &Settings) -> AppState {
    AppState {
        inventory: Inventory::new(store, InventoryConfig::from(&settings.catalog)),
        tokens: Arc::new(TokenService::from_settings(&settings.auth)),
        cache: settings.cache.clone(),
    }
}

pub fn build_registry(state: &AppState) -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, state)?;
    Ok(registry)
}

/// Initialized registry plus the router serving it.
pub async fn build_app(
    store: Arc<dyn Store>,
    settings: &Settings,
) -> anyhow::Result<(ModuleRegistry, Router)> {
    let registry = build_registry(&app_state(store, settings))?;
    registry.init_all(&InitCtx { settings }).await?;
    let router = biblio_http::build_router(&registry, settings);
    Ok((registry, router))
}

/// Run the service until shutdown.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        env = ?settings.environment,
        snapshot = ?settings.database.snapshot_path,
        "biblio bootstrap starting"
    );

    let store = open_store(&settings).await?;
    let (registry, router) = build_app(store, &settings).await?;
    registry
        .start_all(&InitCtx {
            settings: &settings,
        })
        .await?;

    let served = biblio_http::start_server(router, &settings).await;

    registry.stop_all().await?;
    served
}
