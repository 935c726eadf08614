//! Catalog API: transactional product catalog service for an e-commerce
//! admin console. Products, their external image assets, purchase options
//! and the per-option-value stock ledger mutate as one unit of work.

pub mod catalog;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;

use crate::catalog::{
    AssetStore, CategoryService, ProductMutationService, ProductQueryService,
};
use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Services shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub mutation: Arc<ProductMutationService>,
    pub query: Arc<ProductQueryService>,
    pub categories: Arc<CategoryService>,
    pub assets: Arc<dyn AssetStore>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<events::EventSender>,
        assets: Arc<dyn AssetStore>,
    ) -> Self {
        Self {
            mutation: Arc::new(ProductMutationService::new(
                db.clone(),
                assets.clone(),
                event_sender.clone(),
            )),
            query: Arc::new(ProductQueryService::new(db.clone())),
            categories: Arc::new(CategoryService::new(db, event_sender)),
            assets,
        }
    }
}

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: AppServices,
}

/// Versioned API surface, mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/products", handlers::products::products_routes())
        .nest("/categories", handlers::categories::categories_routes())
}
