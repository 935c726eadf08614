//! Category endpoints, including the per-category product listing used by
//! the storefront (active only) and the admin console (everything).

use crate::{
    catalog::categories::CreateCategoryInput,
    errors::ServiceError,
    handlers::{created_response, success_response},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn categories_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_category).get(list_categories))
        .route("/:id", get(get_category))
        .route("/:id/products", get(list_category_products))
}

#[derive(Debug, Deserialize)]
struct CreateCategoryRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CategoryProductsQuery {
    #[serde(default)]
    include_inactive: bool,
}

async fn create_category(
    State(state): State<AppState>,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<Response, ServiceError> {
    let category = state
        .services
        .categories
        .create_category(CreateCategoryInput {
            name: request.name,
            description: request.description,
        })
        .await?;

    Ok(created_response(category))
}

async fn list_categories(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let categories = state.services.categories.list_categories().await?;
    Ok(success_response(categories))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let category = state.services.categories.get_category(id).await?;
    Ok(success_response(category))
}

async fn list_category_products(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CategoryProductsQuery>,
) -> Result<Response, ServiceError> {
    // 404 for unknown categories instead of an empty list.
    state.services.categories.get_category(id).await?;

    let products = state
        .services
        .query
        .list_by_category(id, query.include_inactive)
        .await?;

    Ok(success_response(products))
}
