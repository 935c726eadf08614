//! Product endpoints.
//!
//! Create and update accept `multipart/form-data`: a `payload` part carrying
//! the JSON document, an optional `main_image` binary part and any number of
//! `images` parts for secondary images. Everything else is plain JSON.

use crate::{
    catalog::{
        ledger::OptionMap,
        mutation::{CreateProductInput, UpdateProductInput},
        ImageUpload,
    },
    errors::ServiceError,
    handlers::{created_response, no_content_response, success_response},
    AppState,
};
use axum::{
    extract::{Multipart, Path, State},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/:id/toggle", patch(toggle_product))
}

#[derive(Debug, Deserialize)]
struct CreateProductPayload {
    name: String,
    description: String,
    price: Decimal,
    brand: String,
    category_id: Uuid,
    #[serde(default)]
    stock: Option<i32>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    options: OptionMap,
    #[serde(default)]
    option_stock: HashMap<String, i32>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateProductPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    category_id: Option<Uuid>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    stock: Option<i32>,
    #[serde(default)]
    deleted_image_ids: Vec<Uuid>,
    #[serde(default)]
    options: Option<OptionMap>,
    #[serde(default)]
    option_stock: Option<HashMap<String, i32>>,
}

/// The parts a product mutation request may carry.
#[derive(Default)]
struct MutationParts {
    payload: Option<String>,
    main_image: Option<ImageUpload>,
    images: Vec<ImageUpload>,
}

async fn collect_parts(mut multipart: Multipart) -> Result<MutationParts, ServiceError> {
    let mut parts = MutationParts::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidInput(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "payload" => {
                let text = field.text().await.map_err(|e| {
                    ServiceError::InvalidInput(format!("unreadable payload part: {}", e))
                })?;
                parts.payload = Some(text);
            }
            "main_image" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ServiceError::InvalidInput(format!("unreadable main_image part: {}", e))
                })?;
                parts.main_image = Some(ImageUpload::new(bytes, file_name));
            }
            "images" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ServiceError::InvalidInput(format!("unreadable images part: {}", e))
                })?;
                parts.images.push(ImageUpload::new(bytes, file_name));
            }
            other => {
                tracing::debug!(part = other, "ignoring unknown multipart part");
            }
        }
    }

    Ok(parts)
}

fn parse_payload<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Result<T, ServiceError> {
    let raw = raw.ok_or_else(|| {
        ServiceError::InvalidInput("missing 'payload' part in multipart body".to_string())
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| ServiceError::InvalidInput(format!("invalid payload JSON: {}", e)))
}

async fn create_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ServiceError> {
    let parts = collect_parts(multipart).await?;
    let payload: CreateProductPayload = parse_payload(parts.payload)?;

    let main_image = parts.main_image.ok_or_else(|| {
        ServiceError::ValidationError("a main image is required".to_string())
    })?;

    let detail = state
        .services
        .mutation
        .create_product(CreateProductInput {
            name: payload.name,
            description: payload.description,
            price: payload.price,
            brand: payload.brand,
            category_id: payload.category_id,
            stock: payload.stock,
            is_active: payload.is_active,
            main_image,
            additional_images: parts.images,
            options: payload.options,
            option_stock: payload.option_stock,
        })
        .await?;

    Ok(created_response(detail))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Response, ServiceError> {
    let parts = collect_parts(multipart).await?;
    let payload: UpdateProductPayload = parse_payload(parts.payload)?;

    let detail = state
        .services
        .mutation
        .update_product(
            id,
            UpdateProductInput {
                name: payload.name,
                description: payload.description,
                price: payload.price,
                brand: payload.brand,
                category_id: payload.category_id,
                is_active: payload.is_active,
                stock: payload.stock,
                main_image: parts.main_image,
                additional_images: parts.images,
                deleted_image_ids: payload.deleted_image_ids,
                options: payload.options,
                option_stock: payload.option_stock,
            },
        )
        .await?;

    Ok(success_response(detail))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let detail = state.services.query.get_product_details(id).await?;
    Ok(success_response(detail))
}

async fn list_products(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let products = state.services.query.list_products().await?;
    Ok(success_response(products))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.mutation.delete_product(id).await?;
    Ok(no_content_response())
}

async fn toggle_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let detail = state.services.mutation.toggle_active(id).await?;
    Ok(success_response(detail))
}
