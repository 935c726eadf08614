//! Catalog mutation engine: transactional create/update/delete of products
//! together with their images, purchase options and stock ledger.
//!
//! Ordering within one mutation: input validation and ledger checks happen
//! before any side effect; asset uploads always precede the relational
//! transaction; the transaction is all-or-nothing. Assets uploaded before a
//! failed transaction become orphaned objects in the store, surfaced through
//! the `catalog_assets_orphaned` counter for out-of-band reconciliation.

use crate::{
    catalog::{
        assets::{delete_best_effort, AssetStore, ImageUpload, StoredAsset},
        ledger::{OptionMap, StockLedger},
        query::{ProductDetail, ProductQueryService},
        sku::SkuGenerator,
    },
    entities::{
        product, product_image, product_option, product_option_stock, Category, Product,
        ProductImage, ProductOption, ProductOptionStock,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Payload for creating a product.
pub struct CreateProductInput {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub brand: String,
    pub category_id: Uuid,
    /// Scalar stock, honored only when no options are declared
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
    pub main_image: ImageUpload,
    pub additional_images: Vec<ImageUpload>,
    /// Option name -> ordered permitted values
    pub options: OptionMap,
    /// `"name:value" -> stock`, must reference declared option values
    pub option_stock: HashMap<String, i32>,
}

/// Payload for updating a product. Absent fields stay untouched.
#[derive(Default)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub brand: Option<String>,
    pub category_id: Option<Uuid>,
    pub is_active: Option<bool>,
    /// Scalar stock, honored only when the product ends up without options
    pub stock: Option<i32>,
    /// Replacement primary image; the previous one is removed
    pub main_image: Option<ImageUpload>,
    /// Appended as additional secondary images
    pub additional_images: Vec<ImageUpload>,
    /// Image rows (and their stored assets) to remove
    pub deleted_image_ids: Vec<Uuid>,
    /// When present, the whole option set is replaced (possibly with an
    /// empty map, which clears options and forces stock to 0)
    pub options: Option<OptionMap>,
    /// Evaluated only together with `options`
    pub option_stock: Option<HashMap<String, i32>>,
}

pub struct ProductMutationService {
    db: Arc<DatabaseConnection>,
    assets: Arc<dyn AssetStore>,
    event_sender: Arc<EventSender>,
    query: ProductQueryService,
}

impl ProductMutationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        assets: Arc<dyn AssetStore>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let query = ProductQueryService::new(db.clone());
        Self {
            db,
            assets,
            event_sender,
            query,
        }
    }

    /// Creates a product with its images, options and stock ledger.
    ///
    /// Nothing is persisted unless every image upload succeeded, and the
    /// relational writes commit as one unit of work.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductDetail, ServiceError> {
        validate_create(&input)?;
        self.ensure_category_exists(input.category_id).await?;

        let ledger = StockLedger::from_raw(&input.option_stock)?;
        ledger.validate(&input.options)?;

        let sku = SkuGenerator::generate(&*self.db, &input.brand).await?;

        // Uploads precede the transaction; a failure here aborts before any
        // relational write, so no product row ever lacks its primary image.
        let main_asset = self.assets.upload(input.main_image.clone(), "primary").await?;
        let secondary_assets = self
            .assets
            .upload_many(input.additional_images.clone(), "secondary")
            .await?;

        let product_id = Uuid::new_v4();
        let result = self
            .persist_create(product_id, &input, &sku, &ledger, &main_asset, &secondary_assets)
            .await;

        if let Err(err) = result {
            record_orphaned_assets(&main_asset, &secondary_assets);
            return Err(err);
        }

        counter!("catalog_mutations_total", 1, "op" => "create");
        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!(product_id = %product_id, sku = %sku, "product created");
        self.query.get_product_details(product_id).await
    }

    async fn persist_create(
        &self,
        product_id: Uuid,
        input: &CreateProductInput,
        sku: &str,
        ledger: &StockLedger,
        main_asset: &StoredAsset,
        secondary_assets: &[StoredAsset],
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let scalar_stock = if input.options.is_empty() {
            input.stock.unwrap_or(0)
        } else {
            0
        };

        product::ActiveModel {
            id: Set(product_id),
            name: Set(input.name.clone()),
            description: Set(input.description.clone()),
            price: Set(input.price),
            stock: Set(scalar_stock),
            sku: Set(sku.to_string()),
            brand: Set(input.brand.clone()),
            category_id: Set(input.category_id),
            is_active: Set(input.is_active.unwrap_or(true)),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        insert_image_row(&txn, product_id, main_asset, &input.name, true).await?;
        for asset in secondary_assets {
            insert_image_row(&txn, product_id, asset, &input.name, false).await?;
        }

        if !input.options.is_empty() {
            insert_option_rows(&txn, product_id, &input.options, ledger).await?;
            set_product_stock(&txn, product_id, ledger.total_stock()).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Applies a partial update. Options and ledger, when supplied, are
    /// replaced wholesale inside the same transaction; once a product has
    /// declared options, its aggregate stock always equals the ledger total.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductDetail, ServiceError> {
        validate_update(&input)?;

        let current = self.query.get_product_details(id).await?;

        if let Some(category_id) = input.category_id {
            self.ensure_category_exists(category_id).await?;
        }

        // Reconcile the replacement ledger against the replacement options
        // before any side effect.
        let replacement = match &input.options {
            Some(options) => {
                let ledger = match &input.option_stock {
                    Some(raw) => StockLedger::from_raw(raw)?,
                    None => StockLedger::new(),
                };
                ledger.validate(options)?;
                Some((options.clone(), ledger))
            }
            None => None,
        };

        // Uploads precede the transaction.
        let new_main = match input.main_image.clone() {
            Some(image) => Some(self.assets.upload(image, "primary").await?),
            None => None,
        };
        let new_secondary = self
            .assets
            .upload_many(input.additional_images.clone(), "secondary")
            .await?;

        // Best-effort asset removal for explicitly deleted images and for
        // the replaced primary; row removal happens inside the transaction.
        for image in current
            .images
            .iter()
            .filter(|img| input.deleted_image_ids.contains(&img.id))
        {
            if let Some(path) = &image.storage_path {
                delete_best_effort(&*self.assets, path).await;
            }
        }

        if new_main.is_some() {
            if let Some(path) = current.primary_image().and_then(|img| img.storage_path.clone()) {
                delete_best_effort(&*self.assets, &path).await;
            }
        }

        let result = self
            .persist_update(&current, &input, replacement, &new_main, &new_secondary)
            .await;

        if let Err(err) = result {
            if let Some(asset) = &new_main {
                record_orphaned_assets(asset, &new_secondary);
            } else if !new_secondary.is_empty() {
                counter!("catalog_assets_orphaned", new_secondary.len() as u64);
                warn!(count = new_secondary.len(), "uploaded assets orphaned by failed update");
            }
            return Err(err);
        }

        counter!("catalog_mutations_total", 1, "op" => "update");
        self.event_sender
            .send_or_log(Event::ProductUpdated(id))
            .await;

        info!(product_id = %id, "product updated");
        self.query.get_product_details(id).await
    }

    async fn persist_update(
        &self,
        current: &ProductDetail,
        input: &UpdateProductInput,
        replacement: Option<(OptionMap, StockLedger)>,
        new_main: &Option<StoredAsset>,
        new_secondary: &[StoredAsset],
    ) -> Result<(), ServiceError> {
        let id = current.product.id;
        let txn = self.db.begin().await?;

        let mut active: product::ActiveModel = current.product.clone().into();
        if let Some(name) = &input.name {
            active.name = Set(name.clone());
        }
        if let Some(description) = &input.description {
            active.description = Set(description.clone());
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(brand) = &input.brand {
            active.brand = Set(brand.clone());
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }

        // Scalar stock only applies while the product has no declared
        // options; a ledger, once present, is the sole source of truth.
        let has_options_after = match &replacement {
            Some((options, _)) => !options.is_empty(),
            None => !current.options.is_empty(),
        };
        if let Some(stock) = input.stock {
            if !has_options_after {
                active.stock = Set(stock);
            } else {
                warn!(product_id = %id, "scalar stock ignored: product has declared options");
            }
        }

        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        if !input.deleted_image_ids.is_empty() {
            ProductImage::delete_many()
                .filter(product_image::Column::ProductId.eq(id))
                .filter(product_image::Column::Id.is_in(input.deleted_image_ids.clone()))
                .exec(&txn)
                .await?;
        }

        if let Some(asset) = new_main {
            // Replace, never coexist with two primaries.
            ProductImage::delete_many()
                .filter(product_image::Column::ProductId.eq(id))
                .filter(product_image::Column::IsPrimary.eq(true))
                .exec(&txn)
                .await?;

            let alt = input.name.clone().unwrap_or_else(|| current.product.name.clone());
            insert_image_row(&txn, id, asset, &alt, true).await?;
        }

        for asset in new_secondary {
            let alt = input.name.clone().unwrap_or_else(|| current.product.name.clone());
            insert_image_row(&txn, id, asset, &alt, false).await?;
        }

        if let Some((options, ledger)) = replacement {
            // Wholesale replace: delete all, then re-insert the new set.
            ProductOption::delete_many()
                .filter(product_option::Column::ProductId.eq(id))
                .exec(&txn)
                .await?;
            ProductOptionStock::delete_many()
                .filter(product_option_stock::Column::ProductId.eq(id))
                .exec(&txn)
                .await?;

            if options.is_empty() {
                // Options dominate scalar stock: clearing them zeroes stock.
                set_product_stock(&txn, id, 0).await?;
            } else {
                insert_option_rows(&txn, id, &options, &ledger).await?;
                set_product_stock(&txn, id, ledger.total_stock()).await?;
            }
        }

        txn.commit().await?;
        Ok(())
    }

    /// Deletes the product, cascading its images, options and ledger rows.
    /// Stored assets are removed best-effort first.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let current = self.query.get_product_details(id).await?;

        for image in &current.images {
            if let Some(path) = &image.storage_path {
                delete_best_effort(&*self.assets, path).await;
            }
        }

        let txn = self.db.begin().await?;

        ProductOptionStock::delete_many()
            .filter(product_option_stock::Column::ProductId.eq(id))
            .exec(&txn)
            .await?;
        ProductOption::delete_many()
            .filter(product_option::Column::ProductId.eq(id))
            .exec(&txn)
            .await?;
        ProductImage::delete_many()
            .filter(product_image::Column::ProductId.eq(id))
            .exec(&txn)
            .await?;
        Product::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;

        counter!("catalog_mutations_total", 1, "op" => "delete");
        self.event_sender
            .send_or_log(Event::ProductDeleted(id))
            .await;

        info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Flips the active flag.
    #[instrument(skip(self))]
    pub async fn toggle_active(&self, id: Uuid) -> Result<ProductDetail, ServiceError> {
        let product = Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        let was_active = product.is_active;
        let mut active: product::ActiveModel = product.into();
        active.is_active = Set(!was_active);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        counter!("catalog_mutations_total", 1, "op" => "toggle");
        self.event_sender
            .send_or_log(Event::Generic {
                message: format!("product_toggled:{}", id),
                timestamp: Utc::now(),
                metadata: json!({ "product_id": id, "is_active": !was_active }),
            })
            .await;

        self.query.get_product_details(id).await
    }

    async fn ensure_category_exists(&self, category_id: Uuid) -> Result<(), ServiceError> {
        Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
    }
}

async fn insert_image_row(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    asset: &StoredAsset,
    alt: &str,
    is_primary: bool,
) -> Result<(), ServiceError> {
    product_image::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        url: Set(asset.url.clone()),
        alt_text: Set(Some(alt.to_string())),
        is_primary: Set(is_primary),
        storage_path: Set(Some(asset.path.clone())),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;
    Ok(())
}

async fn insert_option_rows(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    options: &OptionMap,
    ledger: &StockLedger,
) -> Result<(), ServiceError> {
    for (name, values) in options {
        product_option::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            name: Set(name.clone()),
            option_values: Set(json!(values)),
        }
        .insert(txn)
        .await?;
    }

    for (key, stock) in ledger.iter() {
        product_option_stock::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            option_name: Set(key.name.clone()),
            option_value: Set(key.value.clone()),
            stock: Set(stock),
        }
        .insert(txn)
        .await?;
    }

    Ok(())
}

async fn set_product_stock(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    stock: i32,
) -> Result<(), ServiceError> {
    let product = Product::find_by_id(product_id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

    let mut active: product::ActiveModel = product.into();
    active.stock = Set(stock);
    active.update(txn).await?;
    Ok(())
}

fn record_orphaned_assets(main: &StoredAsset, secondary: &[StoredAsset]) {
    let count = 1 + secondary.len() as u64;
    counter!("catalog_assets_orphaned", count);
    warn!(
        main = %main.path,
        secondary = secondary.len(),
        "uploaded assets orphaned by failed transaction"
    );
}

fn validate_create(input: &CreateProductInput) -> Result<(), ServiceError> {
    let mut problems = Vec::new();

    if input.name.trim().is_empty() {
        problems.push("name must not be blank".to_string());
    }
    if input.description.trim().is_empty() {
        problems.push("description must not be blank".to_string());
    }
    if input.price <= Decimal::ZERO {
        problems.push("price must be positive".to_string());
    }
    if input.brand.trim().is_empty() {
        problems.push("brand must not be blank".to_string());
    }
    if matches!(input.stock, Some(stock) if stock < 0) {
        problems.push("stock cannot be negative".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(problems.join("; ")))
    }
}

fn validate_update(input: &UpdateProductInput) -> Result<(), ServiceError> {
    let mut problems = Vec::new();

    if matches!(&input.name, Some(name) if name.trim().is_empty()) {
        problems.push("name must not be blank".to_string());
    }
    if matches!(&input.description, Some(d) if d.trim().is_empty()) {
        problems.push("description must not be blank".to_string());
    }
    if matches!(input.price, Some(price) if price <= Decimal::ZERO) {
        problems.push("price must be positive".to_string());
    }
    if matches!(&input.brand, Some(brand) if brand.trim().is_empty()) {
        problems.push("brand must not be blank".to_string());
    }
    if matches!(input.stock, Some(stock) if stock < 0) {
        problems.push("stock cannot be negative".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(problems.join("; ")))
    }
}
