//! Read-only catalog retrieval, used by the external read endpoints and by
//! the mutation engine to diff current against desired state.

use crate::{
    catalog::ledger::{OptionKey, StockLedger},
    entities::{
        category, product, product_image, product_option, product_option_stock, Category, Product,
        ProductImage, ProductOption, ProductOptionStock,
    },
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Category reference embedded in product reads.
#[derive(Clone, Debug, Serialize)]
pub struct CategoryRef {
    pub id: Uuid,
    pub name: String,
}

impl From<category::Model> for CategoryRef {
    fn from(model: category::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

/// Declared option axis with its ordered values.
#[derive(Clone, Debug, Serialize)]
pub struct ProductOptionView {
    pub name: String,
    pub values: Vec<String>,
}

/// A product joined with its category reference, images, declared options
/// and stock ledger (ledger keys in the `"name:value"` wire form).
#[derive(Clone, Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: product::Model,
    pub category: Option<CategoryRef>,
    pub images: Vec<product_image::Model>,
    pub options: Vec<ProductOptionView>,
    pub option_stock: HashMap<String, i32>,
}

impl ProductDetail {
    /// Rebuilds the typed ledger from the persisted rows.
    pub fn ledger(&self) -> StockLedger {
        let mut ledger = StockLedger::new();
        for (key, stock) in &self.option_stock {
            if let Ok(parsed) = OptionKey::parse(key) {
                ledger.insert(parsed, *stock);
            }
        }
        ledger
    }

    pub fn primary_image(&self) -> Option<&product_image::Model> {
        self.images.iter().find(|img| img.is_primary)
    }
}

/// Compact projection for listings: category reference plus the primary
/// image only, matching what catalog tables and storefront grids need.
#[derive(Clone, Debug, Serialize)]
pub struct ProductSummary {
    #[serde(flatten)]
    pub product: product::Model,
    pub category: Option<CategoryRef>,
    pub primary_image_url: Option<String>,
}

#[derive(Clone)]
pub struct ProductQueryService {
    db: Arc<DatabaseConnection>,
}

impl ProductQueryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Returns the product with images, options and ledger, or `None` when
    /// absent. Callers decide whether absence is an error.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<Option<ProductDetail>, ServiceError> {
        let Some(product) = Product::find_by_id(id).one(&*self.db).await? else {
            return Ok(None);
        };

        let category = Category::find_by_id(product.category_id)
            .one(&*self.db)
            .await?
            .map(CategoryRef::from);

        let images = ProductImage::find()
            .filter(product_image::Column::ProductId.eq(id))
            .order_by_desc(product_image::Column::IsPrimary)
            .order_by_asc(product_image::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let options = ProductOption::find()
            .filter(product_option::Column::ProductId.eq(id))
            .order_by_asc(product_option::Column::Name)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|row| ProductOptionView {
                values: row.values(),
                name: row.name,
            })
            .collect();

        let option_stock = ProductOptionStock::find()
            .filter(product_option_stock::Column::ProductId.eq(id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|row| {
                (
                    OptionKey::new(row.option_name, row.option_value).storage_key(),
                    row.stock,
                )
            })
            .collect();

        Ok(Some(ProductDetail {
            product,
            category,
            images,
            options,
            option_stock,
        }))
    }

    /// Like [`get_product`](Self::get_product) but absence is an error.
    pub async fn get_product_details(&self, id: Uuid) -> Result<ProductDetail, ServiceError> {
        self.get_product(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    /// All products, newest first.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<ProductSummary>, ServiceError> {
        let products = Product::find()
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        self.summarize(products).await
    }

    /// Products in one category. The storefront passes
    /// `include_inactive = false`; the admin console passes `true`.
    #[instrument(skip(self))]
    pub async fn list_by_category(
        &self,
        category_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<ProductSummary>, ServiceError> {
        let mut query = Product::find().filter(product::Column::CategoryId.eq(category_id));

        if !include_inactive {
            query = query.filter(product::Column::IsActive.eq(true));
        }

        let products = query
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        self.summarize(products).await
    }

    async fn summarize(
        &self,
        products: Vec<product::Model>,
    ) -> Result<Vec<ProductSummary>, ServiceError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let category_ids: Vec<Uuid> = products.iter().map(|p| p.category_id).collect();

        let categories: HashMap<Uuid, CategoryRef> = Category::find()
            .filter(category::Column::Id.is_in(category_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, CategoryRef::from(c)))
            .collect();

        let primary_images: HashMap<Uuid, String> = ProductImage::find()
            .filter(product_image::Column::ProductId.is_in(product_ids))
            .filter(product_image::Column::IsPrimary.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|img| (img.product_id, img.url))
            .collect();

        Ok(products
            .into_iter()
            .map(|product| ProductSummary {
                category: categories.get(&product.category_id).cloned(),
                primary_image_url: primary_images.get(&product.id).cloned(),
                product,
            })
            .collect())
    }
}
