use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Product entity
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Product name
    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// Product description
    #[sea_orm(column_type = "Text")]
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: String,

    /// Unit price
    pub price: Decimal,

    /// Aggregate stock. Equals the sum of the option-stock ledger whenever
    /// the product declares options; an independent scalar otherwise.
    pub stock: i32,

    /// SKU (Stock Keeping Unit), unique across the catalog
    #[validate(length(
        min = 1,
        max = 100,
        message = "SKU must be between 1 and 100 characters"
    ))]
    pub sku: String,

    /// Product brand
    #[validate(length(min = 1, max = 100, message = "Brand is required"))]
    pub brand: String,

    /// Owning category
    pub category_id: Uuid,

    /// Is the product visible on the storefront
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,

    #[sea_orm(has_many = "super::product_image::Entity")]
    Images,

    #[sea_orm(has_many = "super::product_option::Entity")]
    Options,

    #[sea_orm(has_many = "super::product_option_stock::Entity")]
    OptionStock,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::product_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl Related<super::product_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Options.def()
    }
}

impl Related<super::product_option_stock::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OptionStock.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.is_active {
                active_model.is_active = Set(true);
            }
            active_model.created_at = Set(Utc::now());
        }

        active_model.updated_at = Set(Utc::now());

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        if model.price <= Decimal::ZERO {
            return Err(DbErr::Custom(
                "Validation error: price must be positive".to_string(),
            ));
        }

        if model.stock < 0 {
            return Err(DbErr::Custom(
                "Validation error: stock cannot be negative".to_string(),
            ));
        }

        Ok(active_model)
    }
}
