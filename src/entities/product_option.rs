use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One dynamically-named axis of variation (e.g. "Color").
/// The whole option set of a product is replaced wholesale on update.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_options")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub product_id: Uuid,

    /// Option name, unique per product
    pub name: String,

    /// Ordered list of permitted values, stored as a JSON array
    #[sea_orm(column_type = "Json")]
    pub option_values: Json,
}

impl Model {
    /// Decodes the JSON value list back into strings, skipping anything
    /// that is not a string (the services only ever write string arrays).
    pub fn values(&self) -> Vec<String> {
        self.option_values
            .as_array()
            .map(|vals| {
                vals.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
