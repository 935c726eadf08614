//! Catalog domain: product mutation pipeline, read side, asset handling,
//! option-stock ledger and SKU generation.

pub mod assets;
pub mod categories;
pub mod ledger;
pub mod mutation;
pub mod query;
pub mod sku;

pub use assets::{AssetStore, ImageUpload, InMemoryAssetStore, StoredAsset, SupabaseStorage};
pub use categories::{CategoryService, CreateCategoryInput};
pub use ledger::{OptionKey, OptionMap, StockLedger};
pub use mutation::{CreateProductInput, ProductMutationService, UpdateProductInput};
pub use query::{ProductDetail, ProductQueryService, ProductSummary};
pub use sku::SkuGenerator;
