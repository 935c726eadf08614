pub mod category;
pub mod product;
pub mod product_image;
pub mod product_option;
pub mod product_option_stock;

// Re-export entities
pub use category::{Entity as Category, Model as CategoryModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_image::{Entity as ProductImage, Model as ProductImageModel};
pub use product_option::{Entity as ProductOption, Model as ProductOptionModel};
pub use product_option_stock::{Entity as ProductOptionStock, Model as ProductOptionStockModel};
