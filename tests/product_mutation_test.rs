mod common;

use assert_matches::assert_matches;
use catalog_api::{
    catalog::{
        mutation::{CreateProductInput, UpdateProductInput},
        sku::{SkuGenerator, MAX_SKU_ATTEMPTS},
        OptionMap,
    },
    entities::{
        product_image, product_option, product_option_stock, Product, ProductImage, ProductOption,
        ProductOptionStock,
    },
    errors::ServiceError,
};
use common::{sample_image, TestApp};
use rstest::rstest;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::collections::HashMap;
use uuid::Uuid;

fn base_input(category_id: Uuid, name: &str) -> CreateProductInput {
    CreateProductInput {
        name: name.to_string(),
        description: format!("{} description", name),
        price: dec!(19.99),
        brand: "Lumen".to_string(),
        category_id,
        stock: Some(5),
        is_active: None,
        main_image: sample_image("main.png"),
        additional_images: Vec::new(),
        options: OptionMap::new(),
        option_stock: HashMap::new(),
    }
}

fn color_size_options() -> OptionMap {
    let mut options = OptionMap::new();
    options.insert(
        "Color".to_string(),
        vec!["Red".to_string(), "Blue".to_string()],
    );
    options.insert("Size".to_string(), vec!["S".to_string(), "M".to_string()]);
    options
}

#[tokio::test]
async fn create_without_options_keeps_scalar_stock() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Lighting").await;

    let detail = app
        .state
        .services
        .mutation
        .create_product(base_input(category_id, "Desk Lamp"))
        .await
        .expect("create failed");

    assert_eq!(detail.product.stock, 5);
    assert!(detail.product.is_active);
    assert!(detail.options.is_empty());
    assert!(detail.option_stock.is_empty());

    // SKU shape: BRAND-TIMESTAMP-RANDOM, uppercase.
    let parts: Vec<&str> = detail.product.sku.split('-').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "LUM");

    // Exactly one image, and it is primary with a stored asset behind it.
    assert_eq!(detail.images.len(), 1);
    let primary = detail.primary_image().expect("no primary image");
    let path = primary.storage_path.as_deref().expect("no storage path");
    assert!(app.assets.contains(path));
}

#[tokio::test]
async fn create_with_options_sums_the_ledger() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Apparel").await;

    let mut input = base_input(category_id, "Wool Sweater");
    input.options = color_size_options();
    input.option_stock = HashMap::from([
        ("Color:Red".to_string(), 2),
        ("Size:M".to_string(), 1),
    ]);
    // Scalar stock must lose to the ledger total.
    input.stock = Some(99);

    let detail = app
        .state
        .services
        .mutation
        .create_product(input)
        .await
        .expect("create failed");

    assert_eq!(detail.product.stock, 3);
    assert_eq!(detail.options.len(), 2);
    assert_eq!(detail.option_stock.get("Color:Red"), Some(&2));
    assert_eq!(detail.option_stock.get("Size:M"), Some(&1));
    // Declared combinations without an entry simply have no row.
    assert_eq!(detail.option_stock.len(), 2);
}

#[tokio::test]
async fn create_with_undeclared_ledger_entry_writes_nothing() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Apparel").await;

    let mut input = base_input(category_id, "Phantom Product");
    input.options = color_size_options();
    input.option_stock = HashMap::from([("Material:Wool".to_string(), 4)]);

    let err = app
        .state
        .services
        .mutation
        .create_product(input)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InconsistentLedger(_));

    // Validation happens before uploads and before any row is written.
    let products = Product::find().all(&*app.state.db).await.unwrap();
    assert!(products.is_empty());
    assert_eq!(app.assets.object_count(), 0);
}

#[rstest]
#[case("NoSeparator")]
#[case(":Red")]
#[case("Color:")]
#[tokio::test]
async fn create_rejects_malformed_ledger_keys(#[case] key: &str) {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Apparel").await;

    let mut input = base_input(category_id, "Bad Ledger");
    input.options = color_size_options();
    input.option_stock = HashMap::from([(key.to_string(), 1)]);

    assert_matches!(
        app.state.services.mutation.create_product(input).await,
        Err(ServiceError::InconsistentLedger(_))
    );
}

#[tokio::test]
async fn create_fails_fast_when_upload_fails() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Lighting").await;

    app.assets.set_fail_uploads(true);

    let err = app
        .state
        .services
        .mutation
        .create_product(base_input(category_id, "Never Persisted"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AssetUploadFailed(_));

    let products = Product::find().all(&*app.state.db).await.unwrap();
    assert!(products.is_empty());
    let images = ProductImage::find().all(&*app.state.db).await.unwrap();
    assert!(images.is_empty());
}

#[tokio::test]
async fn create_rejects_unknown_category() {
    let app = TestApp::new().await;

    assert_matches!(
        app.state
            .services
            .mutation
            .create_product(base_input(Uuid::new_v4(), "Orphan"))
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn create_collects_field_validation_problems() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Lighting").await;

    let mut input = base_input(category_id, "  ");
    input.price = dec!(0);

    let err = app
        .state
        .services
        .mutation
        .create_product(input)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) => {
        assert!(msg.contains("name"));
        assert!(msg.contains("price"));
    });
}

#[tokio::test]
async fn update_patches_scalar_fields_only() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Lighting").await;

    let created = app
        .state
        .services
        .mutation
        .create_product(base_input(category_id, "Desk Lamp"))
        .await
        .unwrap();

    let updated = app
        .state
        .services
        .mutation
        .update_product(
            created.product.id,
            UpdateProductInput {
                name: Some("Desk Lamp v2".to_string()),
                price: Some(dec!(24.99)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.product.name, "Desk Lamp v2");
    assert_eq!(updated.product.price, dec!(24.99));
    // Untouched fields survive.
    assert_eq!(updated.product.brand, created.product.brand);
    assert_eq!(updated.product.sku, created.product.sku);
    assert_eq!(updated.product.stock, 5);
    assert_eq!(updated.images.len(), 1);
}

#[tokio::test]
async fn update_replaces_options_and_ledger_wholesale() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Apparel").await;

    let mut input = base_input(category_id, "Wool Sweater");
    input.options = color_size_options();
    input.option_stock = HashMap::from([("Color:Red".to_string(), 2)]);

    let created = app
        .state
        .services
        .mutation
        .create_product(input)
        .await
        .unwrap();
    assert_eq!(created.product.stock, 2);

    let mut new_options = OptionMap::new();
    new_options.insert(
        "Material".to_string(),
        vec!["Wool".to_string(), "Cotton".to_string()],
    );

    let updated = app
        .state
        .services
        .mutation
        .update_product(
            created.product.id,
            UpdateProductInput {
                options: Some(new_options),
                option_stock: Some(HashMap::from([
                    ("Material:Wool".to_string(), 4),
                    ("Material:Cotton".to_string(), 6),
                ])),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.product.stock, 10);
    assert_eq!(updated.options.len(), 1);
    assert_eq!(updated.options[0].name, "Material");
    assert!(updated.option_stock.contains_key("Material:Wool"));
    assert!(!updated.option_stock.contains_key("Color:Red"));

    // No stale rows survive the replacement.
    let stock_rows = ProductOptionStock::find()
        .filter(product_option_stock::Column::ProductId.eq(created.product.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(stock_rows.len(), 2);
    let option_rows = ProductOption::find()
        .filter(product_option::Column::ProductId.eq(created.product.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(option_rows.len(), 1);
}

#[tokio::test]
async fn repeating_an_identical_options_update_changes_nothing() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Apparel").await;

    let mut options = OptionMap::new();
    options.insert(
        "Color".to_string(),
        vec!["Red".to_string(), "Blue".to_string()],
    );
    let ledger = HashMap::from([
        ("Color:Red".to_string(), 2),
        ("Color:Blue".to_string(), 3),
    ]);

    let mut input = base_input(category_id, "Wool Sweater");
    input.options = options.clone();
    input.option_stock = ledger.clone();

    let created = app
        .state
        .services
        .mutation
        .create_product(input)
        .await
        .unwrap();
    assert_eq!(created.product.stock, 5);

    let same_update = || UpdateProductInput {
        options: Some(options.clone()),
        option_stock: Some(ledger.clone()),
        ..Default::default()
    };

    let first = app
        .state
        .services
        .mutation
        .update_product(created.product.id, same_update())
        .await
        .unwrap();
    let second = app
        .state
        .services
        .mutation
        .update_product(created.product.id, same_update())
        .await
        .unwrap();

    assert_eq!(first.product.stock, 5);
    assert_eq!(second.product.stock, 5);
    assert_eq!(second.option_stock, first.option_stock);

    // No duplicate rows accumulate across repeated identical updates.
    let option_rows = ProductOption::find()
        .filter(product_option::Column::ProductId.eq(created.product.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(option_rows.len(), 1);
    let stock_rows = ProductOptionStock::find()
        .filter(product_option_stock::Column::ProductId.eq(created.product.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(stock_rows.len(), 2);
}

#[tokio::test]
async fn create_rolls_back_when_a_row_write_fails() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Lighting").await;

    // Passes the service-level field checks but trips the entity's
    // description length limit inside the transaction.
    let mut input = base_input(category_id, "Overly Described");
    input.description = "x".repeat(3000);
    input.additional_images = vec![sample_image("side.png")];

    let err = app
        .state
        .services
        .mutation
        .create_product(input)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DatabaseError(_));

    // The transaction rolled back whole: no partial rows.
    let products = Product::find().all(&*app.state.db).await.unwrap();
    assert!(products.is_empty());
    let images = ProductImage::find().all(&*app.state.db).await.unwrap();
    assert!(images.is_empty());

    // Uploads preceded the transaction, so the objects stay behind as
    // orphans for out-of-band reconciliation.
    assert_eq!(app.assets.object_count(), 2);
}

#[tokio::test]
async fn sku_generation_gives_up_after_repeated_collisions() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Lighting").await;

    let created = app
        .state
        .services
        .mutation
        .create_product(base_input(category_id, "Desk Lamp"))
        .await
        .unwrap();
    let taken = created.product.sku.clone();

    let err = SkuGenerator::generate_with(&*app.state.db, || taken.clone())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::SkuGenerationExhausted(attempts) => {
        assert_eq!(attempts, MAX_SKU_ATTEMPTS);
    });
}

#[tokio::test]
async fn update_with_empty_options_clears_stock() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Apparel").await;

    let mut input = base_input(category_id, "Wool Sweater");
    input.options = color_size_options();
    input.option_stock = HashMap::from([("Color:Blue".to_string(), 7)]);

    let created = app
        .state
        .services
        .mutation
        .create_product(input)
        .await
        .unwrap();
    assert_eq!(created.product.stock, 7);

    let updated = app
        .state
        .services
        .mutation
        .update_product(
            created.product.id,
            UpdateProductInput {
                options: Some(OptionMap::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.product.stock, 0);
    assert!(updated.options.is_empty());
    assert!(updated.option_stock.is_empty());
}

#[tokio::test]
async fn update_ignores_scalar_stock_while_options_exist() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Apparel").await;

    let mut input = base_input(category_id, "Wool Sweater");
    input.options = color_size_options();
    input.option_stock = HashMap::from([("Size:S".to_string(), 3)]);

    let created = app
        .state
        .services
        .mutation
        .create_product(input)
        .await
        .unwrap();

    let updated = app
        .state
        .services
        .mutation
        .update_product(
            created.product.id,
            UpdateProductInput {
                stock: Some(50),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The ledger stays the source of truth.
    assert_eq!(updated.product.stock, 3);
}

#[tokio::test]
async fn update_replaces_primary_image_without_duplicates() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Lighting").await;

    let created = app
        .state
        .services
        .mutation
        .create_product(base_input(category_id, "Desk Lamp"))
        .await
        .unwrap();
    let old_path = created
        .primary_image()
        .and_then(|img| img.storage_path.clone())
        .expect("no primary asset");

    let updated = app
        .state
        .services
        .mutation
        .update_product(
            created.product.id,
            UpdateProductInput {
                main_image: Some(sample_image("new-main.png")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let primaries: Vec<_> = updated.images.iter().filter(|img| img.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(updated.images.len(), 1);

    // Old asset deleted, new one present.
    assert!(!app.assets.contains(&old_path));
    let new_path = primaries[0].storage_path.as_deref().unwrap();
    assert!(app.assets.contains(new_path));
}

#[tokio::test]
async fn update_appends_and_deletes_secondary_images() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Lighting").await;

    let mut input = base_input(category_id, "Desk Lamp");
    input.additional_images = vec![sample_image("side.png")];

    let created = app
        .state
        .services
        .mutation
        .create_product(input)
        .await
        .unwrap();
    assert_eq!(created.images.len(), 2);

    let secondary = created
        .images
        .iter()
        .find(|img| !img.is_primary)
        .expect("no secondary image")
        .clone();

    let updated = app
        .state
        .services
        .mutation
        .update_product(
            created.product.id,
            UpdateProductInput {
                additional_images: vec![sample_image("back.png")],
                deleted_image_ids: vec![secondary.id],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.images.len(), 2);
    assert!(updated.images.iter().all(|img| img.id != secondary.id));
    let deleted_path = secondary.storage_path.as_deref().unwrap();
    assert!(!app.assets.contains(deleted_path));
}

#[tokio::test]
async fn update_missing_product_is_not_found() {
    let app = TestApp::new().await;

    assert_matches!(
        app.state
            .services
            .mutation
            .update_product(Uuid::new_v4(), UpdateProductInput::default())
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn delete_removes_rows_and_assets() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Apparel").await;

    let mut input = base_input(category_id, "Wool Sweater");
    input.options = color_size_options();
    input.option_stock = HashMap::from([("Color:Red".to_string(), 1)]);
    input.additional_images = vec![sample_image("side.png")];

    let created = app
        .state
        .services
        .mutation
        .create_product(input)
        .await
        .unwrap();
    let id = created.product.id;
    assert_eq!(app.assets.object_count(), 2);

    app.state
        .services
        .mutation
        .delete_product(id)
        .await
        .expect("delete failed");

    assert!(Product::find_by_id(id).one(&*app.state.db).await.unwrap().is_none());
    let images = ProductImage::find()
        .filter(product_image::Column::ProductId.eq(id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert!(images.is_empty());
    let options = ProductOption::find()
        .filter(product_option::Column::ProductId.eq(id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert!(options.is_empty());
    let stock_rows = ProductOptionStock::find()
        .filter(product_option_stock::Column::ProductId.eq(id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert!(stock_rows.is_empty());
    assert_eq!(app.assets.object_count(), 0);
}

#[tokio::test]
async fn toggle_flips_the_active_flag() {
    let app = TestApp::new().await;
    let category_id = app.seed_category("Lighting").await;

    let created = app
        .state
        .services
        .mutation
        .create_product(base_input(category_id, "Desk Lamp"))
        .await
        .unwrap();
    assert!(created.product.is_active);

    let toggled = app
        .state
        .services
        .mutation
        .toggle_active(created.product.id)
        .await
        .unwrap();
    assert!(!toggled.product.is_active);

    let toggled_back = app
        .state
        .services
        .mutation
        .toggle_active(created.product.id)
        .await
        .unwrap();
    assert!(toggled_back.product.is_active);
}
