use std::io::Cursor;
use std::sync::Arc;

use catalog_api::{
    catalog::{CreateCategoryInput, ImageUpload, InMemoryAssetStore},
    config::AppConfig,
    db, events, AppServices, AppState,
};
use image::{ImageBuffer, Rgb};
use uuid::Uuid;

/// Test harness backed by a file-based SQLite database in a temp directory
/// and the in-memory asset store.
pub struct TestApp {
    pub state: AppState,
    pub assets: Arc<InMemoryAssetStore>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: tempfile::TempDir,
}

impl TestApp {
    /// Construct a fresh application state with its own database file.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = db_dir.path().join("catalog_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let (event_sender, event_rx) = events::create_event_channel(64);
        let event_sender = Arc::new(event_sender);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let assets = Arc::new(InMemoryAssetStore::new());
        let services = AppServices::new(db.clone(), event_sender.clone(), assets.clone());

        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services,
        };

        Self {
            state,
            assets,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Builds the full application router, as `main` wires it.
    pub fn router(&self) -> axum::Router {
        axum::Router::new()
            .nest("/health", catalog_api::handlers::health::health_routes())
            .nest("/api/v1", catalog_api::api_v1_routes())
            .with_state(self.state.clone())
    }

    /// Inserts a category and returns its id.
    pub async fn seed_category(&self, name: &str) -> Uuid {
        self.state
            .services
            .categories
            .create_category(CreateCategoryInput {
                name: name.to_string(),
                description: None,
            })
            .await
            .expect("failed to seed category")
            .id
    }
}

/// A small but valid PNG for exercising the upload path.
pub fn sample_image(name: &str) -> ImageUpload {
    let img = ImageBuffer::from_pixel(4, 4, Rgb([120u8, 90, 200]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("failed to encode sample png");
    ImageUpload::new(bytes, name.to_string())
}
