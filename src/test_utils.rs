#[cfg(test)]
pub mod test_utils {
    use crate::config::Settings;
    use crate::insights::FallbackInsights;
    use crate::mailer::RecordingMailer;
    use crate::router::create_router;
    use crate::scheduler::events::{event_channel, EventReceiver};
    use crate::schemas::AppState;
    use axum::Router;
    use chrono::Utc;
    use migration::{Migrator, MigratorTrait};
    use model::entities::{budget, user};
    use moka::future::Cache;
    use rust_decimal::Decimal;
    use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
    use std::sync::Arc;
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    /// Create an in-memory SQLite database for testing
    pub async fn setup_test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to connect to in-memory database");

        // Run migrations
        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        db
    }

    /// A migrated SQLite database in a temporary file, for tests that need
    /// several connections to see the same data.
    pub async fn setup_file_test_db(name: &str) -> DatabaseConnection {
        let path = std::env::temp_dir().join(format!("spendwise_{}_{}.db", name, std::process::id()));
        let _ = std::fs::remove_file(&path);

        let db = Database::connect(format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .expect("Failed to connect to file database");
        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        db
    }

    /// Insert a user whose external id and email are derived from `name`.
    pub async fn create_test_user(db: &DatabaseConnection, name: &str) -> user::Model {
        let now = Utc::now();
        user::ActiveModel {
            external_id: Set(format!("ext_{}", name)),
            email: Set(format!("{}@example.com", name)),
            name: Set(Some(name.to_string())),
            image_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create test user")
    }

    pub async fn create_test_budget(
        db: &DatabaseConnection,
        user_id: i32,
        amount: Decimal,
    ) -> budget::Model {
        let now = Utc::now();
        budget::ActiveModel {
            amount: Set(amount),
            last_alert_sent: Set(None),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create test budget")
    }

    /// AppState over a fresh database, returning the event receiver so tests
    /// can observe queued job events.
    pub async fn setup_test_app_state_with_events(
        mailer: RecordingMailer,
    ) -> (AppState, EventReceiver) {
        let db = setup_test_db().await;
        let settings = Settings::defaults().expect("Failed to load default settings");
        let (events, receiver) = event_channel();

        let state = AppState {
            db,
            cache: Cache::builder()
                .max_capacity(100)
                .support_invalidation_closures()
                .build(),
            stats_generation: Arc::default(),
            mailer: Arc::new(mailer),
            insights: Arc::new(FallbackInsights),
            events,
            settings: Arc::new(settings),
        };
        (state, receiver)
    }

    pub async fn setup_test_app_state_with_mailer(mailer: RecordingMailer) -> AppState {
        let (state, receiver) = setup_test_app_state_with_events(mailer).await;
        // Keeps the channel open so job triggers can still queue events.
        std::mem::forget(receiver);
        state
    }

    /// Create AppState for testing
    pub async fn setup_test_app_state() -> AppState {
        setup_test_app_state_with_mailer(RecordingMailer::new()).await
    }

    /// Initialize tracing for tests with output to STDERR.
    ///
    /// The log level is taken from RUST_LOG, defaulting to WARN.
    pub fn init_test_tracing() -> tracing::subscriber::DefaultGuard {
        let log_level = std::env::var("RUST_LOG")
            .ok()
            .and_then(|level| match level.to_uppercase().as_str() {
                "ERROR" => Some(Level::ERROR),
                "WARN" => Some(Level::WARN),
                "INFO" => Some(Level::INFO),
                "DEBUG" => Some(Level::DEBUG),
                "TRACE" => Some(Level::TRACE),
                _ => None,
            })
            .unwrap_or(Level::WARN);

        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Create axum app for testing
    pub async fn setup_test_app() -> Router {
        let _guard = init_test_tracing();
        let state = setup_test_app_state().await;
        create_router(state)
    }

    /// Like [`setup_test_app`], also handing back the state and mailer so a
    /// test can inspect the database and sent emails.
    pub async fn setup_test_app_with_state() -> (Router, AppState, RecordingMailer) {
        let _guard = init_test_tracing();
        let mailer = RecordingMailer::new();
        let state = setup_test_app_state_with_mailer(mailer.clone()).await;
        (create_router(state.clone()), state, mailer)
    }
}
