use std::process;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt::{writer::BoxMakeWriter, Layer}, layer::SubscriberExt, EnvFilter, Registry};

use backend_storefront::db::auth::AuthRepository;
use backend_storefront::payment::khqr::MerchantConfig;
use backend_storefront::payment::verify::SimulatedProbe;
use backend_storefront::routes::auth::hash_password;
use backend_storefront::{build_router, AppState};

#[tokio::main]
async fn main() {

    // mandatory fields
    let db_url = dotenv::var("DATABASE_URL").unwrap();
    let jwt_secret = dotenv::var("JWT_SECRET").unwrap_or("your-jwt-secret".to_string());
    // optional fields
    let max_connection_pooling = dotenv::var("MAX_CONNECTION_POOLING").unwrap_or("5".to_string()).parse::<u32>().unwrap();
    let port = dotenv::var("PORT").unwrap_or("3000".to_string()).parse::<u16>().unwrap();
    let log_file = dotenv::var("LOG_FILE").unwrap_or("app.log".to_string());
    let intent_ttl_secs = dotenv::var("INTENT_TTL_SECS").unwrap_or("120".to_string()).parse::<u64>().unwrap();
    let settlement_delay_secs = dotenv::var("SETTLEMENT_DELAY_SECS").unwrap_or("3".to_string()).parse::<u64>().unwrap();

    // add tracing layer
    let file_appender = tracing_appender::rolling::never(".", &log_file);
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, _guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = Layer::new().json().with_writer(BoxMakeWriter::new(move || file_writer.clone()));
    let stdout_layer = Layer::new().with_writer(BoxMakeWriter::new(move || stdout_writer.clone()));

    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(file_layer)
        .with(stdout_layer);

    tracing::subscriber::set_global_default(subscriber).expect("Unable to set global subscriber");

    let merchant = match MerchantConfig::from_env() {
        Ok(merchant) => {
            tracing::info!("Merchant configured: {}", merchant.merchant_name);
            merchant
        }
        Err(err) => {
            tracing::error!("Merchant configuration invalid: {}", err);
            process::exit(1);
        }
    };

    let database_pool = match process_database(&db_url, max_connection_pooling).await {
        Ok(db) => {
            tracing::info!("Connected to database");
            db
        },
        Err(err) => {
            tracing::error!("Failed to connect to database: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = seed_admin(&database_pool).await {
        tracing::warn!("Failed to seed admin account: {err}");
    }

    // the status route stays open so a settlement callback can reach it
    tracing::warn!("PATCH /api/transactions/status/:bill is unauthenticated; restrict it to the settlement callback network in production");

    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(port) => {
            tracing::info!("Listening on port: {}", port.local_addr().unwrap().port());
            port
        }
        Err(err) => {
            tracing::error!("Failed to bind to port: {}", err);
            process::exit(1);
        }
    };

    let probe = Arc::new(SimulatedProbe::new(Duration::from_secs(settlement_delay_secs)));
    let state = AppState::new(
        database_pool,
        jwt_secret,
        merchant,
        Duration::from_secs(intent_ttl_secs),
        probe,
    );
    let router = build_router(state);
    tracing::info!("Routes constructed successfully");

    //start the http service
    let http_service = axum::serve(listener, router);
    if let Err(err) = http_service.await {
        tracing::error!("Failed to start server: {}", err);
        process::exit(1);
    }
}

async fn process_database(url: &str, max_conn_pool: u32) -> Result<PgPool, String> {
    // create a connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(max_conn_pool)
        .connect(url)
        .await
        .map_err(|err| format!("Failed to connect to database: {}", err))?;

    match sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|err| format!("Failed to run migrations: {}", err))
    {
        Ok(_) => {
            tracing::info!("Migrations run successfully");
        },
        Err(err) => {
            // if it fails we assume to continue believing that the database is already migrated
            tracing::warn!("Failed to run migrations: {err}");
        },
    }

    Ok(db_pool)
}

async fn seed_admin(pool: &PgPool) -> Result<(), String> {
    let repo = AuthRepository::new(pool.clone());
    if repo.admin_exists().await.map_err(|err| err.to_string())? {
        return Ok(());
    }

    let username = dotenv::var("ADMIN_USERNAME").unwrap_or("admin".to_string());
    let password = dotenv::var("ADMIN_PASSWORD").unwrap_or("admin123".to_string());
    let email = dotenv::var("ADMIN_EMAIL").unwrap_or("admin@storefront.local".to_string());

    let password_hash = hash_password(&password).map_err(|err| err.to_string())?;
    repo.create_admin(&username, &email, &password_hash)
        .await
        .map_err(|err| err.to_string())?;

    tracing::info!("Default admin account created: {username}");
    Ok(())
}
