use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use sqlx::PgPool;
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer};

pub mod db;
pub mod error;
pub mod payment;
pub mod routes;

use db::auth::AuthRepository;
use db::catalog::CatalogRepository;
use db::feedback::FeedbackRepository;
use db::tx::TransactionRepository;
use payment::khqr::MerchantConfig;
use payment::verify::{SettlementProbe, VerifyService};
use routes::auth::AuthService;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub transactions: TransactionRepository,
    pub catalog: CatalogRepository,
    pub feedbacks: FeedbackRepository,
    pub verifier: Arc<VerifyService>,
    pub merchant: MerchantConfig,
    pub intent_ttl: Duration,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        jwt_secret: String,
        merchant: MerchantConfig,
        intent_ttl: Duration,
        probe: Arc<dyn SettlementProbe>,
    ) -> Self {
        let transactions = TransactionRepository::new(pool.clone());
        let verifier = Arc::new(VerifyService::new(transactions.clone(), probe, intent_ttl));

        Self {
            auth: Arc::new(AuthService::new(AuthRepository::new(pool.clone()), jwt_secret)),
            catalog: CatalogRepository::new(pool.clone()),
            feedbacks: FeedbackRepository::new(pool),
            transactions,
            verifier,
            merchant,
            intent_ttl,
        }
    }
}

async fn root() -> &'static str {
    "Storefront API is running..."
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = routes::auth::auth_routes(state.clone());
    let catalog_routes = routes::catalog::catalog_routes(state.clone());
    let feedback_routes = routes::feedback::feedback_routes(state.clone());
    let tx_routes =
        routes::tx::tx_routes(state).route_layer(CompressionLayer::new().gzip(true));

    Router::new()
        .route("/", get(root))
        .nest("/api", auth_routes)
        .nest("/api", catalog_routes)
        .nest("/api", feedback_routes)
        .nest("/api", tx_routes)
        .route_layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
}
