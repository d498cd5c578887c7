mod api;
mod authentication;
mod db;
mod errors;
mod media;
mod system;

use std::error::Error;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use axum_prometheus::PrometheusMetricLayer;
use sqlx::PgPool;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::api::v1::routes::create_v1_routes;
use crate::authentication::TokenSettings;
use crate::db::init_db;
use crate::media::MediaClient;
use crate::system::health_check;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct InnerState {
    pub db: PgPool,
    pub media: MediaClient,
    pub tokens: TokenSettings,
}

/// Uploaded video files are large; the default axum body cap is far too
/// small for them.
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_videotube=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = init_db().await?;

    let media = MediaClient::new(
        std::env::var("MEDIA_BASE_URL")?,
        std::env::var("MEDIA_API_KEY")?,
    )?;

    let tokens = TokenSettings::from_env()?;

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let cors_origin = std::env::var("CORS_ORIGIN")?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let app_state = InnerState { db, media, tokens };

    let app = Router::new()
        .nest("/api/v1", create_v1_routes(app_state.clone()))
        .route("/health", get(health_check))
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CookieManagerLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(prometheus_layer)
        .with_state(app_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::debug!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
