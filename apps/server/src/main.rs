//! # Gatekeep Server
//!
//! Actix-web server wrapping its handlers in the admission filter.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

mod config;
mod handlers;
mod middleware;
mod state;

use config::AppConfig;
use middleware::AdmissionFilter;
use state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing();

    // Load configuration
    let config = AppConfig::from_env();

    tracing::info!(
        "Starting Gatekeep server on {}:{} (threshold {}, window {}s)",
        config.host,
        config.port,
        config.limiter.threshold,
        config.limiter.window.as_secs()
    );

    // Build application state
    let state = AppState::new(&config).await;

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            // TracingLogger registered after the filter, so rejected
            // requests show up in the access log too.
            .wrap(AdmissionFilter::new(state.engine.clone()))
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gatekeep_server=debug,gatekeep_core=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}
