//! HTTP handlers and route configuration.

mod health;
mod ping;

use actix_web::web;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::get().to(ping::ping))
        .route("/health", web::get().to(health::health_check));
}
