//! Test endpoint protected by the admission filter.

use actix_web::HttpResponse;

use gatekeep_shared::ApiResponse;

/// Trivial endpoint for exercising the filter.
///
/// GET /ping
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok("pong"))
}
