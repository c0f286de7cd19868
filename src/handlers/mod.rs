pub mod anonymize;

pub use anonymize::anonymize;

use crate::health;
use actix_web::web;

/// Register every route, both at the root and under `/api/v1`.
///
/// Used by `main` and by handler tests so both see the same route table.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/v1").configure(routes))
        .configure(routes);
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/anonymize", web::post().to(anonymize))
        .route("/health", web::get().to(health::health_check))
        .route("/metrics", web::get().to(health::detailed_metrics));
}
