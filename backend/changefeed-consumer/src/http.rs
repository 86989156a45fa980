use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use tracing::error;

use crate::lifecycle::StatusTracker;
use crate::metrics;

async fn health() -> impl Responder {
    "OK"
}

async fn ready(status: web::Data<StatusTracker>) -> HttpResponse {
    if status.is_running() {
        HttpResponse::Ok().body("READY")
    } else {
        HttpResponse::ServiceUnavailable().body("NOT READY")
    }
}

async fn consumer_status(status: web::Data<StatusTracker>) -> HttpResponse {
    HttpResponse::Ok().json(status.report())
}

async fn metrics_handler() -> HttpResponse {
    match metrics::render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/ready", web::get().to(ready))
        .route("/status", web::get().to(consumer_status))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Bind the status server; the caller drives the returned future.
pub fn status_server(status: StatusTracker, port: u16) -> std::io::Result<Server> {
    let data = web::Data::new(status);
    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
        .workers(1)
        .disable_signals()
        .bind(("0.0.0.0", port))?
        .run();
    Ok(server)
}
