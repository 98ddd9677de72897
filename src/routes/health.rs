use actix_web::{HttpResponse, Responder, get, web};
use serde_json::json;
use uuid::Uuid;

use crate::create_timestamp;
use crate::sandbox::supported_languages;
use crate::stats::ServiceStats;

#[get("/health")]
pub async fn health_handler(stats: web::Data<ServiceStats>) -> impl Responder {
    log::debug!("health check request received");

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "message": "Code runner service is operational",
        "time": create_timestamp(),
        "process": stats.snapshot(),
        "request_id": Uuid::new_v4().to_string(),
    }))
}

#[get("/")]
pub async fn root_handler() -> impl Responder {
    log::debug!("root endpoint request received");

    HttpResponse::Ok().json(json!({
        "service": "Code Runner Service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/run": "POST - Run a code snippet",
            "/health": "GET - Service health check",
        },
        "supported_languages": supported_languages(),
        "request_id": Uuid::new_v4().to_string(),
    }))
}
