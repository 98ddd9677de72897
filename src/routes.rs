mod health;
mod run;

pub use health::{health_handler, root_handler};
pub use run::run_handler;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse};
use serde::Serialize;

/// Error body returned for every failed request.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl ErrorResponse {
    fn validation(error: impl Into<String>, request_id: String) -> Self {
        Self {
            error: error.into(),
            phase: None,
            request_id: Some(request_id),
        }
    }

    fn execution(error: impl Into<String>, request_id: String) -> Self {
        Self {
            error: error.into(),
            phase: Some("execution"),
            request_id: Some(request_id),
        }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        error: "Request body must be valid JSON".to_string(),
        phase: None,
        request_id: None,
    });
    InternalError::from_response(err, response).into()
}
