use actix_web::{HttpResponse, Responder, post, web};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ErrorResponse;
use crate::sandbox::{ExecutionRequest, Sandbox};
use crate::stats::ServiceStats;

#[derive(Deserialize, Debug)]
pub struct RunRequest {
    pub language: Option<String>,
    pub code: Option<String>,
    pub timeout: Option<u64>,
}

#[derive(Serialize, Debug)]
pub struct RunResponse {
    pub output: String,
    /// Execution-phase wall-clock time in seconds.
    pub execution_time: f64,
    pub language: String,
    pub output_length: usize,
    pub request_id: String,
}

#[post("/run")]
pub async fn run_handler(
    sandbox: web::Data<Sandbox>,
    stats: web::Data<ServiceStats>,
    body: web::Json<RunRequest>,
) -> impl Responder {
    let request_id = Uuid::new_v4().to_string();
    log::info!("[{request_id}] processing code execution request");

    let body = body.into_inner();
    let mut violations = Vec::new();
    if body.language.as_deref().is_none_or(str::is_empty) {
        violations.push("Missing 'language' parameter");
    }
    if body.code.as_deref().is_none_or(str::is_empty) {
        violations.push("Missing 'code' parameter");
    }
    if !violations.is_empty() {
        let message = violations.join("; ");
        log::warn!("[{request_id}] validation failed: {message}");
        return HttpResponse::BadRequest().json(ErrorResponse::validation(message, request_id));
    }

    let request = ExecutionRequest {
        language: body.language.unwrap_or_default(),
        code: body.code.unwrap_or_default(),
        timeout_secs: body.timeout,
    };
    log::info!(
        "[{request_id}] executing {} code [timeout={:?}, code_length={}]",
        request.language,
        request.timeout_secs,
        request.code.len()
    );

    let _guard = stats.begin_execution();
    match sandbox.execute(&request).await {
        Ok(result) => {
            let execution_time = (result.execution_time.as_secs_f64() * 1000.0).round() / 1000.0;
            log::info!(
                "[{request_id}] execution completed in {execution_time:.3}s \
                 [exit_code={}, timed_out={}]",
                result.exit_code,
                result.timed_out
            );

            HttpResponse::Ok().json(RunResponse {
                output_length: result.output.len(),
                output: result.output,
                execution_time,
                language: request.language,
                request_id,
            })
        }
        Err(e) if e.is_caller_fault() => {
            log::warn!("[{request_id}] rejected: {e}");
            HttpResponse::BadRequest().json(ErrorResponse::validation(e.to_string(), request_id))
        }
        Err(e) => {
            log::error!("[{request_id}] execution error: {e}");
            HttpResponse::InternalServerError()
                .json(ErrorResponse::execution(e.to_string(), request_id))
        }
    }
}
