/// Route table for the HTTP boundary
use crate::config::settings::RunnerConfig;
use crate::config::types::{ExecutionResult, FailureKind};
use crate::core::pool::WorkerPool;
use crate::core::types::{CommandSpec, Submission};
use crate::server::http::{Request, Response};
use crate::tree::Node;
use serde::Deserialize;
use serde_json::json;

/// Body of `POST /pyjson`
#[derive(Debug, Deserialize)]
pub struct ProgramRequest {
    #[serde(default)]
    pub filename: Option<String>,
    pub code: Node,
}

/// Body of `POST /cli`
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

/// Shared state behind every connection
pub struct AppState {
    pub config: RunnerConfig,
    pub pool: WorkerPool,
}

pub fn handle(request: &Request, state: &AppState) -> Response {
    log::debug!("{} {}", request.method, request.path);
    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => Response::empty(204),
        ("GET", "/") => Response::json(200, &json!({"message": "This is the root of the API."})),
        ("GET", "/config") => Response::json(
            200,
            &json!({"status": "success", "config": state.config}),
        ),
        ("POST", "/pyjson") => match serde_json::from_slice::<ProgramRequest>(&request.body) {
            Ok(body) => result_response(state.pool.submit(Submission::Program {
                filename: body.filename,
                tree: body.code,
            })),
            Err(e) => bad_request(format!("invalid program request: {e}")),
        },
        ("POST", "/cli") => match serde_json::from_slice::<CommandRequest>(&request.body) {
            Ok(body) => result_response(
                state
                    .pool
                    .submit(Submission::Command(CommandSpec::new(body.command))),
            ),
            Err(e) => bad_request(format!("invalid command request: {e}")),
        },
        (_, "/" | "/config" | "/pyjson" | "/cli") => Response::json(
            405,
            &json!({"status": "error", "stderr": format!("method {} not allowed", request.method)}),
        ),
        _ => not_found(&request.path),
    }
}

/// Execution failures are still a well-formed answer, so they go out as 200
fn result_response(result: ExecutionResult) -> Response {
    match serde_json::to_value(&result) {
        Ok(value) => Response::json(200, &value),
        Err(e) => Response::json(
            500,
            &json!({"status": "error", "stderr": e.to_string(), "error_kind": FailureKind::InternalError}),
        ),
    }
}

pub fn bad_request(message: impl Into<String>) -> Response {
    let result = ExecutionResult::failure(FailureKind::BadRequest, message);
    Response::json(
        400,
        &json!({"status": result.status, "stderr": result.stderr, "error_kind": result.error_kind}),
    )
}

fn not_found(path: &str) -> Response {
    Response::json(
        404,
        &json!({"status": "error", "stderr": format!("no route for {path}")}),
    )
}
