//! HTTP routes: a thin translation layer between the JSON surface and the
//! core's request types. User errors map to 400, everything else to 500.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use runbox_core::notebook::nbformat::Output;
use runbox_core::{
    EngineError, LangRunner, LanguageRequest, NotebookRequest, NotebookRunner, Overrides,
    RunResult,
};

pub struct AppState {
    pub lang: LangRunner,
    pub notebook: NotebookRunner,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/-/healthy", get(healthy))
        .route("/lang", post(run_lang))
        .route("/notebook", post(run_notebook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthy() -> &'static str {
    "Healthy.\n"
}

#[derive(Serialize)]
struct LangResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    logs: Vec<String>,
    #[serde(skip_serializing_if = "is_zero_i64")]
    code: i64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    cpu: u64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    mem: u64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    time: u64,
    #[serde(skip_serializing_if = "is_false")]
    timedout: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

impl From<RunResult> for LangResponse {
    fn from(result: RunResult) -> Self {
        LangResponse {
            logs: result
                .logs
                .iter()
                .map(|line| format!("{}{}", line.stream.code(), line.text))
                .collect(),
            code: result.code,
            cpu: result.cpu,
            mem: result.mem,
            time: result.time,
            timedout: result.timedout,
            images: result.images,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotebookResponse {
    cell_outputs: Vec<Vec<Output>>,
    cpu: u64,
    mem: u64,
    time: u64,
    timedout: bool,
}

async fn run_lang(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LanguageRequest>,
) -> Response {
    match state.lang.run(&body, Overrides::default()).await {
        Ok(result) => (StatusCode::OK, Json(LangResponse::from(result))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn run_notebook(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NotebookRequest>,
) -> Response {
    match state.notebook.execute(&body).await {
        Ok(result) => {
            let response = NotebookResponse {
                cell_outputs: result.cell_outputs,
                cpu: result.cpu,
                mem: result.mem,
                time: result.time,
                timedout: result.timedout,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => error_response(err),
    }
}

fn error_response(err: EngineError) -> Response {
    let status = if err.is_user_error() {
        StatusCode::BAD_REQUEST
    } else {
        log::error!("request failed: {err}");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn is_zero_i64(n: &i64) -> bool {
    *n == 0
}

fn is_zero_u64(n: &u64) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}
