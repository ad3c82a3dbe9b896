#![forbid(unsafe_code)]

use std::{env, net::SocketAddr};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use margin_adapter::{file_type_for_field, AskRequestBody, GatewayError, GatewayRuntime};
use margin_contracts::upload::FileType;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let bind = env::var("MARGIN_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;
    let runtime = GatewayRuntime::default_from_env();

    let app = Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/ingest", post(ingest))
        .route("/margins", get(margins))
        .route("/margins/summary", get(margins_summary))
        .route("/ask", post(ask))
        .with_state(runtime);

    tracing::info!(%addr, "margin gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(serde::Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

#[derive(serde::Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
}

#[derive(serde::Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

fn ok_response<T: serde::Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            data,
        }),
    )
        .into_response()
}

fn err_response(err: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::warn!(code = err.code(), status = status.as_u16(), "request failed: {err}");
    (
        status,
        Json(ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: err.code(),
                message: err.to_string(),
            },
        }),
    )
        .into_response()
}

async fn health() -> Response {
    ok_response(serde_json::json!({ "status": "ok" }))
}

async fn upload(State(runtime): State<GatewayRuntime>, mut multipart: Multipart) -> Response {
    let mut files: Vec<(FileType, String, Vec<u8>)> = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return err_response(&GatewayError::MultipartUnreadable(err.to_string()));
            }
        };
        let Some(field_name) = field.name().map(str::to_string) else {
            continue;
        };
        let Some(file_type) = file_type_for_field(&field_name) else {
            return err_response(&GatewayError::UnknownField(field_name));
        };
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("{}.csv", file_type.as_str()));
        match field.bytes().await {
            Ok(bytes) => files.push((file_type, filename, bytes.to_vec())),
            Err(err) => {
                return err_response(&GatewayError::MultipartUnreadable(err.to_string()));
            }
        }
    }
    match runtime.upload(files) {
        Ok(report) => ok_response(report),
        Err(err) => err_response(&err),
    }
}

async fn ingest(State(runtime): State<GatewayRuntime>) -> Response {
    match runtime.ingest() {
        Ok(outcome) => ok_response(outcome),
        Err(err) => err_response(&err),
    }
}

async fn margins(State(runtime): State<GatewayRuntime>) -> Response {
    match runtime.margins() {
        Ok((rows, _summary)) => ok_response(rows),
        Err(err) => err_response(&err),
    }
}

async fn margins_summary(State(runtime): State<GatewayRuntime>) -> Response {
    match runtime.margins() {
        Ok((_rows, summary)) => ok_response(summary),
        Err(err) => err_response(&err),
    }
}

async fn ask(State(runtime): State<GatewayRuntime>, Json(request): Json<AskRequestBody>) -> Response {
    match runtime.ask(&request) {
        Ok(answer) => ok_response(answer),
        Err(err) => err_response(&err),
    }
}
