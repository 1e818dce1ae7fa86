//! HTTP front end for the builder
//!
//! `POST /` runs a build, `GET /healthz` answers 200 with an empty body and
//! `GET /version` returns [`BuildInfo`] as JSON. Every build response is a
//! JSON [`BuildResponse`], including the failure ones.

use super::{BuildRequest, BuildResponse, Builder};
use crate::error::{FnplaneError, FnplaneResult};
use crate::info::BuildInfo;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Clone)]
struct ServerState {
    builder: Builder,
    info: Arc<BuildInfo>,
}

/// Routes for a builder
pub fn router(builder: Builder) -> Router {
    let state = ServerState {
        builder,
        info: Arc::new(BuildInfo::current().started_now()),
    };

    Router::new()
        .route("/", any(build_handler))
        .route("/healthz", get(healthz))
        .route("/version", get(version))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve<F>(builder: Builder, addr: SocketAddr, shutdown: F) -> FnplaneResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| FnplaneError::io(format!("binding builder to {}", addr), e))?;
    serve_listener(listener, builder, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_listener<F>(
    listener: TcpListener,
    builder: Builder,
    shutdown: F,
) -> FnplaneResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|e| FnplaneError::io("reading listener address", e))?;
    info!(
        %addr,
        shared_volume = %builder.shared_volume().display(),
        "builder listening"
    );

    axum::serve(listener, router(builder))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| FnplaneError::io("serving builder", e))?;

    info!("builder stopped");
    Ok(())
}

async fn build_handler(
    State(state): State<ServerState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let span = info_span!("build", request_id = %Uuid::new_v4());
    handle_build(state.builder, method, body)
        .instrument(span)
        .await
}

async fn handle_build(
    builder: Builder,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if method != Method::POST {
        let e = format!("method not allowed: {}", method);
        warn!("{}", e);
        return reply(StatusCode::METHOD_NOT_ALLOWED, &failure_body(e));
    }

    let started = Instant::now();
    let response = match decode(body) {
        Ok(request) => {
            info!(src = %request.src_pkg_filename, command = %request.command, "build request received");
            match builder.build(&request).await {
                Ok(resp) => reply(StatusCode::OK, &resp),
                Err(failure) => {
                    let status = StatusCode::from_u16(failure.status())
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    reply(status, &failure.into_response())
                }
            }
        }
        Err((status, e)) => {
            warn!("{}", e);
            reply(status, &failure_body(e))
        }
    };

    info!(
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "build request finished"
    );
    response
}

fn decode(body: Result<Bytes, BytesRejection>) -> Result<BuildRequest, (StatusCode, String)> {
    let body = body.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("error reading request body: {}", e),
        )
    })?;
    serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("error parsing json body: {}", e)))
}

fn failure_body(build_logs: String) -> BuildResponse {
    BuildResponse {
        artifact_filename: String::new(),
        build_logs,
    }
}

/// Encode `body` with `status`, falling back to a minimal 500 if encoding fails
fn reply<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let (status, bytes) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            warn!(error = %e, "error encoding response body");
            let logs = format!("error encoding response body: {}", e);
            let bytes = serde_json::json!({ "buildLogs": logs })
                .to_string()
                .into_bytes();
            (StatusCode::INTERNAL_SERVER_ERROR, bytes)
        }
    };

    (status, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], bytes).into_response()
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn version(State(state): State<ServerState>) -> Json<BuildInfo> {
    Json(state.info.as_ref().clone())
}
