//! HTTP surface.
//!
//! - `GET  /health`    → `{"status":"ok"}`
//! - `POST /api/query` → `{"user_prompt": "...", "location": "..."?}`
//!
//! `/api/query` answers 200 with `{"answer"}` or `{"message"}` (and with a
//! plan parse `{"error"}`), 400 when the body is unusable, and 500 with
//! `{"error"}` when an adapter fails. Every response carries CORS headers;
//! `OPTIONS` is answered as a preflight. Each connection runs on its own
//! tokio task.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE, ORIGIN};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::Instrument;

use floatchat_query::{error_body, QueryEngine, QueryRequest};

use crate::settings::CorsOrigins;

pub struct ServerState {
    pub engine: QueryEngine,
    pub cors: CorsOrigins,
}

/// Bind `listen` and serve until the process exits.
pub async fn serve(listen: SocketAddr, state: Arc<ServerState>) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {listen}: {e}"))?;
    serve_listener(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve_listener(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;
    tracing::info!(addr = %bound, "listening on http://{bound}");

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("serve: accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(%peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let request_id = uuid::Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let span = tracing::info_span!("request", id = %request_id, %method, %path);

    let mut resp = async {
        let resp = match (&method, path.as_str()) {
            (&Method::OPTIONS, _) => empty_response(StatusCode::NO_CONTENT),
            (&Method::GET, "/health") => {
                json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
            }
            (&Method::POST, "/api/query") => {
                let body = req.into_body().collect().await?.to_bytes();
                handle_query(&state, &body).await
            }
            (_, "/health") | (_, "/api/query") => {
                json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
            }
            _ => json_error(StatusCode::NOT_FOUND, "not found"),
        };
        tracing::info!(status = resp.status().as_u16(), "handled");
        Ok::<_, hyper::Error>(resp)
    }
    .instrument(span)
    .await?;

    apply_cors(&mut resp, &state.cors, origin.as_deref());
    Ok(resp)
}

async fn handle_query(state: &ServerState, body: &[u8]) -> Response<Full<Bytes>> {
    let request: QueryRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &format!("invalid request body: {e}")),
    };
    if request.user_prompt.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "user_prompt must not be empty");
    }

    match state.engine.answer_request(&request).await {
        Ok(outcome) => json_response(StatusCode::OK, &outcome),
        Err(e) => {
            tracing::error!(error = %e, stage = %e.stage(), "query failed");
            json_response(StatusCode::INTERNAL_SERVER_ERROR, &error_body(&e))
        }
    }
}

fn apply_cors(resp: &mut Response<Full<Bytes>>, cors: &CorsOrigins, origin: Option<&str>) {
    let Some(allowed) = cors.allow(origin) else {
        return;
    };
    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&allowed) {
        headers.insert("access-control-allow-origin", v);
    }
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type, authorization"),
    );
    if matches!(cors, CorsOrigins::List(_)) {
        headers.insert("vary", HeaderValue::from_static("origin"));
        headers.insert(
            "access-control-allow-credentials",
            HeaderValue::from_static("true"),
        );
    }
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": msg }))
}
