//! HTTP API
//!
//! - `GET /predict?date=YYYY-MM-DD` forecast and allocations (default: tomorrow)
//! - `POST /upload_csv` replace the event log and retrain
//! - `GET /health` liveness, current snapshot id and load time
//! - `GET /metrics` Prometheus text format
//!
//! Uses hyper directly. JSON responses carry a permissive CORS header so the
//! browser front end can call the API from another origin.

use crate::domain::error::{LoadError, PredictError, UploadError};
use crate::domain::types::Horizon;
use crate::infra::metrics::PredictFailure;
use crate::io::prometheus::format_prometheus_metrics;
use crate::io::upload::{extract_csv, read_limited};
use crate::services::predictor::Predictor;
use bytes::Bytes;
use chrono::{DateTime, Local, NaiveDate, Utc};
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

const JSON: &str = "application/json";

/// Shared state for request handlers
pub struct AppState {
    predictor: Arc<Predictor>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(predictor: Arc<Predictor>, max_upload_bytes: usize) -> Self {
        Self { predictor, max_upload_bytes }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    horizon: Option<Horizon>,
}

#[derive(Debug, Serialize)]
struct UploadBody {
    message: &'static str,
    snapshot_id: String,
    rows: usize,
    days: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    horizon: Option<Horizon>,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    git_hash: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_loaded_at: Option<DateTime<Utc>>,
}

fn response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let mut resp = match serde_json::to_vec(body) {
        Ok(json) => response(status, JSON, json),
        Err(e) => {
            error!(error = %e, "response_serialization_failed");
            response(
                StatusCode::INTERNAL_SERVER_ERROR,
                JSON,
                r#"{"error":"internal","message":"serialization failed"}"#,
            )
        }
    };
    resp.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    resp
}

fn error_response(
    status: StatusCode,
    reason: &str,
    message: String,
    horizon: Option<Horizon>,
) -> Response<Full<Bytes>> {
    json_response(status, &ErrorBody { error: reason, message, horizon })
}

fn preflight(methods: &'static str) -> Response<Full<Bytes>> {
    let mut resp = response(StatusCode::NO_CONTENT, "text/plain", Bytes::new());
    let headers = resp.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert("Access-Control-Allow-Methods", HeaderValue::from_static(methods));
    headers.insert("Access-Control-Allow-Headers", HeaderValue::from_static("Content-Type"));
    resp
}

/// First value of a query parameter
fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then_some(value)
    })
}

fn predict_status(err: &PredictError) -> StatusCode {
    match err {
        PredictError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        PredictError::OutOfHorizon { .. } | PredictError::NoEstimate { .. } => StatusCode::NOT_FOUND,
        PredictError::InsufficientData => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn upload_status(err: &UploadError) -> StatusCode {
    match err {
        UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        UploadError::Load(LoadError::Model(_)) => StatusCode::BAD_GATEWAY,
        UploadError::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn tomorrow() -> NaiveDate {
    let today = Local::now().date_naive();
    today.succ_opt().unwrap_or(today)
}

fn handle_predict(query: Option<&str>, state: &AppState) -> Response<Full<Bytes>> {
    let date = match query_param(query, "date").filter(|d| !d.is_empty()) {
        None => tomorrow(),
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => {
                state.predictor.metrics().record_prediction_failure(PredictFailure::InvalidDate);
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_date",
                    format!("date must be YYYY-MM-DD, got {raw:?}"),
                    None,
                );
            }
        },
    };

    match state.predictor.predict(date) {
        Ok(report) => json_response(StatusCode::OK, &report),
        Err(e) => error_response(predict_status(&e), e.reason(), e.to_string(), e.horizon()),
    }
}

async fn handle_upload<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let content_type =
        req.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string);

    let result = async {
        let body = read_limited(req.into_body(), state.max_upload_bytes).await?;
        let csv = extract_csv(content_type.as_deref(), body).await?;
        state.predictor.retrain_from_upload(&csv).await
    }
    .await;

    match result {
        Ok(snapshot) => json_response(
            StatusCode::OK,
            &UploadBody {
                message: "file uploaded and model retrained",
                snapshot_id: snapshot.id().to_string(),
                rows: snapshot.records().len(),
                days: snapshot.daily().len(),
                horizon: snapshot.horizon(),
            },
        ),
        Err(e) => {
            // rejected before reaching the predictor, which counts its own
            if matches!(
                e,
                UploadError::TooLarge { .. }
                    | UploadError::Body(_)
                    | UploadError::Multipart(_)
                    | UploadError::MissingFile
            ) {
                state.predictor.metrics().record_upload(false);
                warn!(error = %e, reason = %e.reason(), "upload_rejected");
            }
            error_response(upload_status(&e), e.reason(), e.to_string(), None)
        }
    }
}

fn handle_health(state: &AppState) -> Response<Full<Bytes>> {
    let snapshot = state.predictor.current_snapshot();
    json_response(
        StatusCode::OK,
        &HealthBody {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("GIT_HASH"),
            snapshot_id: snapshot.as_ref().map(|s| s.id().to_string()),
            snapshot_loaded_at: snapshot.as_ref().map(|s| s.loaded_at()),
        },
    )
}

/// Route one request
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = match (&method, path.as_str()) {
        (&Method::GET, "/predict") => handle_predict(req.uri().query(), &state),
        (&Method::POST, "/upload_csv") => handle_upload(req, &state).await,
        (&Method::OPTIONS, "/predict") => preflight("GET, OPTIONS"),
        (&Method::OPTIONS, "/upload_csv") => preflight("POST, OPTIONS"),
        (&Method::GET, "/health") => handle_health(&state),
        (&Method::GET, "/metrics") => response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&state.predictor.metrics().summary()),
        ),
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(resp)
}

/// Serve HTTP on an already bound listener until shutdown is signalled
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind and run the HTTP server
pub async fn start_server(
    bind_address: &str,
    port: u16,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind((bind_address, port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!(addr = %addr, "http_server_started");
    serve(listener, state, shutdown).await
}
