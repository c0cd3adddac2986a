use crate::conversion::Converter;
use crate::errors::ProxyError;
use crate::metrics_defs::REQUESTS;
use crate::retrieval::Retriever;
use crate::types::InstrumentMetadata;
use crate::validator::validate_version;
use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::Value;
use shared::counter;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub retriever: Arc<Retriever>,
    pub converter: Arc<Converter>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/instrument/{instrument_id}", get(get_instrument))
        .route(
            "/instrument/{instrument_id}/metadata",
            get(get_instrument_metadata),
        )
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

type QueryPairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

#[derive(Debug)]
struct Params {
    version: Option<String>,
}

impl Params {
    /// A repeated parameter takes its last value.
    fn from_query(query: QueryPairs) -> Result<Self, ApiError> {
        let Query(pairs) = query.map_err(|rejection| {
            let msg = rejection.body_text();
            tracing::warn!(error = %msg, "Invalid query string");
            ApiError::RequestValidation(vec![ValidationDetail {
                loc: vec!["query"],
                msg,
                r#type: "query_parsing",
            }])
        })?;

        let version = pairs
            .into_iter()
            .rev()
            .find(|(key, _)| key == "version")
            .map(|(_, value)| value);
        Ok(Params { version })
    }
}

/// Error body returned for failures raised while handling a request.
#[derive(Serialize)]
struct ApiErrorResponse {
    status: &'static str,
    message: String,
}

/// One entry of a request validation failure.
#[derive(Serialize, Debug, PartialEq)]
pub struct ValidationDetail {
    pub loc: Vec<&'static str>,
    pub msg: String,
    pub r#type: &'static str,
}

#[derive(Serialize)]
struct ValidationErrorResponse {
    detail: Vec<ValidationDetail>,
}

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    /// The request itself is malformed (bad path parameter, missing query
    /// parameter). Answered with 422 and the list of problems.
    RequestValidation(Vec<ValidationDetail>),
    Proxy(ProxyError),
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        ApiError::Proxy(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RequestValidation(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ValidationErrorResponse { detail }),
            )
                .into_response(),
            ApiError::Proxy(err) => {
                let status = err.status_code();
                if status.is_server_error() {
                    tracing::error!(error = ?err, kind = err.kind(), "Request failed");
                }
                let body = Json(ApiErrorResponse {
                    status: "error",
                    message: err.to_string(),
                });
                (status, body).into_response()
            }
        }
    }
}

fn parse_instrument_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        tracing::warn!(instrument_id = raw, "Invalid UUID received");
        ApiError::RequestValidation(vec![ValidationDetail {
            loc: vec!["path", "instrument_id"],
            msg: format!("Invalid UUID received for instrument_id: {raw}"),
            r#type: "uuid_parsing",
        }])
    })
}

fn require_version(params: Params) -> Result<String, ApiError> {
    params.version.ok_or_else(|| {
        ApiError::RequestValidation(vec![ValidationDetail {
            loc: vec!["query", "version"],
            msg: "Field required".to_string(),
            r#type: "missing",
        }])
    })
}

/// Runs a request pipeline on its own task so that a panic inside it becomes
/// an internal error response rather than a dropped connection.
async fn isolate<T, F>(pipeline: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    tokio::spawn(pipeline)
        .await
        .unwrap_or_else(|e| Err(ProxyError::Internal(e.to_string()).into()))
}

fn record_request(route: &'static str, result: &Result<impl Sized, ApiError>) {
    let status = match result {
        Ok(_) => StatusCode::OK,
        Err(ApiError::RequestValidation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        Err(ApiError::Proxy(err)) => err.status_code(),
    };
    counter!(REQUESTS, "route" => route, "status" => status.as_str().to_string()).increment(1);
}

async fn get_instrument(
    State(state): State<AppState>,
    Path(instrument_id): Path<String>,
    query: QueryPairs,
) -> Result<Json<Value>, ApiError> {
    let result = isolate(async move { handle_get_instrument(&state, &instrument_id, query).await })
        .await;
    record_request("instrument", &result);
    result.map(Json)
}

async fn handle_get_instrument(
    state: &AppState,
    instrument_id: &str,
    query: QueryPairs,
) -> Result<Value, ApiError> {
    tracing::debug!(instrument_id, "Received instrument request");
    let instrument_id = parse_instrument_id(instrument_id)?;
    let version = require_version(Params::from_query(query)?)?;

    validate_version(&version)?;
    let instrument = state.retriever.retrieve_instrument(instrument_id).await?;
    let instrument = state
        .converter
        .convert_instrument(instrument, &version)
        .await?;

    tracing::info!(%instrument_id, %version, "Instrument served");
    Ok(instrument)
}

async fn get_instrument_metadata(
    State(state): State<AppState>,
    Path(instrument_id): Path<String>,
) -> Result<Json<InstrumentMetadata>, ApiError> {
    let result =
        isolate(async move { handle_get_instrument_metadata(&state, &instrument_id).await }).await;
    record_request("instrument_metadata", &result);
    result.map(Json)
}

async fn handle_get_instrument_metadata(
    state: &AppState,
    instrument_id: &str,
) -> Result<InstrumentMetadata, ApiError> {
    let instrument_id = parse_instrument_id(instrument_id)?;
    let metadata = state
        .retriever
        .retrieve_instrument_metadata(instrument_id)
        .await?;
    Ok(metadata)
}

async fn health() -> &'static str {
    "ok\n"
}
