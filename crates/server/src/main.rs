use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use server_api::ApiContext;
use shared::{
    domain::{BatchId, EntryId},
    error::{ApiError, ErrorCode},
    protocol::{BatchRecord, BatchUpdateRequest, PayrollEntry},
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state), settings.body_limit_bytes);

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, "payroll service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    let api = Router::new()
        .route("/batches", get(http_list_batches))
        .route("/batches/:batch_id", get(http_get_batch).put(http_update_batch))
        .route(
            "/batches/:batch_id/entries",
            get(http_list_entries).post(http_create_entry),
        )
        .route(
            "/batches/entries/:entry_id",
            put(http_update_entry).delete(http_delete_entry),
        );

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> ApiResult<&'static str> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| reject(ApiError::new(ErrorCode::Internal, e.to_string())))?;
    Ok("ok")
}

async fn http_list_batches(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<BatchRecord>>> {
    server_api::list_batches(&state.api)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<BatchRecord>> {
    server_api::get_batch(&state.api, &BatchId::from(batch_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
    payload: Result<Json<BatchUpdateRequest>, JsonRejection>,
) -> ApiResult<Json<BatchRecord>> {
    let Json(request) = payload.map_err(bad_body)?;
    server_api::update_batch(&state.api, &BatchId::from(batch_id), request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_entries(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<Vec<PayrollEntry>>> {
    server_api::list_entries(&state.api, &BatchId::from(batch_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_entry(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
    payload: Result<Json<PayrollEntry>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PayrollEntry>)> {
    let Json(draft) = payload.map_err(bad_body)?;
    let created = server_api::create_entry(&state.api, &BatchId::from(batch_id), &draft)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn http_update_entry(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
    payload: Result<Json<PayrollEntry>, JsonRejection>,
) -> ApiResult<Json<PayrollEntry>> {
    let Json(entry) = payload.map_err(bad_body)?;
    server_api::update_entry(&state.api, EntryId(entry_id), &entry)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_entry(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
) -> ApiResult<StatusCode> {
    server_api::delete_entry(&state.api, EntryId(entry_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => {
            error!(message = %err.message, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(err))
}

fn bad_body(rejection: JsonRejection) -> (StatusCode, Json<ApiError>) {
    let status = match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ApiError::new(ErrorCode::Validation, rejection.body_text())),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
