//! HTTP read path over the history store.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::error::{QueryError, StoreError};
use crate::listing::ListingRow;
use crate::query::{search_store, RawSearchParams, SearchParams};
use crate::store::HistoryStore;

#[derive(Clone)]
pub struct AppState {
    store: Arc<HistoryStore>,
}

/// Error body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            QueryError::StoreNotFound => StatusCode::NOT_FOUND,
            QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "Failed to serve listings");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(store: HistoryStore) -> Router {
    let state = AppState {
        store: Arc::new(store),
    };
    Router::new()
        .route("/", get(index))
        .route("/search", get(search))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `listen_addr` and serves until the process exits.
pub async fn serve(store: HistoryStore, listen_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(addr = %listener.local_addr()?, store = %store.path().display(), "Query server listening");
    axum::serve(listener, router(store)).await?;
    Ok(())
}

async fn index(State(state): State<AppState>) -> Result<Json<Vec<ListingRow>>, QueryError> {
    run_search(&state, SearchParams::default()).await
}

async fn search(
    State(state): State<AppState>,
    query: Result<Query<RawSearchParams>, QueryRejection>,
) -> Result<Json<Vec<ListingRow>>, QueryError> {
    let Query(raw) = query.map_err(|rejection| QueryError::InvalidParameter {
        name: "query",
        message: rejection.body_text(),
    })?;
    let params = SearchParams::try_from(raw)?;
    run_search(&state, params).await
}

async fn run_search(state: &AppState, params: SearchParams) -> Result<Json<Vec<ListingRow>>, QueryError> {
    debug!(?params, "Search request");
    let store = Arc::clone(&state.store);
    let rows = tokio::task::spawn_blocking(move || search_store(&store, &params))
        .await
        .map_err(|e| {
            QueryError::Store(StoreError::Io {
                path: state.store.path().to_path_buf(),
                source: std::io::Error::other(e),
            })
        })??;
    Ok(Json(rows))
}

async fn health() -> &'static str {
    "ok"
}
