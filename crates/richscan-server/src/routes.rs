//! Route handlers. Every handler reads the published snapshot from the store
//! on each request, so a freshly emitted snapshot is served without restart.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use richscan_core::snapshot::DEFAULT_PAGE_SIZE;
use richscan_core::{RichListPage, RichListSnapshot, SnapshotMetadata, SnapshotStore};

use crate::error::ApiError;

type SharedStore = Arc<dyn SnapshotStore>;

/// Build the API router over a snapshot store.
pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rich-list", get(rich_list))
        .route("/rich-list/metadata", get(metadata))
        .route("/rich-list/paginated", get(paginated))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "richscan",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn load(store: &SharedStore) -> Result<RichListSnapshot, ApiError> {
    match store.load().await {
        Ok(Some(snapshot)) => Ok(snapshot),
        Ok(None) => Err(ApiError::NotGenerated),
        Err(e) => Err(ApiError::Unavailable(e.to_string())),
    }
}

async fn rich_list(State(store): State<SharedStore>) -> Result<Json<RichListSnapshot>, ApiError> {
    Ok(Json(load(&store).await?))
}

async fn metadata(State(store): State<SharedStore>) -> Result<Json<SnapshotMetadata>, ApiError> {
    Ok(Json(load(&store).await?.metadata()))
}

/// Raw query values; anything unparsable falls back to the default.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageQuery {
    page: Option<String>,
    page_size: Option<String>,
}

impl PageQuery {
    fn page(&self) -> usize {
        parse_positive(self.page.as_deref()).unwrap_or(1)
    }

    fn page_size(&self) -> usize {
        parse_positive(self.page_size.as_deref()).unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

/// Parses an integer; values below 1 become 1.
fn parse_positive(raw: Option<&str>) -> Option<usize> {
    let n = raw?.trim().parse::<i64>().ok()?;
    Some(n.max(1).try_into().unwrap_or(usize::MAX))
}

async fn paginated(
    State(store): State<SharedStore>,
    Query(query): Query<PageQuery>,
) -> Result<Json<RichListPage>, ApiError> {
    let snapshot = load(&store).await?;
    Ok(Json(snapshot.paginate(query.page(), query.page_size())))
}
