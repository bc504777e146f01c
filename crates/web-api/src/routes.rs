use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderValue, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use domain::{NewNode, Node, NodeChanges, NodeQuery};

use crate::{
    error::{ApiError, Envelope},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    offset: Option<i64>,
    limit: Option<i64>,
    where_name_is_like: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    db_response: Vec<Node>,
    all_count: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/nodes", get(list_nodes).post(create_node))
        .route("/nodes/", post(create_node))
        .route("/nodes/null", get(root_nodes))
        .route("/nodes/{id}", put(update_node).delete(delete_node))
        .route("/nodes/{id}/children", get(child_nodes))
}

/// 按配置的来源构建 CORS 层，`*` 表示允许任意来源
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(origin = %origin, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_nodes(
    State(state): State<AppState>,
    params: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ListResponse>, ApiError> {
    let Query(params) =
        params.map_err(|rejection| ApiError::rejected(Envelope::Read, rejection.body_text()))?;
    let query = NodeQuery::from_params(params.offset, params.limit, params.where_name_is_like);
    let listing = state
        .node_service
        .list(query)
        .await
        .map_err(ApiError::read)?;

    Ok(Json(ListResponse {
        db_response: listing.nodes,
        all_count: listing.total,
    }))
}

async fn root_nodes(State(state): State<AppState>) -> Result<Json<Vec<Node>>, ApiError> {
    let nodes = state.node_service.roots().await.map_err(ApiError::read)?;
    Ok(Json(nodes))
}

async fn child_nodes(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Json<Vec<Node>>, ApiError> {
    let Path(id) =
        id.map_err(|rejection| ApiError::rejected(Envelope::Read, rejection.body_text()))?;
    let nodes = state
        .node_service
        .children(id)
        .await
        .map_err(ApiError::read)?;
    Ok(Json(nodes))
}

async fn create_node(
    State(state): State<AppState>,
    payload: Result<Json<NewNode>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload.map_err(write_rejection)?;
    let node = state
        .node_service
        .create(payload)
        .await
        .map_err(ApiError::write)?;

    Ok(Json(json!({ "result": "success", "message": node })))
}

async fn update_node(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
    changes: Result<Json<NodeChanges>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) =
        id.map_err(|rejection| ApiError::rejected(Envelope::Write, rejection.body_text()))?;
    let Json(changes) = changes.map_err(write_rejection)?;
    state
        .node_service
        .update(id, changes)
        .await
        .map_err(ApiError::write)?;

    Ok(Json(json!({ "result": "success" })))
}

async fn delete_node(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) =
        id.map_err(|rejection| ApiError::rejected(Envelope::Write, rejection.body_text()))?;
    let deleted = state
        .node_service
        .delete(id)
        .await
        .map_err(ApiError::write)?;

    Ok(Json(json!({ "result": "success", "message": deleted.to_string() })))
}

fn write_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::rejected(Envelope::Write, rejection.body_text())
}
