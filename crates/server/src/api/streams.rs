//! The stream-list endpoint.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;

use streamnab_core::{OrchestratorError, StreamRequest, StreamsResponse};

use crate::metrics::STREAM_REQUESTS_TOTAL;
use crate::state::AppState;

/// `GET /stream/:type/:id.json`
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    Path((raw_type, raw_id)): Path<(String, String)>,
) -> Response {
    let id = raw_id.strip_suffix(".json").unwrap_or(&raw_id);

    let Some(request) = StreamRequest::parse(&raw_type, id) else {
        // Unknown shapes get an empty stream list, not an error; media
        // clients probe with ids the adapter does not serve.
        return Json(StreamsResponse::default()).into_response();
    };

    match state.orchestrator().handle(&request).await {
        Ok(response) => {
            STREAM_REQUESTS_TOTAL.with_label_values(&["ok"]).inc();
            Json(response).into_response()
        }
        Err(OrchestratorError::NoBackends) => {
            STREAM_REQUESTS_TOTAL
                .with_label_values(&["no_backends"])
                .inc();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": "No indexer backends configured",
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(id = %request.id, error = %e, "Stream request failed");
            STREAM_REQUESTS_TOTAL.with_label_values(&["error"]).inc();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": e.to_string(),
                    "details": {
                        "type": request.raw_type,
                        "id": request.id,
                        "indexerManager": state.config().aggregator.manager.as_str(),
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    },
                })),
            )
                .into_response()
        }
    }
}
