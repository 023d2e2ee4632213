//! The Easynews NZB builder endpoint.
//!
//! Easynews search results carry an opaque payload token instead of a
//! download URL; this endpoint reconstructs the upstream NZB form-post
//! from the token on demand.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EasynewsNzbQuery {
    pub payload: String,
}

/// `GET /easynews/nzb?payload=…`
pub async fn easynews_nzb_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EasynewsNzbQuery>,
) -> Response {
    let Some(client) = state.easynews() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Easynews is not enabled").into_response();
    };

    match client.fetch_nzb(&query.payload).await {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/x-nzb"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"easynews.nzb\"",
                ),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Easynews NZB fetch failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
