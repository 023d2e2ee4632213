//! Manifest, health, config and metrics handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use streamnab_core::SanitizedConfig;

use crate::metrics::encode_metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn metrics() -> String {
    encode_metrics()
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// The catalog-adapter descriptor the media client fetches first.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub resources: Vec<String>,
    pub types: Vec<String>,
    pub id_prefixes: Vec<String>,
    pub catalogs: Vec<String>,
}

pub async fn manifest(State(state): State<Arc<AppState>>) -> Json<Manifest> {
    let config = state.config();
    Json(Manifest {
        id: "org.streamnab.addon".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: config.server.addon_name.clone(),
        description: "Usenet streams via Newznab indexers and an NZB mount service".to_string(),
        resources: vec!["stream".to_string()],
        types: vec!["movie".to_string(), "series".to_string()],
        id_prefixes: vec!["tt".to_string(), "tvdb:".to_string()],
        catalogs: Vec::new(),
    })
}
