//! Axum HTTP handlers for the web server
//!
//! Snapshot routes fetch on demand; nothing is cached between requests.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::cluster::Cluster;
use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub cluster_endpoint: &'static str,
    pub instance_endpoint: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    #[serde(default)]
    pub verbose: bool,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        cluster_endpoint: "/cluster",
        instance_endpoint: "/instances/{name}",
    })
}

pub async fn cluster(
    State(state): State<AppState>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<Value>, AppError> {
    let cluster = Cluster::gather(
        Arc::clone(&state.fetcher),
        &state.instances,
        &state.cluster_options,
    )
    .await;

    let instances = cluster
        .to_json(query.verbose)
        .map_err(|err| AppError::internal(format!("failed to serialize cluster: {err}")))?;

    Ok(Json(json!({
        "generated_utc": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "unavailable": cluster.unavailable(),
        "instances": instances,
    })))
}

pub async fn instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<Value>, AppError> {
    let Some(config) = state
        .instances
        .iter()
        .find(|instance| instance.identity() == name)
    else {
        return Err(AppError::not_found(
            "instance_not_found",
            format!("no instance named {name}"),
        ));
    };

    let cluster = Cluster::gather(
        Arc::clone(&state.fetcher),
        std::slice::from_ref(config),
        &state.cluster_options,
    )
    .await;

    let snapshot = cluster
        .snapshots
        .first()
        .ok_or_else(|| AppError::internal("cluster returned no snapshot"))?
        .to_json(query.verbose)
        .map_err(|err| AppError::internal(format!("failed to serialize snapshot: {err}")))?;

    Ok(Json(snapshot))
}
