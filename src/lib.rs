use std::sync::Arc;

use axum::{middleware, routing::get, Router};

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod monit_client;

use config::InstanceConfig;
use domain::cluster::ClusterOptions;
use monit_client::StatusFetcher;

#[derive(Clone)]
pub struct AppState {
    pub api_token: Arc<str>,
    pub instances: Arc<[InstanceConfig]>,
    pub fetcher: Arc<dyn StatusFetcher>,
    pub cluster_options: ClusterOptions,
}

impl AppState {
    pub fn new(
        api_token: String,
        instances: Vec<InstanceConfig>,
        fetcher: Arc<dyn StatusFetcher>,
        cluster_options: ClusterOptions,
    ) -> Self {
        Self {
            api_token: Arc::<str>::from(api_token),
            instances: Arc::from(instances),
            fetcher,
            cluster_options,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/cluster", get(http::handlers::cluster))
        .route("/instances/{name}", get(http::handlers::instance))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/monit-cluster", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
