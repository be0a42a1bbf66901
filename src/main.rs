use std::sync::Arc;

use monit_cluster_status::{
    build_app, config::Config, domain::cluster::ClusterOptions, logging,
    monit_client::HttpStatusFetcher, AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let fetcher = Arc::new(HttpStatusFetcher::new(
        &config.instances,
        config.fetch_timeout,
    ));
    let bind_socket = config.bind_socket()?;
    let options = ClusterOptions {
        fetch_timeout: config.fetch_timeout,
        max_concurrency: config.max_concurrency,
    };
    let state = AppState::new(
        config.api_token.clone(),
        config.instances.clone(),
        fetcher,
        options,
    );
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        instances = config.instances.len(),
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
