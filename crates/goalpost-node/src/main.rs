//! # Goalpost Node
//!
//! Goalpost node binary with HTTP API server.

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod api;
mod config;
mod state;

use config::NodeConfig;
use state::AppState;

/// Run the Goalpost node server.
pub async fn run_server(config: NodeConfig) -> anyhow::Result<()> {
    info!(
        "Goalpost node {} starting as {}",
        config.engine.name, config.engine.registration
    );

    let state = AppState::new(config.engine)?;
    let app = create_router(state);

    info!("Listening on http://{}", config.bind);

    let listener = TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router.
pub(crate) fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health::health_check))
        // Goal sets
        .route("/api/v1/goal-sets", post(api::goals::create_goal_set))
        .route("/api/v1/goal-sets/:id", get(api::goals::get_goal_set))
        .route("/api/v1/goal-sets/:id/admit", post(api::goals::admit_goal_set))
        .route(
            "/api/v1/goal-sets/:id/goals/:unique_name/transition",
            post(api::goals::transition_goal),
        )
        .route(
            "/api/v1/goal-sets/:id/goals/:unique_name/history",
            get(api::goals::goal_history),
        )
        // Pushes
        .route("/api/v1/pushes", post(api::push::on_push))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = NodeConfig::from_env()?;
    run_server(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use goalpost_engine::EngineConfig;
    use serde_json::Value;

    #[tokio::test]
    async fn test_health() {
        let config = EngineConfig {
            registration: "team-a".to_string(),
            ..Default::default()
        };
        let server = TestServer::new(create_router(AppState::new(config).unwrap())).unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["registration"], "team-a");
    }
}
