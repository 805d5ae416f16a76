use axum::Router;
use lambda_http::{run, Error};
use std::env::{self, set_var};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use shared::config::Config;
use state::{AppState, Stores};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(false)
        .init();

    let stores = Stores::for_config(&config).await;
    let app_state = AppState::assemble(stores, &config.jwt_secret, config.max_turns_per_match)?;

    // ToDo: restrict origins once the web client has a fixed domain
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app: Router = routes::app(app_state).layer(cors);

    if env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        set_var("AWS_LAMBDA_HTTP_IGNORE_STAGE_IN_PATH", "true");
        info!("Starting under the Lambda runtime");
        return run(app).await;
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
