// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use pollsaas::{build_store, config::Config, logging, routes, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok(); // Load environment variables from .env file
    logging::init();

    let config = Config::load();

    let store = match build_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to initialize the store: {}", e);
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid HOST/PORT configuration: {}", e);
            std::process::exit(1);
        }
    };

    let app = routes::create_routes(AppState {
        store,
        config: Arc::new(config),
    });

    tracing::info!("Starting server on {}", addr);
    if let Err(e) = axum_server::bind(addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
