use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use warp::Filter;

use trip_sync::auth::token::JwtTokenValidator;
use trip_sync::config::ServerConfig;
use trip_sync::core::server::RealtimeServer;
use trip_sync::handlers::websocket::{handle_rejection, realtime_route};
use trip_sync::storage::memory::MemoryDirectory;

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Initialize logging
    env_logger::init();

    // Load config from the environment; a missing secret is fatal to
    // the whole listener, not to individual connections
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);

    let validator = Arc::new(JwtTokenValidator::new(&config.jwt_secret));

    // The demo binary serves the directory from memory; a deployment
    // wires UserStore/TripAccess to the application database instead
    let directory = Arc::new(MemoryDirectory::new());
    if config.development_mode {
        directory.add_user("demo").await;
        directory.add_trip_member("trip-demo", "demo").await;
        info!("Development mode: seeded demo user and trip-demo");
    }

    let server = Arc::new(RealtimeServer::new(
        config.clone(),
        validator,
        directory.clone(),
        directory,
    ));
    server.start_maintenance_tasks();

    // Create routes
    let realtime = realtime_route(server.clone());
    let health = warp::path("health").map(|| "OK");
    let routes = realtime.or(health).recover(handle_rejection);

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting trip-sync realtime server on {}", addr);

    warp::serve(routes).run(addr).await;
}
