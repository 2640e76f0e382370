use actix_web::{web, App, HttpServer};
use modelbase::Store;
use std::sync::Mutex;

mod handlers;

/// Shared application state. The SQLite connection is not `Sync`, so the
/// store sits behind a mutex and requests take turns.
pub struct AppState {
    pub store: Mutex<Store>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    log::info!("Starting modelbase server");

    let data_dir = std::env::var("MODELBASE_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let host = std::env::var("MODELBASE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("MODELBASE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Opening store at: {data_dir}");
    let store = Store::open(&data_dir).map_err(|e| {
        log::error!("Failed to open store at {data_dir}: {e}");
        std::io::Error::other(e.to_string())
    })?;

    let state = web::Data::new(AppState {
        store: Mutex::new(store),
    });

    log::info!("Listening on {host}:{port}");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
