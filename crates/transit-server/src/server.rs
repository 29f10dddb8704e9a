use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use transit_core::{StateRegistry, TransportState};
use transit_store::PickupStore;

use crate::client::{self, ClientRegistry};
use crate::config::ServerConfig;
use crate::handlers::{self, HandlerState, Incoming};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub message_tx: mpsc::Sender<Incoming>,
    pub heartbeat_interval: Duration,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/transport", get(transport_handler))
        .fallback_service(ServeDir::new(&config.public_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Load persisted pickup requests and build the starting registry.
pub fn initial_registry(config: &ServerConfig, store: &PickupStore) -> StateRegistry {
    let transport = if config.seed {
        TransportState::seeded()
    } else {
        TransportState::default()
    };
    let loaded = store.load();
    StateRegistry::with_pickups(transport, loaded.requests, loaded.next_id)
}

/// Create and start the server. Returns a handle that keeps it running.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, std::io::Error> {
    let store = Arc::new(PickupStore::new(config.data_file.clone()));
    let registry = initial_registry(&config, &store);

    let clients = Arc::new(ClientRegistry::new(
        config.max_send_queue,
        Duration::from_secs(config.client_timeout_secs),
    ));

    let _cleanup = client::start_cleanup_task(
        Arc::clone(&clients),
        Duration::from_secs(config.cleanup_interval_secs),
    );

    // Every inbound event goes through this one queue, in arrival order
    let (msg_tx, msg_rx) = mpsc::channel::<Incoming>(1024);

    let handler_state = Arc::new(HandlerState::new(registry, store, Arc::clone(&clients)));
    let processor = tokio::spawn(process_messages(msg_rx, Arc::clone(&handler_state)));

    let app_state = AppState {
        handler_state: Arc::clone(&handler_state),
        message_tx: msg_tx,
        heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
    };

    let router = build_router(app_state, &config);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "Server running");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        state: handler_state,
        _server: server_handle,
        _processor: processor,
        _cleanup,
    })
}

/// Handle returned by `start()`. Dropping it does not stop the tasks.
pub struct ServerHandle {
    pub port: u16,
    pub state: Arc<HandlerState>,
    _server: tokio::task::JoinHandle<()>,
    _processor: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let clients = Arc::clone(&state.handler_state.clients);
    let (client_id, rx) = clients.register();

    if state
        .message_tx
        .send(Incoming::Connected(client_id.clone()))
        .await
        .is_err()
    {
        clients.unregister(&client_id);
        return;
    }

    client::handle_ws_connection(
        socket,
        client_id,
        rx,
        clients,
        state.message_tx,
        state.heartbeat_interval,
    )
    .await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pickups = state.handler_state.registry.lock().pickup_count();
    Json(serde_json::json!({
        "status": "healthy",
        "clients": state.handler_state.clients.count(),
        "pickupRequests": pickups,
    }))
}

/// Current routes, schedules and bus locations.
async fn transport_handler(State(state): State<AppState>) -> Json<TransportState> {
    Json(state.handler_state.snapshot())
}

/// Apply inbound events one at a time.
async fn process_messages(mut rx: mpsc::Receiver<Incoming>, state: Arc<HandlerState>) {
    while let Some(incoming) = rx.recv().await {
        handlers::handle(&state, incoming).await;
    }
    tracing::info!("Message processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            data_file: dir.path().join("pickups.json"),
            public_dir: dir.path().join("public"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start(test_config(&dir)).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["clients"], 0);
    }

    #[tokio::test]
    async fn transport_endpoint_returns_seeded_state() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start(test_config(&dir)).await.unwrap();

        let url = format!("http://127.0.0.1:{}/api/transport", handle.port);
        let body: TransportState = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body, TransportState::seeded());
    }

    #[tokio::test]
    async fn serves_static_files_from_public_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        std::fs::create_dir_all(&config.public_dir).unwrap();
        std::fs::write(config.public_dir.join("index.html"), "<h1>buses</h1>").unwrap();
        let handle = start(config).await.unwrap();

        let url = format!("http://127.0.0.1:{}/index.html", handle.port);
        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert_eq!(body, "<h1>buses</h1>");
    }

    #[test]
    fn initial_registry_restores_pickups() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            seed: false,
            ..test_config(&dir)
        };
        let store = PickupStore::new(config.data_file.clone());
        let mut seed = StateRegistry::default();
        let _ = seed.add_pickup_request(serde_json::Map::new());
        let _ = seed.add_pickup_request(serde_json::Map::new());
        store.save(&seed.pickup_requests()).unwrap();

        let registry = initial_registry(&config, &store);
        assert_eq!(registry.pickup_count(), 2);
        assert_eq!(registry.next_pickup_id(), 3);
        assert!(registry.snapshot().routes.is_empty());
    }
}
