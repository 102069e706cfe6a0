//! HTTP server implementation using Axum.

use crate::handler::{handle_get, handle_post};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    routing::get,
    Router,
};
use objrpc::{ProtocolConfig, RemoteObject, Resolver, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    /// Root object plus the reference registry
    pub resolver: Resolver,
}

impl AppState {
    pub fn new(root: Arc<dyn RemoteObject>) -> Self {
        Self {
            resolver: Resolver::new(root),
        }
    }
}

/// Build the catch-all router serving `state`.
///
/// Only GET and POST are routed; any other method is answered 405.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Configure CORS so browser clients can talk to a local server
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            HeaderValue::from_static(ProtocolConfig::AGENT),
        ))
        .layer(cors);

    Router::new()
        .route("/", get(handle_get).post(handle_post))
        .route("/*path", get(handle_get).post(handle_post))
        .layer(DefaultBodyLimit::max(ServerConfig::MAX_BODY_BYTES))
        .layer(layers)
        .with_state(state)
}

/// Start the objrpc HTTP server for `root`.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    root: Arc<dyn RemoteObject>,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    info!("Serving root object of type '{}'", root.type_name());
    let app = build_router(Arc::new(AppState::new(root)));

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
