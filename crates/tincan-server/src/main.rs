use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tincan_api::error::ApiError;
use tincan_api::middleware::decode_token;
use tincan_api::{AppState, AppStateInner, router};
use tincan_gateway::connection;
use tincan_gateway::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tincan=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("TINCAN_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("TINCAN_DB_PATH").unwrap_or_else(|_| "tincan.db".into());
    let host = std::env::var("TINCAN_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("TINCAN_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let store = tincan_db::Store::open(&PathBuf::from(&db_path))?;
    let dispatcher = Dispatcher::new();
    let state: AppState = Arc::new(AppStateInner {
        store,
        dispatcher,
        jwt_secret,
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = router::router(state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("tincan server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Authenticate the upgrade before accepting the socket. The token arrives
/// either as a `token` query param or as a bearer Authorization header.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = query
        .token
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|s| s.to_string())
        })
        .ok_or(ApiError::Unauthenticated)?;

    let claims = decode_token(&state.jwt_secret, &token)?;
    let dispatcher = state.dispatcher.clone();

    Ok(ws.on_upgrade(move |socket| connection::handle_socket(socket, dispatcher, claims.sub)))
}
