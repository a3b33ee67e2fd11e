mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use taskhub_api::AppStateInner;
use taskhub_api::middleware::verify_token;
use taskhub_db::Database;
use taskhub_gateway::{Dispatcher, HttpNotifier, Notifier, connection};

use crate::config::Config;

#[derive(Clone)]
struct GatewayState {
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskhub=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path, config.task_access)?);

    let dispatcher = Dispatcher::new();
    let notifier: Arc<dyn Notifier> = match &config.notifier_url {
        Some(url) => {
            let relay = HttpNotifier::new(url.clone())?;
            info!("Relaying notifications to {}", relay.url());
            Arc::new(relay)
        }
        None => Arc::new(dispatcher.clone()),
    };

    let api_state = Arc::new(AppStateInner {
        db: db.clone(),
        notifier,
        jwt_secret: config.jwt_secret.clone(),
    });

    let gateway_state = GatewayState {
        dispatcher,
        db,
        jwt_secret: config.jwt_secret.clone(),
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = taskhub_api::router(api_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Taskhub server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The token rides in the query string since browsers cannot set headers
/// on a WebSocket handshake.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(claims) = verify_token(&state.jwt_secret, &query.token) else {
        warn!("Rejected gateway upgrade with invalid token");
        return StatusCode::FORBIDDEN.into_response();
    };

    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.db, claims.sub, claims.username)
    })
}
