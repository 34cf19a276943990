use axum::{
    routing::{get, post},
    Router,
};
use messaging_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    middleware::cors::permissive_cors,
    realtime, routes, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    let base_routes = Router::new()
        .route("/health", get(routes::health::health))
        // WebSocket handshake carries its own credential; it is authorized
        // inside the handler, before the upgrade.
        .route("/ws", get(realtime::gateway::ws_handler));

    let chat_api = Router::new()
        .route(
            "/conversations",
            get(routes::chat::list_conversations).post(routes::chat::create_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(routes::chat::get_messages),
        )
        .route(
            "/conversations/archive",
            post(routes::chat::archive_conversation),
        )
        .route("/mark-as-read", post(routes::chat::mark_as_read))
        .route("/messages/delete", post(routes::chat::delete_message))
        .route("/search", get(routes::chat::search))
        // Auth is the outer layer: the limiter keys its windows on the
        // Claims extension auth inserts.
        .layer(axum::middleware::from_fn_with_state(
            messaging_backend::middleware::rate_limit::new_rps_state(config.api_rps),
            messaging_backend::middleware::rate_limit::rps_middleware,
        ))
        .layer(axum::middleware::from_fn(
            messaging_backend::middleware::auth::require_bearer_auth,
        ));

    let app = base_routes
        .merge(chat_api)
        .with_state(app_state)
        .layer(permissive_cors())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
