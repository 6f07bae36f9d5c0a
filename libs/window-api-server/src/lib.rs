use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;

use window_engine::{ProduceGateway, WindowQuery};

mod http;
mod page;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("bind http :{port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("axum serve: {0}")]
    Serve(std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    query: WindowQuery,
    gateway: ProduceGateway,
    page: Arc<str>,
}

impl AppState {
    /// `bootstrap` and `topic` are only shown on the dashboard page.
    pub fn new(query: WindowQuery, gateway: ProduceGateway, bootstrap: &str, topic: &str) -> Self {
        Self {
            query,
            gateway,
            page: page::render(bootstrap, topic).into(),
        }
    }
}

/// Routes of the dashboard HTTP API.
///
/// Every response carries `Access-Control-Allow-Origin: *`; a known path
/// hit with the wrong method answers `405 Method Not Allowed`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::handle_index).fallback(http::method_not_allowed))
        .route("/messages", get(http::handle_messages).fallback(http::method_not_allowed))
        .route("/produce", post(http::handle_produce).fallback(http::method_not_allowed))
        .route("/reset", post(http::handle_reset).fallback(http::method_not_allowed))
        .route("/healthz", get(http::handle_healthz).fallback(http::method_not_allowed))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until `shutdown` is cancelled.
pub async fn run(port: u16, state: AppState, shutdown: CancellationToken) -> Result<(), ServeError> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|source| ServeError::Bind { port, source })?;
    tracing::info!(port, "http listening");
    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ServeError::Serve)?;
    tracing::info!("http server stopped");
    Ok(())
}
