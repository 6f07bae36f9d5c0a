#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("window: {0}")]
    Window(#[from] window_engine::WindowError),

    #[error("transport: {0}")]
    Transport(#[from] busview_api::TransportError),

    #[error("ingest: {0}")]
    Ingest(#[from] window_engine::IngestError),

    #[error("{0}")]
    Http(#[from] window_api_server::ServeError),

    #[error("http task: {0}")]
    Task(String),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
