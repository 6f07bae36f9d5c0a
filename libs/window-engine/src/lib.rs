//! The bounded concurrent message window and the tasks around it:
//! one ingest loop writing, many request tasks reading, and a produce
//! gateway that turns a transport acknowledgment into a request result.

pub mod error;
mod ingest;
mod produce;
mod query;
mod window;

pub use error::{IngestError, ProduceError, WindowError};
pub use ingest::{IngestSettings, IngestState, IngestionLoop};
pub use produce::{ProduceGateway, DEFAULT_PRODUCE_TIMEOUT};
pub use query::WindowQuery;
pub use window::BoundedWindow;
