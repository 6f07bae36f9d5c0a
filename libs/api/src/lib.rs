//! Shared types for the bus viewer: the ingested [`Record`], its canonical
//! JSON form, and the Stream Transport traits the engine is written against.
//!
//! This crate has no runtime dependency on tokio; transports and the engine
//! bring their own.

mod error;
mod json;
mod transport;
mod types;
mod util;

pub use error::{ErrorKind, TransportError};
pub use json::records_to_json;
pub use transport::{RecordPublisher, RecordSource};
pub use types::{Delivery, Record};
pub use util::now_ms;
