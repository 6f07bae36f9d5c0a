use std::sync::Arc;

use busview_api::Record;

use crate::window::BoundedWindow;

/// Read/reset face of the window handed to request handlers.
#[derive(Clone)]
pub struct WindowQuery {
    window: Arc<BoundedWindow>,
}

impl WindowQuery {
    pub fn new(window: Arc<BoundedWindow>) -> Self {
        Self { window }
    }

    /// Current contents, newest-first.
    pub fn list(&self) -> Vec<Record> {
        self.window.snapshot()
    }

    pub fn reset(&self) {
        self.window.clear();
        tracing::info!("window reset");
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }
}
