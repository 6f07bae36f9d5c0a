use std::collections::VecDeque;

use parking_lot::Mutex;

use busview_api::Record;

use crate::error::WindowError;

// ═══════════════════════════════════════════════════════════════
//  BoundedWindow
// ═══════════════════════════════════════════════════════════════

/// Most-recent-N record store shared by the ingest loop and request tasks.
///
/// Newest record sits at the front. Every operation takes the single
/// mutex for its whole duration, so a reader sees either all or none of
/// an `append_batch` / `clear`. Readers get an owned copy and never hold
/// the lock while iterating.
pub struct BoundedWindow {
    items: Mutex<VecDeque<Record>>,
    capacity: usize,
}

impl BoundedWindow {
    pub fn new(capacity: usize) -> Result<Self, WindowError> {
        if capacity == 0 {
            return Err(WindowError::ZeroCapacity);
        }
        Ok(Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(65536))),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Insert at the newest position, evicting from the back past capacity.
    pub fn append(&self, record: Record) {
        let mut items = self.items.lock();
        push_newest(&mut items, self.capacity, record);
    }

    /// Append every record in order under one lock acquisition.
    ///
    /// The last record of the batch ends up newest.
    pub fn append_batch(&self, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        // Only the trailing `capacity` records can survive the batch.
        let skip = records.len().saturating_sub(self.capacity);
        let mut items = self.items.lock();
        for record in records.into_iter().skip(skip) {
            push_newest(&mut items, self.capacity, record);
        }
    }

    /// Owned copy of the current contents, newest-first.
    pub fn snapshot(&self) -> Vec<Record> {
        let items = self.items.lock();
        items.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

fn push_newest(items: &mut VecDeque<Record>, capacity: usize, record: Record) {
    items.push_front(record);
    while items.len() > capacity {
        items.pop_back();
    }
}
