//! Event storage with callbacks and filtering
//!
//! Thread-safe storage for tracer events. Queries return printable summaries rather
//! than the events themselves.

use super::tracer_events::TracerEvent;
use std::sync::{Arc, Mutex, MutexGuard};

/// Type alias for event callback functions
pub type EventCallback = Arc<dyn Fn(&dyn TracerEvent) + Send + Sync>;

/// Predicate applied to stored events
pub type EventFilter<'a> = &'a dyn Fn(&dyn TracerEvent) -> bool;

/// Store for capturing and querying tracer events
pub struct EventStore {
    events: Mutex<Vec<Box<dyn TracerEvent>>>,
    on_store_callback: Option<EventCallback>,
}

impl EventStore {
    /// Create a new event store, optionally calling `on_store_callback` for every event
    pub fn new(on_store_callback: Option<EventCallback>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            on_store_callback,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Box<dyn TracerEvent>>> {
        // A panicking callback must not take the store down with it.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an event, triggering the callback first
    pub fn store(&self, event: Box<dyn TracerEvent>) {
        if let Some(callback) = &self.on_store_callback {
            callback(event.as_ref());
        }
        self.lock().push(event);
    }

    /// Summaries of events within `[start_time, end_time]` that pass `filter`
    pub fn get_event_summaries(
        &self,
        start_time: Option<f64>,
        end_time: Option<f64>,
        filter: Option<EventFilter<'_>>,
    ) -> Vec<String> {
        self.lock()
            .iter()
            .map(|event| event.as_ref())
            .filter(|event| in_window(*event, start_time, end_time))
            .filter(|event| filter.map_or(true, |f| f(*event)))
            .map(|event| event.printable_summary())
            .collect()
    }

    /// Summaries of the last `n` events that pass `filter`, oldest first
    pub fn get_last_n_summaries(&self, n: usize, filter: Option<EventFilter<'_>>) -> Vec<String> {
        let events = self.lock();
        let matching: Vec<&dyn TracerEvent> = events
            .iter()
            .map(|event| event.as_ref())
            .filter(|event| filter.map_or(true, |f| f(*event)))
            .collect();
        let skip = matching.len().saturating_sub(n);
        matching[skip..].iter().map(|event| event.printable_summary()).collect()
    }

    /// Count events within `[start_time, end_time]` that pass `filter`
    pub fn count_events(
        &self,
        start_time: Option<f64>,
        end_time: Option<f64>,
        filter: Option<EventFilter<'_>>,
    ) -> usize {
        self.lock()
            .iter()
            .map(|event| event.as_ref())
            .filter(|event| in_window(*event, start_time, end_time))
            .filter(|event| filter.map_or(true, |f| f(*event)))
            .count()
    }

    /// Count events of one kind
    pub fn count_kind(&self, kind: &str) -> usize {
        self.count_events(None, None, Some(&|event: &dyn TracerEvent| event.kind() == kind))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn in_window(event: &dyn TracerEvent, start_time: Option<f64>, end_time: Option<f64>) -> bool {
    start_time.map_or(true, |start| event.timestamp() >= start)
        && end_time.map_or(true, |end| event.timestamp() <= end)
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(None)
    }
}
