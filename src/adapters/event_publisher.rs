//! Event Listener Adapters
//!
//! Implementations of the `CacheEventListener` port.

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::domain::events::CacheEvent;
use crate::domain::ports::CacheEventListener;

/// Logging-based event listener.
///
/// Writes cache events to the tracing/logging system.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventListener {
    /// Whether to log events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingEventListener {
    /// Create a new logging event listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a listener that logs at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    /// Create a listener that logs at debug level.
    pub fn debug_level() -> Self {
        Self { info_level: false }
    }
}

impl CacheEventListener for LoggingEventListener {
    fn on_event(&self, event: &CacheEvent) {
        let event_type = event.event_type();
        let json = serde_json::to_string(event).unwrap_or_else(|_| format!("{:?}", event));

        if self.info_level {
            info!(event_type = %event_type, event = %json, "Cache event");
        } else {
            debug!(event_type = %event_type, event = %json, "Cache event");
        }
    }
}

/// In-memory event collector.
///
/// Collects events for later inspection (tests, embedding hosts).
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: RwLock<Vec<CacheEvent>>,
}

impl InMemoryEventCollector {
    /// Create a new in-memory event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.read().clone()
    }

    /// Get the count of collected events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<CacheEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

impl CacheEventListener for InMemoryEventCollector {
    fn on_event(&self, event: &CacheEvent) {
        self.events.write().push(event.clone());
    }
}
