//! Domain Layer
//!
//! Ports the cache engine depends on and the events it emits.
//!
//! - **Ports** (`ports.rs`) - Tier stores, event listeners, clock
//! - **Events** (`events.rs`) - Cache state transitions for observers
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use tiercache::domain::{CacheEvent, CacheEventListener};
//!
//! struct Counter(std::sync::atomic::AtomicUsize);
//!
//! impl CacheEventListener for Counter {
//!     fn on_event(&self, _event: &CacheEvent) {
//!         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!     }
//! }
//!
//! let listener: Arc<dyn CacheEventListener> = Arc::new(Counter(Default::default()));
//! # let _ = listener;
//! ```

pub mod events;
pub mod ports;

pub use events::{CacheEvent, DemotionReason};
pub use ports::{CacheEventListener, Clock, ManualClock, SystemClock, TierStore};
