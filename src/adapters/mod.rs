//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern. Tier stores live in
//! [`crate::cache`]; this module holds the observer-side adapters.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tiercache::adapters::LoggingEventListener;
//! use tiercache::cache::{CacheConfig, TieredCache};
//!
//! # async fn run() -> tiercache::Result<()> {
//! let cache = TieredCache::open(CacheConfig::default()).await?;
//! cache.subscribe(Arc::new(LoggingEventListener::info_level()));
//! # Ok(())
//! # }
//! ```

mod event_publisher;

pub use event_publisher::{InMemoryEventCollector, LoggingEventListener};
