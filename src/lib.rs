//! # memo-lru
//!
//! An asynchronous memoizing cache with:
//! - **Single-flight resolution**: concurrent callers for one key share one computation
//! - **Weighted LRU eviction** driven by a user supplied weight function
//! - **TTL expiry**, lazily on access or swept by a background pruner
//! - **Hit/miss telemetry** through synchronous event handlers
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use memo_lru::{Cache, CacheEvent, KeySpec, ValueSpec};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), memo_lru::CacheError> {
//! let cache = Cache::<String, String>::builder()
//!     .max_weight(1024)
//!     .max_age(Duration::from_secs(300))
//!     .weight(|value| value.len() as u64)
//!     .build();
//!
//! cache.on(CacheEvent::Miss, |event| println!("computed {} in {}ms", event.key, event.ms()));
//!
//! let value = cache
//!     .call(
//!         Some(KeySpec::literal("jaeger".to_string())),
//!         ValueSpec::from_async(|key: String| async move {
//!             Ok::<_, std::io::Error>(format!("{key}: mark iv"))
//!         }),
//!     )
//!     .await?;
//!
//! assert_eq!(value, "jaeger: mark iv");
//! assert_eq!(cache.weight_of(&"jaeger".to_string()), Some(15));
//! # Ok(())
//! # }
//! ```
//!
//! ## Keys and values
//!
//! Keys and values can be given as literals, futures or closures, see [`KeySpec`] and
//! [`ValueSpec`]. Keys must be canonical: the cache compares them with `Eq` and never
//! derives one from another value.
//!
//! ## Concurrency
//!
//! The cache is `Send + Sync`; clone the handle to share it. The lookup of an existing
//! memo and the installation of a new one happen under one lock, so no two callers can
//! both start the value operation for the same key. The lock is never held while a value
//! is being computed.

mod builder;
mod cache;
mod error;
mod events;
mod memo;
mod metrics;
mod pruner;
mod resolve;
mod store;
mod traits;

pub use builder::{CacheBuilder, CacheConfig, Capacity, Weigher};
pub use cache::Cache;
pub use error::{BoxError, CacheError, Panicked};
pub use events::{CacheEvent, CacheEventPayload, EventBus, UnknownEvent};
pub use memo::Memo;
pub use metrics::CacheMetrics;
pub use resolve::{KeySpec, ValueSpec, resolve_key, resolve_value};
pub use store::EvictionStore;
pub use traits::{CacheKey, CacheValue};
