use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

/// Telemetry events emitted by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEvent {
	/// A call joined an existing memo, settled or not.
	Hit,
	/// A call installed a new memo and its value resolved successfully.
	Miss,
}

impl CacheEvent {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Hit => "cache:hit",
			Self::Miss => "cache:miss",
		}
	}
}

impl fmt::Display for CacheEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Event name that is neither `cache:hit` nor `cache:miss`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cache event `{0}`")]
pub struct UnknownEvent(pub String);

impl FromStr for CacheEvent {
	type Err = UnknownEvent;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"cache:hit" => Ok(Self::Hit),
			"cache:miss" => Ok(Self::Miss),
			other => Err(UnknownEvent(other.to_owned())),
		}
	}
}

/// Payload passed to event handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEventPayload<K> {
	/// The resolved key.
	pub key: K,
	/// For hits, time from the start of the call until the memo was found. For misses,
	/// time from the start of the call until the value resolved.
	pub elapsed: Duration,
}

impl<K> CacheEventPayload<K> {
	/// Elapsed time in whole milliseconds.
	pub fn ms(&self) -> u128 {
		self.elapsed.as_millis()
	}
}

type Handler<K> = Arc<dyn Fn(&CacheEventPayload<K>) + Send + Sync>;

/// Synchronous publish/subscribe channel.
///
/// Handlers run on the emitting task, in registration order. A panicking handler is
/// logged and skipped; it never aborts the cache operation that emitted the event.
pub struct EventBus<K> {
	handlers: RwLock<Vec<(CacheEvent, Handler<K>)>>,
}

impl<K> EventBus<K> {
	pub fn new() -> Self {
		Self {
			handlers: RwLock::new(Vec::new()),
		}
	}

	/// Register `handler` for `event`. Handlers stay registered for the life of the bus.
	pub fn on<F>(&self, event: CacheEvent, handler: F)
	where
		F: Fn(&CacheEventPayload<K>) + Send + Sync + 'static,
	{
		self.handlers.write().push((event, Arc::new(handler)));
	}

	/// Number of handlers registered for `event`.
	pub fn listener_count(&self, event: CacheEvent) -> usize {
		self.handlers.read().iter().filter(|(registered, _)| *registered == event).count()
	}

	/// Invoke every handler registered for `event`.
	///
	/// Returns the number of handlers that completed without panicking.
	pub fn emit(&self, event: CacheEvent, payload: &CacheEventPayload<K>) -> usize
	where
		K: fmt::Debug,
	{
		// Snapshot so handlers may register further handlers without deadlocking.
		let handlers: Vec<Handler<K>> = self
			.handlers
			.read()
			.iter()
			.filter(|(registered, _)| *registered == event)
			.map(|(_, handler)| Arc::clone(handler))
			.collect();

		let mut completed = 0;
		for handler in handlers {
			match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
				Ok(()) => completed += 1,
				Err(_) => {
					tracing::warn!(%event, key = ?payload.key, "cache event handler panicked");
				}
			}
		}
		completed
	}
}

impl<K> Default for EventBus<K> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K> fmt::Debug for EventBus<K> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventBus")
			.field("hit_handlers", &self.listener_count(CacheEvent::Hit))
			.field("miss_handlers", &self.listener_count(CacheEvent::Miss))
			.finish()
	}
}
