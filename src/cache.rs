use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tokio::time::Instant;

use crate::builder::{CacheBuilder, CacheOptions};
use crate::error::{BoxError, CacheError, Panicked};
use crate::events::{CacheEvent, CacheEventPayload, EventBus};
use crate::memo::{Memo, SharedResult};
use crate::metrics::CacheMetrics;
use crate::pruner::Pruner;
use crate::resolve::{KeySpec, ValueSpec, resolve_key, resolve_value};
use crate::store::EvictionStore;
use crate::traits::CacheKey;

/// Single-flight memoizing cache.
///
/// [`call`](Self::call) runs the value operation at most once per key, no matter how many
/// callers ask for that key while it is still running: they all join the same pending
/// memo and receive the same result. Resolved values are kept under a weighted LRU policy
/// with optional TTL. Failures are never cached.
///
/// `Cache` is a cheap handle; clones share the same store, event bus and pruner.
///
/// # Runtime
///
/// Value operations are spawned on the current tokio runtime so they run to completion
/// even when every caller gives up waiting. Outside a tokio runtime the operation is
/// driven by the callers themselves instead.
///
/// # Example
///
/// ```
/// use memo_lru::{Cache, CacheEvent};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), memo_lru::CacheError> {
/// let cache = Cache::<String, String>::new();
/// cache.on(CacheEvent::Hit, |event| println!("hit {} after {}ms", event.key, event.ms()));
///
/// let first = cache
///     .get_or_insert_with("jaeger".to_string(), |_| async { Ok::<_, std::io::Error>("mark iv".to_string()) })
///     .await?;
/// let second = cache.get_or_insert("jaeger".to_string(), "mark v".to_string()).await?;
///
/// assert_eq!(first, "mark iv");
/// assert_eq!(second, "mark iv");
/// # Ok(())
/// # }
/// ```
pub struct Cache<K, V>
where
	K: CacheKey,
	V: Clone + Send + Sync + 'static,
{
	inner: Arc<Inner<K, V>>,
}

struct Inner<K, V>
where
	K: CacheKey,
	V: Clone + Send + Sync + 'static,
{
	/// The only shared mutable state. Never held across an `.await`.
	store: Mutex<EvictionStore<K, Memo<V>>>,
	events: EventBus<K>,
	options: CacheOptions<V>,
	pruner: Mutex<Option<Pruner>>,
	/// Source of memo identities.
	next_id: AtomicU64,
	hits: AtomicU64,
	misses: AtomicU64,
	failures: AtomicU64,
}

impl<K, V> Cache<K, V>
where
	K: CacheKey,
	V: Clone + Send + Sync + 'static,
{
	/// Create an unbounded cache without expiry.
	pub fn new() -> Self {
		Self::builder().build()
	}

	/// Create a builder to configure capacity, expiry and weights.
	pub fn builder() -> CacheBuilder<V> {
		CacheBuilder::new()
	}

	pub(crate) fn with_options(options: CacheOptions<V>) -> Self {
		let store = EvictionStore::new(options.capacity.limit(), options.max_age);
		let prune_interval = options.prune_interval;

		let inner = Arc::new(Inner {
			store: Mutex::new(store),
			events: EventBus::new(),
			options,
			pruner: Mutex::new(None),
			next_id: AtomicU64::new(0),
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
			failures: AtomicU64::new(0),
		});

		if let Some(period) = prune_interval {
			if Handle::try_current().is_ok() {
				let pruner = Pruner::spawn(period, Arc::downgrade(&inner), |inner: &Inner<K, V>| {
					inner.store.lock().prune()
				});
				*inner.pruner.lock() = Some(pruner);
			} else {
				tracing::warn!(?period, "no tokio runtime available, cache pruning disabled");
			}
		}

		Self {
			inner,
		}
	}

	/// Return the value cached for `key`, computing it from `value` on a miss.
	///
	/// The key is resolved first; `None` fails immediately with
	/// [`CacheError::MissingKey`]. If a memo exists for the key, settled or still pending,
	/// the call joins it and `cache:hit` is emitted. Otherwise a pending memo is installed
	/// and the value operation started; once it succeeds the memo's weight is updated and
	/// `cache:miss` is emitted. When it fails, the memo is discarded and every joined
	/// caller receives the same error.
	pub async fn call(&self, key: Option<KeySpec<K>>, value: ValueSpec<K, V>) -> Result<V, CacheError> {
		let started = Instant::now();
		let key = resolve_key(key)?.await;
		self.join_or_install(key, value, started).await
	}

	/// [`call`](Self::call) with a literal key and value.
	pub async fn get_or_insert(&self, key: K, value: V) -> Result<V, CacheError> {
		self.call(Some(KeySpec::Literal(key)), ValueSpec::Literal(value)).await
	}

	/// [`call`](Self::call) with a literal key and an asynchronous value operation.
	pub async fn get_or_insert_with<F, Fut, E>(&self, key: K, f: F) -> Result<V, CacheError>
	where
		F: FnOnce(K) -> Fut + Send + 'static,
		Fut: Future<Output = Result<V, E>> + Send + 'static,
		E: Into<BoxError>,
	{
		self.call(Some(KeySpec::Literal(key)), ValueSpec::from_async(f)).await
	}

	/// Remove the memo for `key`, if any.
	///
	/// Only an absent [`KeySpec`] fails; deleting a key that is not cached succeeds. Callers
	/// already joined to a deleted pending memo still receive its result.
	pub async fn del(&self, key: Option<KeySpec<K>>) -> Result<(), CacheError> {
		let key = resolve_key(key)?.await;
		if self.inner.store.lock().del(&key).is_some() {
			tracing::trace!(?key, "deleted memo");
		}
		Ok(())
	}

	/// Remove every memo.
	pub async fn reset(&self) {
		self.inner.store.lock().reset();
		tracing::debug!("cache reset");
	}

	/// Subscribe `handler` to `event`.
	///
	/// Handlers run synchronously on the task that triggered the event. A panicking handler
	/// is logged and otherwise ignored.
	pub fn on<F>(&self, event: CacheEvent, handler: F)
	where
		F: Fn(&CacheEventPayload<K>) + Send + Sync + 'static,
	{
		self.inner.events.on(event, handler);
	}

	/// Check whether a fresh memo exists for `key`, without touching its recency.
	pub fn has(&self, key: &K) -> bool {
		self.inner.store.lock().has(key)
	}

	/// The resolved value for `key`, without touching its recency.
	///
	/// Returns `None` for absent, expired and still pending memos.
	pub fn peek(&self, key: &K) -> Option<V> {
		self.inner.store.lock().peek(key).and_then(|memo| memo.value().cloned())
	}

	/// Weight currently accounted for `key`.
	pub fn weight_of(&self, key: &K) -> Option<u64> {
		self.inner.store.lock().weight_of(key)
	}

	/// Cached keys from most to least recently used, expired ones included until swept.
	pub fn keys(&self) -> Vec<K> {
		self.inner.store.lock().keys().cloned().collect()
	}

	/// Number of memos, pending and expired ones included.
	pub fn len(&self) -> usize {
		self.inner.store.lock().len()
	}

	/// Whether the cache holds no memos at all.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Aggregate weight of all memos.
	pub fn total_weight(&self) -> u64 {
		self.inner.store.lock().total_weight()
	}

	/// Sweep expired memos now. Returns the number of removed memos.
	pub fn prune(&self) -> usize {
		self.inner.store.lock().prune()
	}

	/// Snapshot of the cache counters.
	pub fn metrics(&self) -> CacheMetrics {
		let store = self.inner.store.lock();
		CacheMetrics {
			hits: self.inner.hits.load(Ordering::Relaxed),
			misses: self.inner.misses.load(Ordering::Relaxed),
			failures: self.inner.failures.load(Ordering::Relaxed),
			evictions: store.evictions(),
			expirations: store.expirations(),
			entry_count: store.len(),
			total_weight: store.total_weight(),
			capacity: store.capacity(),
		}
	}

	/// Stop the background pruner and empty the cache.
	///
	/// The pruner also stops once the last handle to the cache is dropped.
	pub fn dispose(&self) {
		if let Some(pruner) = self.inner.pruner.lock().take() {
			pruner.stop();
		}
		self.inner.store.lock().reset();
		tracing::debug!("cache disposed");
	}

	/// Whether a background pruner is running.
	pub fn is_pruning(&self) -> bool {
		self.inner.pruner.lock().is_some()
	}

	/// Check for a memo and install a pending one if there is none, as one step.
	fn join_or_install(&self, key: K, value: ValueSpec<K, V>, started: Instant) -> SharedResult<V> {
		let mut store = self.inner.store.lock();

		if let Some(memo) = store.get(&key) {
			let result = memo.result();
			drop(store);

			self.inner.hits.fetch_add(1, Ordering::Relaxed);
			tracing::trace!(?key, "cache hit");
			self.inner.events.emit(
				CacheEvent::Hit,
				&CacheEventPayload {
					key,
					elapsed: started.elapsed(),
				},
			);
			return result;
		}

		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		let result = self.spawn_resolution(key.clone(), value, id, started);
		store.set(key.clone(), Memo::pending(id, result.clone()));
		drop(store);

		self.inner.misses.fetch_add(1, Ordering::Relaxed);
		tracing::trace!(?key, id, "installed pending memo");
		result
	}

	/// Build the shared future resolving memo `id`.
	///
	/// With a runtime the task is spawned before the memo is installed and may start right
	/// away. It still cannot record its outcome early: `settle` and `discard` take the store
	/// lock, which the installing caller holds until the memo is in place.
	fn spawn_resolution(&self, key: K, value: ValueSpec<K, V>, id: u64, started: Instant) -> SharedResult<V> {
		let inner = Arc::clone(&self.inner);
		let task_key = key.clone();
		let resolution = async move {
			let result = resolve_value(task_key.clone(), value).await;
			inner.settle(task_key, id, &result, started);
			result
		};

		match Handle::try_current() {
			Ok(runtime) => {
				let handle = runtime.spawn(resolution);
				let weak = Arc::downgrade(&self.inner);
				handle
					.map(move |joined| joined.unwrap_or_else(|err| Inner::lost(&weak, &key, id, err)))
					.boxed()
					.shared()
			}
			Err(_) => resolution.boxed().shared(),
		}
	}
}

impl<K, V> Inner<K, V>
where
	K: CacheKey,
	V: Clone + Send + Sync + 'static,
{
	/// Record the outcome of memo `id`.
	fn settle(&self, key: K, id: u64, result: &Result<V, CacheError>, started: Instant) {
		match result {
			Ok(value) => {
				let weight = self.options.weigh(value);
				let mut store = self.store.lock();
				// The memo may have been deleted or replaced while it was pending.
				let settled = store
					.peek(&key)
					.filter(|memo| memo.id() == id)
					.map(|memo| memo.settled(value.clone(), weight));
				let stored = settled.is_some_and(|memo| store.set(key.clone(), memo));
				drop(store);

				if stored {
					tracing::trace!(?key, id, weight, "memo resolved");
				} else {
					tracing::debug!(?key, id, weight, "resolved memo is no longer cached");
				}
				self.events.emit(
					CacheEvent::Miss,
					&CacheEventPayload {
						key,
						elapsed: started.elapsed(),
					},
				);
			}
			Err(err) => {
				self.failures.fetch_add(1, Ordering::Relaxed);
				self.discard(&key, id);
				tracing::warn!(?key, id, error = %err, "value resolution failed, memo discarded");
			}
		}
	}

	/// Remove memo `id` if it is still the one stored under `key`.
	fn discard(&self, key: &K, id: u64) {
		let mut store = self.store.lock();
		if store.peek(key).is_some_and(|memo| memo.id() == id) {
			store.del(key);
		}
	}

	/// The resolution task never reported back: it panicked outside the value operation
	/// or the runtime shut down.
	fn lost(weak: &Weak<Self>, key: &K, id: u64, err: JoinError) -> Result<V, CacheError> {
		if let Some(inner) = weak.upgrade() {
			inner.failures.fetch_add(1, Ordering::Relaxed);
			inner.discard(key, id);
		}

		if err.is_panic() {
			tracing::error!(?key, id, "cache resolution task panicked");
			Err(CacheError::ValueResolution(Arc::new(Panicked(err.to_string()))))
		} else {
			tracing::warn!(?key, id, "cache resolution task was cancelled");
			Err(CacheError::Aborted)
		}
	}
}

impl<K, V> Clone for Cache<K, V>
where
	K: CacheKey,
	V: Clone + Send + Sync + 'static,
{
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<K, V> Default for Cache<K, V>
where
	K: CacheKey,
	V: Clone + Send + Sync + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<K, V> fmt::Debug for Cache<K, V>
where
	K: CacheKey,
	V: Clone + Send + Sync + 'static,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let prune_interval = self.inner.pruner.lock().as_ref().map(Pruner::period);
		f.debug_struct("Cache")
			.field("capacity", &self.inner.options.capacity)
			.field("max_age", &self.inner.options.max_age)
			.field("prune_interval", &prune_interval)
			.field("entries", &self.len())
			.field("total_weight", &self.total_weight())
			.field("events", &self.inner.events)
			.finish()
	}
}
