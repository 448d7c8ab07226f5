use std::hash::Hash;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::Instant;

use crate::traits::CacheValue;

/// A stored value together with the bookkeeping the store needs for it.
struct Slot<V> {
	value: V,
	/// Weight captured at `set` time, so accounting never drifts from what was added.
	weight: u64,
	/// Time of the last `set`, compared against `max_age`.
	stored_at: Instant,
}

/// Weighted LRU map with optional TTL.
///
/// Entries are kept in recency order: the front of the map is the least recently used
/// entry and the back is the most recently used one. `set` and `get` move an entry to the
/// back; `has` and `peek` leave the order untouched.
///
/// The store is not thread-safe on its own; the [`Cache`](crate::Cache) wraps it in a
/// mutex.
///
/// # Example
///
/// ```
/// use memo_lru::EvictionStore;
///
/// let mut store = EvictionStore::new(Some(2), None);
/// store.set("a", 1u64);
/// store.set("b", 2u64);
/// store.get(&"a");
/// store.set("c", 3u64);
///
/// // "b" was the least recently used entry.
/// assert!(store.has(&"a"));
/// assert!(!store.has(&"b"));
/// assert!(store.has(&"c"));
/// ```
pub struct EvictionStore<K, V> {
	entries: IndexMap<K, Slot<V>, ahash::RandomState>,
	total_weight: u64,
	capacity: Option<u64>,
	max_age: Option<Duration>,
	evictions: u64,
	expirations: u64,
}

impl<K, V> EvictionStore<K, V>
where
	K: Hash + Eq,
	V: CacheValue,
{
	/// Create a store bounded by `capacity` (aggregate weight) and `max_age`.
	///
	/// `None` disables the respective limit.
	pub fn new(capacity: Option<u64>, max_age: Option<Duration>) -> Self {
		Self {
			entries: IndexMap::default(),
			total_weight: 0,
			capacity,
			max_age,
			evictions: 0,
			expirations: 0,
		}
	}

	/// Create a store without capacity or age limits.
	pub fn unbounded() -> Self {
		Self::new(None, None)
	}

	/// Maximum aggregate weight, if bounded.
	pub fn capacity(&self) -> Option<u64> {
		self.capacity
	}

	/// Maximum entry age, if entries expire.
	pub fn max_age(&self) -> Option<Duration> {
		self.max_age
	}

	/// Check whether a fresh entry exists for `key`.
	///
	/// Stale entries count as absent but are not removed.
	pub fn has(&self, key: &K) -> bool {
		let now = Instant::now();
		self.entries.get(key).is_some_and(|slot| !self.is_stale(slot, now))
	}

	/// Look up `key` and mark it most recently used.
	///
	/// A stale entry is removed and reported as absent.
	pub fn get(&mut self, key: &K) -> Option<&V> {
		let now = Instant::now();
		let index = self.entries.get_index_of(key)?;

		let stale = self.entries.get_index(index).is_some_and(|(_, slot)| self.is_stale(slot, now));
		if stale {
			if let Some((_, slot)) = self.entries.shift_remove_index(index) {
				self.total_weight = self.total_weight.saturating_sub(slot.weight);
				self.expirations += 1;
			}
			return None;
		}

		let last = self.entries.len() - 1;
		self.entries.move_index(index, last);
		self.entries.get_index(last).map(|(_, slot)| &slot.value)
	}

	/// Look up `key` without touching its recency.
	pub fn peek(&self, key: &K) -> Option<&V> {
		let now = Instant::now();
		self.entries.get(key).filter(|slot| !self.is_stale(slot, now)).map(|slot| &slot.value)
	}

	/// Insert or replace `key`, mark it most recently used and restart its age.
	///
	/// Least recently used entries are evicted until the aggregate weight fits the
	/// capacity again. Entries whose value cannot expire are pinned and skipped by eviction.
	/// A value heavier than the whole capacity is not stored at all (and any previous entry
	/// for `key` is dropped); `false` is returned in that case.
	pub fn set(&mut self, key: K, value: V) -> bool {
		let weight = value.weight();

		if let Some(old) = self.entries.shift_remove(&key) {
			self.total_weight = self.total_weight.saturating_sub(old.weight);
		}

		if self.capacity.is_some_and(|capacity| weight > capacity) {
			return false;
		}

		self.total_weight += weight;
		self.entries.insert(
			key,
			Slot {
				value,
				weight,
				stored_at: Instant::now(),
			},
		);

		self.trim();
		true
	}

	/// Remove `key`, returning its value if it was present (stale or not).
	pub fn del(&mut self, key: &K) -> Option<V> {
		let slot = self.entries.shift_remove(key)?;
		self.total_weight = self.total_weight.saturating_sub(slot.weight);
		Some(slot.value)
	}

	/// Remove every entry.
	pub fn reset(&mut self) {
		self.entries.clear();
		self.total_weight = 0;
	}

	/// Keys ordered from most to least recently used, stale entries included.
	pub fn keys(&self) -> impl Iterator<Item = &K> {
		self.entries.keys().rev()
	}

	/// Values ordered from most to least recently used, stale entries included.
	pub fn values(&self) -> impl Iterator<Item = &V> {
		self.entries.values().rev().map(|slot| &slot.value)
	}

	/// Number of entries, stale entries included.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Sum of the weights of all entries.
	pub fn total_weight(&self) -> u64 {
		self.total_weight
	}

	/// Weight recorded for `key` when it was last set.
	pub fn weight_of(&self, key: &K) -> Option<u64> {
		self.entries.get(key).map(|slot| slot.weight)
	}

	/// Remove every stale entry regardless of recency.
	///
	/// Returns the number of removed entries.
	pub fn prune(&mut self) -> usize {
		if self.max_age.is_none() {
			return 0;
		}

		let now = Instant::now();
		let before = self.entries.len();
		let mut released = 0;

		let max_age = self.max_age;
		self.entries.retain(|_, slot| {
			let keep = !Self::expired(max_age, slot, now);
			if !keep {
				released += slot.weight;
			}
			keep
		});

		let removed = before - self.entries.len();
		self.total_weight = self.total_weight.saturating_sub(released);
		self.expirations += removed as u64;
		removed
	}

	/// Entries dropped so far to satisfy the capacity.
	pub fn evictions(&self) -> u64 {
		self.evictions
	}

	/// Entries dropped so far because they outlived `max_age`.
	pub fn expirations(&self) -> u64 {
		self.expirations
	}

	fn trim(&mut self) {
		let Some(capacity) = self.capacity else {
			return;
		};

		// Pinned entries and the entry that was just set (the last one) are never evicted,
		// so the weight may stay above capacity until pinned entries can go.
		let mut evicted = 0u64;
		let mut index = 0;
		while self.total_weight > capacity && index + 1 < self.entries.len() {
			let pinned = self.entries.get_index(index).is_some_and(|(_, slot)| !slot.value.can_expire());
			if pinned {
				index += 1;
				continue;
			}
			if let Some((_, slot)) = self.entries.shift_remove_index(index) {
				self.total_weight = self.total_weight.saturating_sub(slot.weight);
				evicted += 1;
			}
		}

		if evicted > 0 {
			self.evictions += evicted;
			tracing::debug!(evicted, total_weight = self.total_weight, capacity, "evicted least recently used entries");
		}
	}

	fn is_stale(&self, slot: &Slot<V>, now: Instant) -> bool {
		Self::expired(self.max_age, slot, now)
	}

	fn expired(max_age: Option<Duration>, slot: &Slot<V>, now: Instant) -> bool {
		match max_age {
			Some(max_age) => {
				slot.value.can_expire() && now.saturating_duration_since(slot.stored_at) > max_age
			}
			None => false,
		}
	}
}

impl<K, V> Default for EvictionStore<K, V>
where
	K: Hash + Eq,
	V: CacheValue,
{
	fn default() -> Self {
		Self::unbounded()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, Clone, PartialEq)]
	enum TestValue {
		Heavy(u64),
		Pinned,
	}

	use TestValue::{Heavy, Pinned};

	impl CacheValue for TestValue {
		fn weight(&self) -> u64 {
			match self {
				Heavy(weight) => *weight,
				Pinned => 1,
			}
		}

		fn can_expire(&self) -> bool {
			!matches!(self, Pinned)
		}
	}

	#[test]
	fn test_store_set_and_get() {
		let mut store = EvictionStore::unbounded();

		assert!(store.set("jaeger", 7u64));
		assert!(store.has(&"jaeger"));
		assert_eq!(store.get(&"jaeger"), Some(&7));
		assert_eq!(store.len(), 1);
		assert_eq!(store.total_weight(), 1);
	}

	#[test]
	fn test_store_replace_reaccounts_weight() {
		let mut store = EvictionStore::unbounded();

		store.set("jaeger", Heavy(1));
		store.set("jaeger", Heavy(7));

		assert_eq!(store.len(), 1);
		assert_eq!(store.total_weight(), 7);
		assert_eq!(store.weight_of(&"jaeger"), Some(7));
	}

	#[test]
	fn test_store_evicts_least_recently_used() {
		let mut store = EvictionStore::new(Some(10), None);

		store.set(1, Heavy(4));
		store.set(2, Heavy(4));
		store.set(3, Heavy(4));

		assert!(!store.has(&1));
		assert!(store.has(&2));
		assert!(store.has(&3));
		assert_eq!(store.total_weight(), 8);
		assert_eq!(store.evictions(), 1);
	}

	#[test]
	fn test_store_get_renews_recency() {
		let mut store = EvictionStore::new(Some(3), None);

		store.set(1, Heavy(1));
		store.set(2, Heavy(1));
		store.set(3, Heavy(1));
		store.get(&1);
		store.set(4, Heavy(1));

		assert!(store.has(&1));
		assert!(!store.has(&2));
		assert_eq!(store.keys().copied().collect::<Vec<_>>(), vec![4, 1, 3]);
		assert_eq!(store.values().count(), 3);
	}

	#[test]
	fn test_store_peek_keeps_recency() {
		let mut store = EvictionStore::new(Some(2), None);

		store.set(1, Heavy(1));
		store.set(2, Heavy(1));
		assert_eq!(store.peek(&1), Some(&Heavy(1)));
		store.set(3, Heavy(1));

		assert!(!store.has(&1));
	}

	#[test]
	fn test_store_rejects_oversized_value() {
		let mut store = EvictionStore::new(Some(5), None);

		store.set("small", Heavy(2));
		store.set("big", Heavy(2));
		assert!(!store.set("big", Heavy(6)));

		assert!(!store.has(&"big"));
		assert!(store.has(&"small"));
		assert_eq!(store.total_weight(), 2);
	}

	#[test]
	fn test_store_del_and_reset() {
		let mut store = EvictionStore::unbounded();

		store.set("a", Heavy(3));
		store.set("b", Heavy(4));

		assert_eq!(store.del(&"a"), Some(Heavy(3)));
		assert_eq!(store.del(&"a"), None);
		assert_eq!(store.total_weight(), 4);

		store.reset();
		assert!(store.is_empty());
		assert_eq!(store.total_weight(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_store_lazy_expiry() {
		let max_age = Duration::from_millis(10);
		let mut store = EvictionStore::new(None, Some(max_age));

		store.set("jaeger", 1u64);
		tokio::time::advance(max_age / 2).await;
		assert!(store.has(&"jaeger"));

		tokio::time::advance(max_age * 2).await;
		assert!(!store.has(&"jaeger"));
		// Stale entries stay listed until they are read or swept.
		assert_eq!(store.len(), 1);

		assert_eq!(store.get(&"jaeger"), None);
		assert_eq!(store.len(), 0);
		assert_eq!(store.expirations(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_store_prune_sweeps_stale_entries() {
		let max_age = Duration::from_millis(10);
		let mut store = EvictionStore::new(None, Some(max_age));

		store.set("old", Heavy(2));
		tokio::time::advance(max_age * 2).await;
		store.set("new", Heavy(3));

		assert_eq!(store.prune(), 1);
		assert_eq!(store.keys().collect::<Vec<_>>(), vec![&"new"]);
		assert_eq!(store.total_weight(), 3);
	}

	#[test]
	fn test_store_trim_skips_pinned_values() {
		let mut store = EvictionStore::new(Some(2), None);

		store.set("pending", Pinned);
		store.set("a", Heavy(1));
		store.set("b", Heavy(1));

		assert!(store.has(&"pending"));
		assert!(!store.has(&"a"));
		assert!(store.has(&"b"));
		assert_eq!(store.total_weight(), 2);
		assert_eq!(store.evictions(), 1);
	}

	#[test]
	fn test_store_may_exceed_capacity_while_pinned() {
		let mut store = EvictionStore::new(Some(1), None);

		store.set("pending", Pinned);
		store.set("b", Heavy(1));

		// Nothing but the fresh entry could be evicted.
		assert!(store.has(&"pending"));
		assert!(store.has(&"b"));
		assert_eq!(store.total_weight(), 2);

		// Once the pinned entry is replaced by an evictable one, the capacity holds again.
		store.set("pending", Heavy(1));
		assert!(!store.has(&"b"));
		assert_eq!(store.total_weight(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_store_never_expires_pinned_values() {
		let max_age = Duration::from_millis(10);
		let mut store = EvictionStore::new(None, Some(max_age));

		store.set("pending", Pinned);
		tokio::time::advance(max_age * 5).await;

		assert!(store.has(&"pending"));
		assert_eq!(store.prune(), 0);
	}
}
