//! Cache usage metrics.

/// Snapshot of cache behaviour.
///
/// # Example
///
/// ```
/// use memo_lru::Cache;
///
/// let cache = Cache::<String, String>::new();
/// // ... perform cache operations ...
///
/// let metrics = cache.metrics();
/// println!("Hit rate: {:.2}%", metrics.hit_rate() * 100.0);
/// println!("Evictions: {}", metrics.evictions);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheMetrics {
	/// Calls that joined an existing memo.
	pub hits: u64,
	/// Calls that installed a new memo and started the value operation.
	pub misses: u64,
	/// Value operations that failed. Their memos were discarded.
	pub failures: u64,
	/// Entries dropped to satisfy the capacity.
	pub evictions: u64,
	/// Entries dropped because they outlived the maximum age.
	pub expirations: u64,
	/// Current number of entries, pending ones included.
	pub entry_count: usize,
	/// Current aggregate weight.
	pub total_weight: u64,
	/// Configured capacity, if bounded.
	pub capacity: Option<u64>,
}

impl CacheMetrics {
	/// Ratio of hits to calls, between 0.0 and 1.0.
	///
	/// Returns 0.0 if the cache has not been called yet.
	pub fn hit_rate(&self) -> f64 {
		let total = self.total_calls();
		if total == 0 {
			0.0
		} else {
			self.hits as f64 / total as f64
		}
	}

	/// Fraction of the capacity in use, between 0.0 and 1.0.
	///
	/// Returns 0.0 for an unbounded cache.
	pub fn utilization(&self) -> f64 {
		match self.capacity {
			Some(capacity) if capacity > 0 => self.total_weight as f64 / capacity as f64,
			_ => 0.0,
		}
	}

	/// Calls that reached the store (hits + misses).
	pub fn total_calls(&self) -> u64 {
		self.hits + self.misses
	}
}
