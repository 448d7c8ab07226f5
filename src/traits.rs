use std::fmt::Debug;
use std::hash::Hash;

/// Marker trait for cache keys.
///
/// Keys must already be in canonical form: two keys that should share a memo must compare
/// equal and hash identically. No stringification or identity hashing happens inside the
/// cache.
///
/// # Example
///
/// ```
/// use memo_lru::CacheKey;
///
/// #[derive(Hash, Eq, PartialEq, Clone, Debug)]
/// struct UserId(u64);
///
/// fn assert_key<K: CacheKey>() {}
/// assert_key::<UserId>();
/// ```
pub trait CacheKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

/// A value that can live inside an [`EvictionStore`](crate::EvictionStore).
pub trait CacheValue {
	/// Capacity cost of this value.
	///
	/// The store sums the weights of all entries and evicts least-recently-used entries
	/// while the sum exceeds its capacity.
	fn weight(&self) -> u64 {
		1
	}

	/// Whether the store may drop this value.
	///
	/// Values returning `false` are pinned: they are never treated as stale, neither lazily
	/// nor by [`EvictionStore::prune`](crate::EvictionStore::prune), and capacity eviction
	/// skips them.
	fn can_expire(&self) -> bool {
		true
	}
}

macro_rules! unit_weight {
	($($ty:ty),* $(,)?) => {
		$(impl CacheValue for $ty {})*
	};
}

unit_weight!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, bool, char, String, &'static str);

impl<T> CacheValue for Vec<T> {
	fn weight(&self) -> u64 {
		self.len() as u64
	}
}
