use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::Cache;
use crate::traits::CacheKey;

/// Function computing the capacity cost of a resolved value.
pub type Weigher<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;

/// How the store bounds its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capacity {
	/// No capacity eviction.
	#[default]
	Unbounded,
	/// At most this many entries; the weight function is ignored.
	Entries(u64),
	/// At most this much aggregate weight, as computed by the weight function.
	Weight(u64),
}

impl Capacity {
	/// Limit handed to the eviction store.
	pub fn limit(&self) -> Option<u64> {
		match *self {
			Self::Unbounded => None,
			Self::Entries(limit) | Self::Weight(limit) => Some(limit),
		}
	}
}

/// Resolved options a [`Cache`] is constructed from.
#[derive(Clone)]
pub(crate) struct CacheOptions<V> {
	pub capacity: Capacity,
	pub max_age: Option<Duration>,
	pub prune_interval: Option<Duration>,
	pub weigher: Option<Weigher<V>>,
}

impl<V> CacheOptions<V> {
	/// Weight of a resolved value.
	pub fn weigh(&self, value: &V) -> u64 {
		match (&self.capacity, &self.weigher) {
			(Capacity::Entries(_), _) | (_, None) => 1,
			(_, Some(weigher)) => weigher(value),
		}
	}
}

/// Builder for configuring a [`Cache`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use memo_lru::CacheBuilder;
///
/// let cache = CacheBuilder::<String>::new()
///     .max_weight(1024)
///     .max_age(Duration::from_secs(60))
///     .weight(|value| value.len() as u64)
///     .build::<String>();
///
/// assert!(cache.is_empty());
/// ```
///
/// A prune interval spawns a background task, so it needs a tokio runtime when
/// [`build`](Self::build) is called. Without one, pruning is skipped and expired entries
/// are only dropped lazily.
pub struct CacheBuilder<V> {
	capacity: Capacity,
	max_age: Option<Duration>,
	prune_interval: Option<Duration>,
	weigher: Option<Weigher<V>>,
}

impl<V> CacheBuilder<V> {
	/// Create a builder for an unbounded cache without expiry.
	pub fn new() -> Self {
		Self {
			capacity: Capacity::Unbounded,
			max_age: None,
			prune_interval: None,
			weigher: None,
		}
	}

	/// Bound the cache by entry count. Every entry weighs 1.
	///
	/// Replaces a previous [`max_weight`](Self::max_weight). Zero means unbounded.
	pub fn max_entries(mut self, entries: u64) -> Self {
		self.capacity = match entries {
			0 => Capacity::Unbounded,
			entries => Capacity::Entries(entries),
		};
		self
	}

	/// Bound the cache by aggregate weight as computed by [`weight`](Self::weight).
	///
	/// Replaces a previous [`max_entries`](Self::max_entries). Zero means unbounded.
	pub fn max_weight(mut self, weight: u64) -> Self {
		self.capacity = match weight {
			0 => Capacity::Unbounded,
			weight => Capacity::Weight(weight),
		};
		self
	}

	/// Treat settled entries older than `max_age` as absent.
	///
	/// The age restarts when a value resolves. Zero disables expiry.
	///
	/// Default: no expiry
	pub fn max_age(mut self, max_age: Duration) -> Self {
		self.max_age = Some(max_age).filter(|age| !age.is_zero());
		self
	}

	/// Sweep expired entries every `interval` instead of only on access.
	///
	/// Zero disables the sweep.
	///
	/// Default: no sweep
	pub fn prune_interval(mut self, interval: Duration) -> Self {
		self.prune_interval = Some(interval).filter(|interval| !interval.is_zero());
		self
	}

	/// Compute the weight of each resolved value.
	///
	/// Default: every value weighs 1
	pub fn weight<F>(mut self, weigher: F) -> Self
	where
		F: Fn(&V) -> u64 + Send + Sync + 'static,
	{
		self.weigher = Some(Arc::new(weigher));
		self
	}

	/// Create a builder from deserialized configuration.
	///
	/// When both limits are present, `max_weight` wins.
	pub fn from_config(config: &CacheConfig) -> Self {
		let mut builder = Self::new();
		if let Some(entries) = config.max_entries {
			builder = builder.max_entries(entries);
		}
		if let Some(weight) = config.max_weight {
			builder = builder.max_weight(weight);
		}
		if let Some(max_age) = config.max_age {
			builder = builder.max_age(max_age);
		}
		if let Some(interval) = config.prune_interval {
			builder = builder.prune_interval(interval);
		}
		builder
	}

	/// Build the cache with the configured settings.
	pub fn build<K>(self) -> Cache<K, V>
	where
		K: CacheKey,
		V: Clone + Send + Sync + 'static,
	{
		Cache::with_options(CacheOptions {
			capacity: self.capacity,
			max_age: self.max_age,
			prune_interval: self.prune_interval,
			weigher: self.weigher,
		})
	}
}

impl<V> Default for CacheBuilder<V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<V> fmt::Debug for CacheBuilder<V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CacheBuilder")
			.field("capacity", &self.capacity)
			.field("max_age", &self.max_age)
			.field("prune_interval", &self.prune_interval)
			.field("custom_weight", &self.weigher.is_some())
			.finish()
	}
}

/// Deserializable cache configuration.
///
/// Durations are written in human-readable form, e.g. `"5ms"` or `"5days"`.
///
/// ```
/// use std::time::Duration;
///
/// use memo_lru::CacheConfig;
///
/// let config: CacheConfig = serde_json::from_str(r#"{"max_age": "5days"}"#).unwrap();
/// assert_eq!(config.max_age, Some(Duration::from_secs(5 * 24 * 60 * 60)));
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
	/// Maximum number of entries.
	pub max_entries: Option<u64>,

	/// Maximum aggregate weight.
	pub max_weight: Option<u64>,

	/// Maximum age of a settled entry.
	#[serde(with = "humantime_serde")]
	pub max_age: Option<Duration>,

	/// Period of the background sweep for expired entries.
	#[serde(with = "humantime_serde")]
	pub prune_interval: Option<Duration>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_default() {
		let builder = CacheBuilder::<String>::new();
		assert_eq!(builder.capacity, Capacity::Unbounded);
		assert!(builder.max_age.is_none());
		assert!(builder.prune_interval.is_none());
	}

	#[test]
	fn test_last_capacity_wins() {
		let builder = CacheBuilder::<String>::new().max_entries(10).max_weight(100);
		assert_eq!(builder.capacity, Capacity::Weight(100));

		let builder = builder.max_entries(10);
		assert_eq!(builder.capacity, Capacity::Entries(10));

		let builder = builder.max_entries(0);
		assert_eq!(builder.capacity.limit(), None);
	}

	#[test]
	fn test_zero_durations_disable() {
		let builder = CacheBuilder::<String>::new()
			.max_age(Duration::ZERO)
			.prune_interval(Duration::ZERO);
		assert!(builder.max_age.is_none());
		assert!(builder.prune_interval.is_none());
	}

	#[test]
	fn test_entries_capacity_ignores_weigher() {
		let options = CacheOptions::<String> {
			capacity: Capacity::Entries(3),
			max_age: None,
			prune_interval: None,
			weigher: Some(Arc::new(|value: &String| value.len() as u64)),
		};
		assert_eq!(options.weigh(&"mark iv".to_string()), 1);

		let options = CacheOptions {
			capacity: Capacity::Weight(30),
			..options
		};
		assert_eq!(options.weigh(&"mark iv".to_string()), 7);
	}

	#[test]
	fn test_config_human_readable_durations() {
		let config: CacheConfig = serde_json::from_str(
			r#"{"max_weight": 100, "max_age": "5ms", "prune_interval": "1s"}"#,
		)
		.unwrap();

		assert_eq!(config.max_weight, Some(100));
		assert_eq!(config.max_age, Some(Duration::from_millis(5)));
		assert_eq!(config.prune_interval, Some(Duration::from_secs(1)));

		let builder = CacheBuilder::<String>::from_config(&config);
		assert_eq!(builder.capacity, Capacity::Weight(100));
		assert_eq!(builder.max_age, Some(Duration::from_millis(5)));
	}

	#[test]
	fn test_config_defaults_when_empty() {
		let config: CacheConfig = serde_json::from_str("{}").unwrap();
		assert_eq!(config, CacheConfig::default());
	}
}
