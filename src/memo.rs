use futures::future::{BoxFuture, Shared};

use crate::error::CacheError;
use crate::traits::CacheValue;

pub(crate) type SharedResult<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

/// The unit stored per key: a shared, possibly still pending result and its weight.
///
/// Every caller joined to a memo awaits a clone of the same shared future, so they all
/// observe one outcome. A fresh memo weighs 1 until its value resolves, at which point the
/// store receives a settled copy carrying the value and its real weight.
#[derive(Clone)]
pub struct Memo<V>
where
	V: Clone,
{
	id: u64,
	result: SharedResult<V>,
	value: Option<V>,
	weight: u64,
}

impl<V> Memo<V>
where
	V: Clone,
{
	pub(crate) fn pending(id: u64, result: SharedResult<V>) -> Self {
		Self {
			id,
			result,
			value: None,
			weight: 1,
		}
	}

	/// Same memo holding its resolved value and final weight.
	pub(crate) fn settled(&self, value: V, weight: u64) -> Self {
		Self {
			id: self.id,
			result: self.result.clone(),
			value: Some(value),
			weight,
		}
	}

	/// Identity of the computation behind this memo.
	pub(crate) fn id(&self) -> u64 {
		self.id
	}

	pub(crate) fn result(&self) -> SharedResult<V> {
		self.result.clone()
	}

	/// Capacity cost of this memo.
	pub fn weight(&self) -> u64 {
		self.weight
	}

	/// Whether the value operation has resolved successfully.
	pub fn is_settled(&self) -> bool {
		self.value.is_some()
	}

	/// The resolved value, if any.
	pub fn value(&self) -> Option<&V> {
		self.value.as_ref()
	}
}

impl<V> CacheValue for Memo<V>
where
	V: Clone,
{
	fn weight(&self) -> u64 {
		self.weight
	}

	// Pending memos must neither expire nor be evicted, otherwise a second computation
	// could start for the same key.
	fn can_expire(&self) -> bool {
		self.is_settled()
	}
}

impl<V> std::fmt::Debug for Memo<V>
where
	V: Clone + std::fmt::Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Memo")
			.field("id", &self.id)
			.field("weight", &self.weight)
			.field("value", &self.value())
			.finish()
	}
}
