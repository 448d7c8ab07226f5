//! Normalization of key and value specifications.
//!
//! Callers may hand the cache a literal, a future, or a closure for both the key and the
//! value. [`KeySpec`] and [`ValueSpec`] make that choice explicit, and [`resolve_key`] /
//! [`resolve_value`] turn any variant into a single future.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::{BoxError, CacheError, Panicked};

/// Where a cache key comes from.
pub enum KeySpec<K> {
	/// The key itself.
	Literal(K),
	/// A key that becomes available later.
	Deferred(BoxFuture<'static, K>),
	/// A closure producing the key, invoked once at resolution time.
	Thunk(Box<dyn FnOnce() -> KeySpec<K> + Send>),
}

impl<K> KeySpec<K> {
	pub fn literal(key: K) -> Self {
		Self::Literal(key)
	}

	pub fn deferred<F>(future: F) -> Self
	where
		F: Future<Output = K> + Send + 'static,
	{
		Self::Deferred(future.boxed())
	}

	pub fn thunk<F>(f: F) -> Self
	where
		F: FnOnce() -> KeySpec<K> + Send + 'static,
	{
		Self::Thunk(Box::new(f))
	}
}

impl<K> std::fmt::Debug for KeySpec<K>
where
	K: std::fmt::Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Literal(key) => f.debug_tuple("Literal").field(key).finish(),
			Self::Deferred(_) => f.write_str("Deferred(..)"),
			Self::Thunk(_) => f.write_str("Thunk(..)"),
		}
	}
}

type ValueFuture<V> = BoxFuture<'static, Result<V, BoxError>>;

/// Where a cached value comes from.
pub enum ValueSpec<K, V> {
	/// The value itself.
	Literal(V),
	/// A value that becomes available later, or fails.
	Deferred(ValueFuture<V>),
	/// A closure receiving the resolved key.
	Thunk(Box<dyn FnOnce(K) -> ValueFuture<V> + Send>),
}

impl<K, V> ValueSpec<K, V>
where
	K: Send + 'static,
	V: Send + 'static,
{
	pub fn literal(value: V) -> Self {
		Self::Literal(value)
	}

	pub fn deferred<F, E>(future: F) -> Self
	where
		F: Future<Output = Result<V, E>> + Send + 'static,
		E: Into<BoxError>,
	{
		Self::Deferred(future.map(|result| result.map_err(Into::into)).boxed())
	}

	/// A synchronous, fallible closure.
	///
	/// An `Err` returned here reaches the caller exactly like a failed future would.
	pub fn from_fn<F, E>(f: F) -> Self
	where
		F: FnOnce(K) -> Result<V, E> + Send + 'static,
		E: Into<BoxError>,
	{
		Self::Thunk(Box::new(move |key| futures::future::ready(f(key).map_err(Into::into)).boxed()))
	}

	/// An asynchronous closure.
	pub fn from_async<F, Fut, E>(f: F) -> Self
	where
		F: FnOnce(K) -> Fut + Send + 'static,
		Fut: Future<Output = Result<V, E>> + Send + 'static,
		E: Into<BoxError>,
	{
		Self::Thunk(Box::new(move |key| f(key).map(|result| result.map_err(Into::into)).boxed()))
	}
}

impl<K, V> std::fmt::Debug for ValueSpec<K, V>
where
	V: std::fmt::Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
			Self::Deferred(_) => f.write_str("Deferred(..)"),
			Self::Thunk(_) => f.write_str("Thunk(..)"),
		}
	}
}

/// Resolve a key specification into the key itself.
///
/// The absent case is checked synchronously, before anything is awaited.
pub fn resolve_key<K>(spec: Option<KeySpec<K>>) -> Result<BoxFuture<'static, K>, CacheError>
where
	K: Send + 'static,
{
	let spec = spec.ok_or(CacheError::MissingKey)?;
	Ok(resolve_key_spec(spec))
}

fn resolve_key_spec<K>(spec: KeySpec<K>) -> BoxFuture<'static, K>
where
	K: Send + 'static,
{
	match spec {
		KeySpec::Literal(key) => futures::future::ready(key).boxed(),
		KeySpec::Deferred(future) => future,
		KeySpec::Thunk(f) => resolve_key_spec(f()),
	}
}

/// Turn a value specification into a single future.
///
/// Errors and panics of the value operation, whether raised while calling the closure or
/// while polling its future, all surface as [`CacheError::ValueResolution`].
pub fn resolve_value<K, V>(key: K, spec: ValueSpec<K, V>) -> BoxFuture<'static, Result<V, CacheError>>
where
	K: Send + 'static,
	V: Send + 'static,
{
	let future = match spec {
		ValueSpec::Literal(value) => return futures::future::ok(value).boxed(),
		ValueSpec::Deferred(future) => future,
		ValueSpec::Thunk(f) => match panic::catch_unwind(AssertUnwindSafe(move || f(key))) {
			Ok(future) => future,
			Err(payload) => return futures::future::err(panicked(payload)).boxed(),
		},
	};

	AssertUnwindSafe(future)
		.catch_unwind()
		.map(|outcome| match outcome {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(err)) => Err(CacheError::ValueResolution(Arc::from(err))),
			Err(payload) => Err(panicked(payload)),
		})
		.boxed()
}

fn panicked(payload: Box<dyn Any + Send>) -> CacheError {
	let message = if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_owned()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"value operation panicked".to_owned()
	};
	CacheError::ValueResolution(Arc::new(Panicked(message)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_resolve_literal_key() {
		let key = resolve_key(Some(KeySpec::literal("jaeger"))).unwrap().await;
		assert_eq!(key, "jaeger");
	}

	#[tokio::test]
	async fn test_resolve_deferred_and_thunk_keys() {
		let deferred = resolve_key(Some(KeySpec::deferred(async { 10 }))).unwrap().await;
		assert_eq!(deferred, 10);

		let thunk = resolve_key(Some(KeySpec::thunk(|| KeySpec::literal(true)))).unwrap().await;
		assert!(thunk);

		let nested =
			resolve_key(Some(KeySpec::thunk(|| KeySpec::deferred(async { "jaeger" })))).unwrap().await;
		assert_eq!(nested, "jaeger");
	}

	#[test]
	fn test_resolve_missing_key() {
		let Err(err) = resolve_key::<String>(None) else {
			panic!("expected a missing key error");
		};
		assert!(matches!(err, CacheError::MissingKey));
		assert_eq!(err.to_string(), "missing key");
	}

	#[test]
	fn test_falsy_keys_are_not_missing() {
		assert!(resolve_key(Some(KeySpec::literal(0))).is_ok());
		assert!(resolve_key(Some(KeySpec::literal(false))).is_ok());
		assert!(resolve_key(Some(KeySpec::literal(String::new()))).is_ok());
	}

	#[tokio::test]
	async fn test_resolve_value_variants() {
		let literal = resolve_value("k", ValueSpec::<_, &str>::literal("mark iv")).await.unwrap();
		assert_eq!(literal, "mark iv");

		let deferred = resolve_value("k", ValueSpec::deferred(async { Ok::<_, BoxError>(7) }))
			.await
			.unwrap();
		assert_eq!(deferred, 7);

		let from_key = resolve_value("jaeger", ValueSpec::from_fn(|key: &str| Ok::<_, BoxError>(key.len())))
			.await
			.unwrap();
		assert_eq!(from_key, 6);
	}

	#[tokio::test]
	async fn test_sync_and_async_failures_look_the_same() {
		let sync = resolve_value("k", ValueSpec::<_, u8>::from_fn(|_| Err("bad value"))).await.unwrap_err();
		let async_ = resolve_value("k", ValueSpec::<_, u8>::from_async(|_| async { Err("bad value") }))
			.await
			.unwrap_err();

		assert_eq!(sync.to_string(), "bad value");
		assert_eq!(async_.to_string(), "bad value");
	}

	#[tokio::test]
	async fn test_panics_become_errors() {
		let err = resolve_value(
			"k",
			ValueSpec::<&str, u8>::Thunk(Box::new(|_: &str| -> ValueFuture<u8> { panic!("thunk exploded") })),
		)
		.await
		.unwrap_err();
		assert!(err.to_string().contains("thunk exploded"));

		let err = resolve_value("k", ValueSpec::<&str, u8>::from_async(|_| async {
			if true {
				panic!("future exploded");
			}
			Ok::<_, BoxError>(1)
		}))
		.await
		.unwrap_err();
		assert!(err.to_string().contains("future exploded"));
	}
}
