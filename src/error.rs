use std::error::Error;
use std::sync::Arc;

/// Boxed error returned by value operations.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Errors returned by [`Cache`](crate::Cache) operations.
///
/// The error is cheap to clone: every caller joined to a failing memo receives a clone of
/// the same underlying failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
	/// No key was supplied. Raised before any resolution starts.
	#[error("missing key")]
	MissingKey,

	/// The value operation failed, returned an error or panicked.
	///
	/// Displays as the underlying error.
	#[error(transparent)]
	ValueResolution(Arc<dyn Error + Send + Sync + 'static>),

	/// The task resolving the value was dropped by the runtime before it finished.
	#[error("value resolution was aborted")]
	Aborted,
}

impl CacheError {
	/// The failure reported by the value operation, if that is what this is.
	pub fn value_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
		match self {
			Self::ValueResolution(err) => Some(err.as_ref()),
			_ => None,
		}
	}
}

/// A value operation panicked instead of returning.
#[derive(Debug, thiserror::Error)]
#[error("value operation panicked: {0}")]
pub struct Panicked(pub String);
