use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background task sweeping expired entries on a fixed period.
///
/// The task only holds a weak reference to its target and exits once the target is gone.
/// Dropping the `Pruner` aborts the task.
#[derive(Debug)]
pub(crate) struct Pruner {
	handle: JoinHandle<()>,
	period: Duration,
}

impl Pruner {
	/// Spawn the sweep loop on the current tokio runtime.
	///
	/// `sweep` is called once per `period` and returns the number of removed entries.
	pub fn spawn<T, F>(period: Duration, target: Weak<T>, sweep: F) -> Self
	where
		T: Send + Sync + 'static,
		F: Fn(&T) -> usize + Send + 'static,
	{
		let handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
			// The first tick completes immediately and there is nothing to sweep yet.
			interval.tick().await;

			tracing::debug!(?period, "cache pruner started");
			loop {
				interval.tick().await;

				let Some(target) = target.upgrade() else {
					break;
				};
				let removed = sweep(&target);
				if removed > 0 {
					tracing::debug!(removed, "pruned expired cache entries");
				}
			}
			tracing::debug!("cache pruner stopped");
		});

		Self {
			handle,
			period,
		}
	}

	pub fn period(&self) -> Duration {
		self.period
	}

	#[cfg(test)]
	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}

	pub fn stop(&self) {
		self.handle.abort();
	}
}

impl Drop for Pruner {
	fn drop(&mut self) {
		self.handle.abort();
	}
}
