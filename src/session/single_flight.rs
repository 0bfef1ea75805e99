//! In-process coalescing of concurrent renewals for the same key.

// std
use std::hash::Hash;
// crates.io
use async_lock::OnceCell;
// self
use crate::_prelude::*;

/// Joins concurrent callers for one key onto the first caller's in-flight computation.
///
/// Entries live only while a computation is running; the next call after completion starts
/// fresh.
pub(crate) struct SingleFlight<K, T> {
	inflight: Mutex<HashMap<K, Arc<OnceCell<T>>>>,
}
impl<K, T> SingleFlight<K, T>
where
	K: Clone + Eq + Hash,
	T: Clone,
{
	pub(crate) fn new() -> Self {
		Self { inflight: Default::default() }
	}

	/// Runs `init` unless a computation for `key` is in flight, in which case its result is
	/// shared.
	pub(crate) async fn run<F, Fut>(&self, key: &K, init: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let cell = self.inflight.lock().entry(key.clone()).or_insert_with(Default::default).clone();
		let value = cell.get_or_init(init).await.clone();
		let mut inflight = self.inflight.lock();

		if inflight.get(key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
			inflight.remove(key);
		}

		value
	}

	#[cfg(test)]
	pub(crate) fn in_flight(&self) -> usize {
		self.inflight.lock().len()
	}
}
impl<K, T> Debug for SingleFlight<K, T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SingleFlight").field("in_flight", &self.inflight.lock().len()).finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	#[tokio::test]
	async fn concurrent_callers_share_one_computation() {
		let flight = Arc::new(SingleFlight::<String, usize>::new());
		let runs = Arc::new(AtomicUsize::new(0));
		let tasks = (0..8)
			.map(|_| {
				let flight = flight.clone();
				let runs = runs.clone();

				tokio::spawn(async move {
					flight
						.run(&"key".to_owned(), || async move {
							tokio::time::sleep(std::time::Duration::from_millis(50)).await;

							runs.fetch_add(1, Ordering::SeqCst) + 1
						})
						.await
				})
			})
			.collect::<Vec<_>>();

		for task in tasks {
			assert_eq!(task.await.expect("Task should not panic."), 1);
		}

		assert_eq!(runs.load(Ordering::SeqCst), 1);
		assert_eq!(flight.in_flight(), 0);

		let again = flight.run(&"key".to_owned(), || async { 7 }).await;

		assert_eq!(again, 7, "Completed computations must not be reused.");
	}
}
