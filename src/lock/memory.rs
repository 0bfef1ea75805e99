//! In-process [`NamedLock`] shared by every session built on the same instance.

// self
use crate::{
	_prelude::*,
	clock::Clock,
	lock::{LockFuture, LockHandle, NamedLock},
};

/// Lease table kept in memory; clones share the table.
#[derive(Clone)]
pub struct MemoryLock {
	leases: Arc<Mutex<HashMap<String, LockHandle>>>,
	clock: Arc<dyn Clock>,
}
impl MemoryLock {
	/// Creates an empty lease table timed by `clock`.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self { leases: Default::default(), clock }
	}

	/// Returns `true` while `name` has a live lease.
	pub fn is_held(&self, name: &str) -> bool {
		let now = self.clock.now();

		self.leases.lock().get(name).is_some_and(|handle| handle.expires_at > now)
	}
}
impl NamedLock for MemoryLock {
	fn try_acquire<'a>(&'a self, name: &'a str, lease: Duration) -> LockFuture<'a, Option<LockHandle>> {
		let now = self.clock.now();
		let mut leases = self.leases.lock();
		let acquired = match leases.get(name) {
			Some(current) if current.expires_at > now => None,
			_ => {
				let handle = LockHandle::issue(name, now + lease);

				leases.insert(name.to_owned(), handle.clone());

				Some(handle)
			},
		};

		Box::pin(async move { Ok(acquired) })
	}

	fn release(&self, handle: LockHandle) -> LockFuture<'_, ()> {
		let mut leases = self.leases.lock();

		if leases.get(&handle.name).is_some_and(|current| current.owner == handle.owner) {
			leases.remove(&handle.name);
		}

		Box::pin(async { Ok(()) })
	}
}
impl Debug for MemoryLock {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryLock").field("leases", &self.leases.lock().len()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::clock::ManualClock;

	#[tokio::test]
	async fn expired_leases_can_be_taken_over() {
		let clock = ManualClock::new(OffsetDateTime::now_utc());
		let lock = MemoryLock::new(Arc::new(clock.clone()));
		let first = lock
			.try_acquire("renew", Duration::seconds(5))
			.await
			.expect("Acquire should not fail.")
			.expect("Free lock should be granted.");

		assert!(lock.try_acquire("renew", Duration::seconds(5)).await.expect("No failure.").is_none());
		assert!(lock.is_held("renew"));

		clock.advance(Duration::seconds(6));

		let second = lock
			.try_acquire("renew", Duration::seconds(5))
			.await
			.expect("Acquire should not fail.")
			.expect("Expired lease should be taken over.");

		lock.release(first).await.expect("Stale release should be ignored.");

		assert!(lock.is_held("renew"), "A stale owner must not release the new lease.");

		lock.release(second).await.expect("Release should succeed.");

		assert!(!lock.is_held("renew"));
	}
}
