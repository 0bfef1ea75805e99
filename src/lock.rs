//! Lease-based named locks that serialize token renewal across execution contexts.

pub mod file;
pub mod memory;

pub use file::FileLock;
pub use memory::MemoryLock;

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::_prelude::*;

/// Boxed future returned by [`NamedLock`] operations.
pub type LockFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LockError>> + 'a + Send>>;

/// Proof of ownership for an acquired lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHandle {
	/// Lock name.
	pub name: String,
	/// Random owner token; only the matching owner may release.
	pub owner: String,
	/// Lease expiry, after which other contenders may break the lock.
	pub expires_at: OffsetDateTime,
}
impl LockHandle {
	pub(crate) fn issue(name: &str, expires_at: OffsetDateTime) -> Self {
		let owner = rand::rng().sample_iter(&Alphanumeric).take(24).map(char::from).collect();

		Self { name: name.to_owned(), owner, expires_at }
	}
}

/// Advisory lock keyed by name with a bounded lease.
///
/// A holder that never releases blocks others only until its lease runs out.
pub trait NamedLock
where
	Self: Send + Sync,
{
	/// Attempts to take `name` for `lease`; `None` when another owner holds a live lease.
	fn try_acquire<'a>(&'a self, name: &'a str, lease: Duration) -> LockFuture<'a, Option<LockHandle>>;

	/// Releases `handle` if it still owns the lock.
	fn release(&self, handle: LockHandle) -> LockFuture<'_, ()>;
}

/// Retry policy for acquiring a [`NamedLock`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockPolicy {
	/// Lease requested on each successful acquisition.
	pub lease: Duration,
	/// Maximum acquisition attempts.
	pub attempts: u32,
	/// Pause between attempts.
	pub backoff: Duration,
}
impl Default for LockPolicy {
	fn default() -> Self {
		Self { lease: Duration::seconds(5), attempts: 10, backoff: Duration::milliseconds(250) }
	}
}

/// Lock backend failure.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LockError {
	/// The backend could not be read or written.
	#[error("Lock backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Acquires `name`, retrying per `policy`.
///
/// Fails with [`Error::LockTimeout`] once the attempts are exhausted.
pub async fn acquire_with_retry(
	lock: &dyn NamedLock,
	name: &str,
	policy: &LockPolicy,
) -> Result<LockHandle> {
	let attempts = policy.attempts.max(1);

	for attempt in 1..=attempts {
		if let Some(handle) = lock.try_acquire(name, policy.lease).await? {
			return Ok(handle);
		}

		#[cfg(feature = "tracing")]
		tracing::debug!(lock = name, attempt, "Lock is held elsewhere; backing off.");

		if attempt < attempts {
			tokio::time::sleep(policy.backoff.unsigned_abs()).await;
		}
	}

	Err(Error::LockTimeout { name: name.to_owned(), attempts })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::clock::ManualClock;

	#[tokio::test]
	async fn retries_until_timeout() {
		let clock = ManualClock::new(OffsetDateTime::now_utc());
		let lock = MemoryLock::new(Arc::new(clock));
		let policy =
			LockPolicy { lease: Duration::seconds(5), attempts: 3, backoff: Duration::milliseconds(1) };
		let held = acquire_with_retry(&lock, "renew", &policy).await.expect("First acquire wins.");
		let err = acquire_with_retry(&lock, "renew", &policy)
			.await
			.expect_err("Second acquire must time out while the lease is live.");

		assert!(matches!(err, Error::LockTimeout { attempts: 3, .. }));

		lock.release(held).await.expect("Release should succeed.");
		acquire_with_retry(&lock, "renew", &policy).await.expect("Released lock is free.");
	}

	#[test]
	fn owner_tokens_are_unique() {
		let now = OffsetDateTime::now_utc();

		assert_ne!(LockHandle::issue("a", now).owner, LockHandle::issue("a", now).owner);
	}
}
