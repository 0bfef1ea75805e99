// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for credential renewal.
#[derive(Debug, Default)]
pub struct RenewalMetrics {
	attempts: AtomicU64,
	cache_hits: AtomicU64,
	exchanges: AtomicU64,
	failures: AtomicU64,
}
impl RenewalMetrics {
	/// Total `get_credential` calls.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Calls answered from the cache, including re-checks under the lock.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Refresh-token exchanges sent to the token endpoint.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Calls that ended in an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
