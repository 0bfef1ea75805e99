//! Injectable wall clock used for expiry, lease, and claim-time decisions.

// self
use crate::_prelude::*;

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
	/// Current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Clock backed by the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock; clones share the same instant.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(start)))
	}

	/// Moves the clock forward by `by`.
	pub fn advance(&self, by: Duration) {
		*self.0.lock() += by;
	}

	/// Pins the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn manual_clock_clones_share_time() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let other = clock.clone();

		other.advance(Duration::minutes(5));

		assert_eq!(clock.now(), datetime!(2025-01-01 00:05 UTC));

		clock.set(datetime!(2030-06-01 12:00 UTC));

		assert_eq!(other.now(), datetime!(2030-06-01 12:00 UTC));
	}
}
