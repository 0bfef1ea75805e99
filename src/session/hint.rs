//! "Previously authenticated" hint persisted with an explicit TTL.

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	clock::Clock,
	store::{self, KeyValueStore},
};

/// Unscoped key written by older releases.
pub const LEGACY_HINT_KEY: &str = "oauth2_session.is.authenticated";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct HintValue {
	expires_at: OffsetDateTime,
}

/// Boolean hint telling a fresh context that a silent session check is worth a network call.
#[derive(Clone)]
pub struct SessionHint {
	store: Arc<dyn KeyValueStore>,
	clock: Arc<dyn Clock>,
	storage_key: String,
	ttl: Duration,
}
impl SessionHint {
	/// Hint of `client_id`, lasting `ttl` after each mark.
	pub fn new(
		store: Arc<dyn KeyValueStore>,
		clock: Arc<dyn Clock>,
		client_id: &ClientId,
		ttl: Duration,
	) -> Self {
		Self { store, clock, storage_key: format!("oauth2_session.{client_id}.is.authenticated"), ttl }
	}

	/// Store key of the hint.
	pub fn storage_key(&self) -> &str {
		&self.storage_key
	}

	/// Records a successful authentication.
	pub async fn mark(&self) -> Result<()> {
		let value = HintValue { expires_at: self.clock.now() + self.ttl };

		store::set_typed(self.store.as_ref(), &self.storage_key, &value).await?;

		Ok(())
	}

	/// Returns `true` while an unexpired hint exists.
	pub async fn is_set(&self) -> Result<bool> {
		Ok(self.load(&self.storage_key).await?.is_some_and(|hint| hint.expires_at > self.clock.now()))
	}

	/// Removes the hint, including the legacy unscoped one.
	pub async fn clear(&self) -> Result<()> {
		self.store.remove(&self.storage_key).await?;
		self.store.remove(LEGACY_HINT_KEY).await?;

		Ok(())
	}

	/// Moves a live legacy hint to the client-scoped key.
	///
	/// Returns `true` when a hint was migrated.
	pub async fn migrate_legacy(&self) -> Result<bool> {
		let Some(legacy) = self.load(LEGACY_HINT_KEY).await? else {
			return Ok(false);
		};

		self.store.remove(LEGACY_HINT_KEY).await?;

		if legacy.expires_at <= self.clock.now() {
			return Ok(false);
		}

		store::set_typed(self.store.as_ref(), &self.storage_key, &legacy).await?;

		Ok(true)
	}

	async fn load(&self, key: &str) -> Result<Option<HintValue>> {
		let Some(value) = self.store.get(key).await? else {
			return Ok(None);
		};

		// Undecodable hints count as absent.
		Ok(store::decode::<HintValue>(key, value).ok())
	}
}
impl Debug for SessionHint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionHint")
			.field("storage_key", &self.storage_key)
			.field("ttl", &self.ttl)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::UnreliableStore,
		clock::ManualClock,
		store::{MemoryStore, StoreError},
	};

	fn hint(store: &Arc<MemoryStore>, clock: &ManualClock) -> SessionHint {
		SessionHint::new(
			store.clone(),
			Arc::new(clock.clone()),
			&ClientId::new("client").expect("Client identifier should be valid."),
			Duration::days(1),
		)
	}

	#[tokio::test]
	async fn hints_expire_after_ttl() {
		let store = Arc::new(MemoryStore::default());
		let clock = ManualClock::new(OffsetDateTime::now_utc());
		let hint = hint(&store, &clock);

		assert!(!hint.is_set().await.expect("Read should succeed."));

		hint.mark().await.expect("Mark should succeed.");

		assert!(store.raw("oauth2_session.client.is.authenticated").is_some());
		assert!(hint.is_set().await.expect("Read should succeed."));

		clock.advance(Duration::days(1));

		assert!(!hint.is_set().await.expect("Read should succeed."));
	}

	#[tokio::test]
	async fn legacy_hints_migrate_once() {
		let store = Arc::new(MemoryStore::default());
		let clock = ManualClock::new(OffsetDateTime::now_utc());
		let hint = hint(&store, &clock);

		store
			.set(
				LEGACY_HINT_KEY,
				serde_json::to_value(HintValue { expires_at: clock.now() + Duration::hours(1) })
					.expect("Hint should encode."),
			)
			.await
			.expect("Seed should succeed.");

		assert!(hint.migrate_legacy().await.expect("Migration should succeed."));
		assert!(hint.is_set().await.expect("Read should succeed."));
		assert!(store.raw(LEGACY_HINT_KEY).is_none());
		assert!(!hint.migrate_legacy().await.expect("Second migration is a no-op."));

		hint.clear().await.expect("Clear should succeed.");

		assert!(!hint.is_set().await.expect("Read should succeed."));
	}

	#[tokio::test]
	async fn backend_failures_are_not_read_as_absent() {
		let store = UnreliableStore::default();
		let clock = ManualClock::new(OffsetDateTime::now_utc());
		let hint = SessionHint::new(
			Arc::new(store.clone()),
			Arc::new(clock.clone()),
			&ClientId::new("client").expect("Client identifier should be valid."),
			Duration::days(1),
		);

		hint.mark().await.expect("Mark should succeed.");
		store.fail_reads(true);

		assert!(matches!(hint.is_set().await, Err(Error::Storage(StoreError::Backend { .. }))));
		assert!(hint.migrate_legacy().await.is_err());

		store
			.inner
			.set("oauth2_session.client.is.authenticated", serde_json::json!("junk"))
			.await
			.expect("Write.");
		store.fail_reads(false);

		assert!(!hint.is_set().await.expect("Undecodable hints read as absent."));
	}
}
