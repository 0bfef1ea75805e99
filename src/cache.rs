//! Expiry-aware credential cache over a pluggable [`KeyValueStore`].

mod manifest;

pub use manifest::KeyManifest;

// self
use crate::{
	_prelude::*,
	auth::{ClientId, CredentialKey, CredentialRecord, client_prefix},
	clock::Clock,
	store::{self, KeyValueStore, StoreVisibility},
};

/// Credential cache for one OAuth client.
///
/// Entries expire at their record's `expires_at`. Lookups fall back to any stored entry whose
/// scope covers the requested one. Stores that cannot list keys get a [`KeyManifest`] so
/// [`clear_all`](Self::clear_all) still reaches every entry.
#[derive(Clone)]
pub struct CredentialCache {
	store: Arc<dyn KeyValueStore>,
	manifest: Option<KeyManifest>,
	clock: Arc<dyn Clock>,
	client_id: ClientId,
	allow_shared_refresh_tokens: bool,
}
impl CredentialCache {
	/// Creates a cache for `client_id` over `store`.
	pub fn new(store: Arc<dyn KeyValueStore>, client_id: ClientId, clock: Arc<dyn Clock>) -> Self {
		let manifest =
			(!store.lists_keys()).then(|| KeyManifest::new(store.clone(), &client_id));

		Self { store, manifest, clock, client_id, allow_shared_refresh_tokens: false }
	}

	/// Permits refresh tokens to be written to stores reporting [`StoreVisibility::Shared`].
	pub fn with_shared_refresh_tokens(mut self, allow: bool) -> Self {
		self.allow_shared_refresh_tokens = allow;

		self
	}

	/// Returns `true` when this cache keeps a key manifest.
	pub fn uses_manifest(&self) -> bool {
		self.manifest.is_some()
	}

	/// Returns the record for `key` while it is still valid (`now < expires_at`).
	pub async fn get(&self, key: &CredentialKey) -> Result<Option<CredentialRecord>> {
		let now = self.clock.now();

		Ok(self.find(key).await?.filter(|record| record.is_valid_at(now)))
	}

	/// Returns the record for `key` regardless of expiry.
	///
	/// Renewal reads refresh tokens from expired records through this.
	pub async fn peek(&self, key: &CredentialKey) -> Result<Option<CredentialRecord>> {
		self.find(key).await
	}

	/// Returns `true` when `record` stays valid for at least `leeway` from now.
	pub fn is_fresh(&self, record: &CredentialRecord, leeway: Duration) -> bool {
		record.is_fresh_at(self.clock.now(), leeway)
	}

	/// Stores `record` under its key.
	///
	/// Refresh tokens are dropped for shared stores unless explicitly allowed. The entry and its
	/// manifest registration are written together; a failed manifest write rolls the entry back.
	pub async fn set(&self, record: &CredentialRecord) -> Result<()> {
		let storage_key = record.key.storage_key();
		let record = if self.store.visibility() == StoreVisibility::Shared
			&& !self.allow_shared_refresh_tokens
			&& record.refresh_token.is_some()
		{
			#[cfg(feature = "tracing")]
			tracing::debug!(key = %storage_key, "Dropping refresh token before writing to a shared store.");

			record.without_refresh_token()
		} else {
			record.clone()
		};
		let previous = match &self.manifest {
			Some(_) => self.store.get(&storage_key).await?,
			None => None,
		};

		store::set_typed(self.store.as_ref(), &storage_key, &record).await?;

		if let Some(manifest) = &self.manifest
			&& let Err(e) = manifest.add(&storage_key).await
		{
			self.restore(&storage_key, previous).await;

			return Err(e.into());
		}

		Ok(())
	}

	/// Removes the entry stored under exactly `key`.
	pub async fn clear(&self, key: &CredentialKey) -> Result<()> {
		self.clear_raw(&key.storage_key()).await
	}

	/// Removes every entry of this client.
	pub async fn clear_all(&self) -> Result<()> {
		for storage_key in self.storage_keys().await? {
			self.clear_raw(&storage_key).await?;
		}

		if let Some(manifest) = &self.manifest {
			manifest.clear().await?;
		}

		Ok(())
	}

	/// Keys of every entry of this client.
	pub async fn keys(&self) -> Result<Vec<CredentialKey>> {
		Ok(self
			.storage_keys()
			.await?
			.iter()
			.filter_map(|raw| CredentialKey::parse_storage_key(raw))
			.collect())
	}

	async fn find(&self, key: &CredentialKey) -> Result<Option<CredentialRecord>> {
		if let Some(record) = self.load(&key.storage_key()).await? {
			return Ok(Some(record));
		}

		let mut candidates = self
			.keys()
			.await?
			.into_iter()
			.filter(|candidate| candidate != key && candidate.covers(key))
			.collect::<Vec<_>>();

		// Narrowest covering scope first.
		candidates.sort_by_key(|candidate| candidate.scope.len());

		for candidate in candidates {
			if let Some(record) = self.load(&candidate.storage_key()).await? {
				return Ok(Some(record));
			}
		}

		Ok(None)
	}

	/// Backend failures propagate; only entries that fail to decode are discarded.
	async fn load(&self, storage_key: &str) -> Result<Option<CredentialRecord>> {
		let Some(value) = self.store.get(storage_key).await? else {
			return Ok(None);
		};

		match store::decode::<CredentialRecord>(storage_key, value) {
			Ok(record) => Ok(Some(record)),
			Err(_e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(key = %storage_key, error = %_e, "Discarding undecodable cache entry.");

				self.clear_raw(storage_key).await?;

				Ok(None)
			},
		}
	}

	async fn storage_keys(&self) -> Result<Vec<String>> {
		let prefix = client_prefix(&self.client_id);
		let keys = match &self.manifest {
			Some(manifest) => manifest.keys().await?,
			None => self.store.keys().await?,
		};

		Ok(keys.into_iter().filter(|key| key.starts_with(&prefix)).collect())
	}

	async fn clear_raw(&self, storage_key: &str) -> Result<()> {
		let previous = match &self.manifest {
			Some(_) => self.store.get(storage_key).await?,
			None => None,
		};

		self.store.remove(storage_key).await?;

		if let Some(manifest) = &self.manifest
			&& let Err(e) = manifest.remove(storage_key).await
		{
			self.restore(storage_key, previous).await;

			return Err(e.into());
		}

		Ok(())
	}

	async fn restore(&self, storage_key: &str, previous: Option<serde_json::Value>) {
		let outcome = match previous {
			Some(value) => self.store.set(storage_key, value).await,
			None => self.store.remove(storage_key).await,
		};

		if let Err(_e) = outcome {
			#[cfg(feature = "tracing")]
			tracing::warn!(key = %storage_key, error = %_e, "Failed to roll back cache entry.");
		}
	}
}
impl Debug for CredentialCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialCache")
			.field("client_id", &self.client_id)
			.field("uses_manifest", &self.manifest.is_some())
			.field("visibility", &self.store.visibility())
			.field("allow_shared_refresh_tokens", &self.allow_shared_refresh_tokens)
			.finish()
	}
}
