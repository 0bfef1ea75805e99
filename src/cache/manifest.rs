// self
use crate::{
	_prelude::*,
	auth::{CACHE_KEY_PREFIX, ClientId},
	store::{self, KeyValueStore, StoreError},
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestEntry {
	keys: Vec<String>,
}

/// Stored list of cache keys for stores that cannot enumerate themselves.
///
/// Lives under `@@oauth2_session@@::{client_id}`, outside the per-credential key space.
#[derive(Clone)]
pub struct KeyManifest {
	store: Arc<dyn KeyValueStore>,
	manifest_key: String,
}
impl KeyManifest {
	/// Creates the manifest of `client_id` in `store`.
	pub fn new(store: Arc<dyn KeyValueStore>, client_id: &ClientId) -> Self {
		Self { store, manifest_key: format!("{CACHE_KEY_PREFIX}::{client_id}") }
	}

	/// Registered keys.
	pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
		Ok(self.load().await?.keys)
	}

	/// Registers `key`; already-present keys are left as is.
	pub async fn add(&self, key: &str) -> Result<(), StoreError> {
		let mut entry = self.load().await?;

		if entry.keys.iter().any(|existing| existing == key) {
			return Ok(());
		}

		entry.keys.push(key.to_owned());

		store::set_typed(self.store.as_ref(), &self.manifest_key, &entry).await
	}

	/// Unregisters `key`; the manifest itself is dropped once empty.
	pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
		let mut entry = self.load().await?;

		entry.keys.retain(|existing| existing != key);

		if entry.keys.is_empty() {
			self.clear().await
		} else {
			store::set_typed(self.store.as_ref(), &self.manifest_key, &entry).await
		}
	}

	/// Drops the manifest.
	pub async fn clear(&self) -> Result<(), StoreError> {
		self.store.remove(&self.manifest_key).await
	}

	async fn load(&self) -> Result<ManifestEntry, StoreError> {
		Ok(store::get_typed(self.store.as_ref(), &self.manifest_key).await?.unwrap_or_default())
	}
}
impl Debug for KeyManifest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeyManifest").field("manifest_key", &self.manifest_key).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	#[tokio::test]
	async fn add_is_idempotent_and_remove_drops_empty_manifest() {
		let store = MemoryStore::default().without_key_listing();
		let manifest = KeyManifest::new(
			Arc::new(store.clone()),
			&ClientId::new("spa").expect("Client fixture should be valid."),
		);

		manifest.add("a").await.expect("Add should succeed.");
		manifest.add("a").await.expect("Add should succeed.");
		manifest.add("b").await.expect("Add should succeed.");

		assert_eq!(manifest.keys().await.expect("Keys should load."), vec!["a", "b"]);
		assert!(store.raw("@@oauth2_session@@::spa").is_some());

		manifest.remove("a").await.expect("Remove should succeed.");
		manifest.remove("b").await.expect("Remove should succeed.");

		assert!(store.is_empty());
	}
}
