//! Thread-safe in-memory [`KeyValueStore`] for single-process sessions and tests.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreFuture, StoreVisibility},
};

/// In-process store; clones share the same map.
#[derive(Clone, Debug)]
pub struct MemoryStore {
	map: Arc<RwLock<HashMap<String, Value>>>,
	lists_keys: bool,
	visibility: StoreVisibility,
}
impl MemoryStore {
	/// Disables key enumeration, which makes the credential cache keep a key manifest.
	pub fn without_key_listing(mut self) -> Self {
		self.lists_keys = false;

		self
	}

	/// Overrides the reported visibility.
	pub fn with_visibility(mut self, visibility: StoreVisibility) -> Self {
		self.visibility = visibility;

		self
	}

	/// Number of stored keys.
	pub fn len(&self) -> usize {
		self.map.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.map.read().is_empty()
	}

	/// Synchronous peek at a raw value.
	pub fn raw(&self, key: &str) -> Option<Value> {
		self.map.read().get(key).cloned()
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self { map: Default::default(), lists_keys: true, visibility: StoreVisibility::Private }
	}
}
impl KeyValueStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
		let value = self.raw(key);

		Box::pin(async move { Ok(value) })
	}

	fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()> {
		self.map.write().insert(key.to_owned(), value);

		Box::pin(async { Ok(()) })
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		self.map.write().remove(key);

		Box::pin(async { Ok(()) })
	}

	fn lists_keys(&self) -> bool {
		self.lists_keys
	}

	fn keys(&self) -> StoreFuture<'_, Vec<String>> {
		let keys = if self.lists_keys { self.map.read().keys().cloned().collect() } else { Vec::new() };

		Box::pin(async move { Ok(keys) })
	}

	fn visibility(&self) -> StoreVisibility {
		self.visibility
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn clones_share_state() {
		let store = MemoryStore::default();
		let clone = store.clone();

		store.set("a", Value::from(1)).await.expect("Write should succeed.");

		assert_eq!(clone.get("a").await.expect("Read should succeed."), Some(Value::from(1)));
		assert_eq!(clone.keys().await.expect("Listing should succeed."), vec!["a".to_owned()]);

		clone.remove("a").await.expect("Remove should succeed.");

		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn key_listing_can_be_disabled() {
		let store = MemoryStore::default().without_key_listing();

		store.set("a", Value::Null).await.expect("Write should succeed.");

		assert!(!store.lists_keys());
		assert!(store.keys().await.expect("Listing should succeed.").is_empty());
		assert_eq!(store.visibility(), StoreVisibility::Private);
	}
}
