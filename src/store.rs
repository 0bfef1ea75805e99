//! Key-value storage contract shared by the credential cache, transactions, and session hints.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// crates.io
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::_prelude::*;

/// Boxed future returned by [`KeyValueStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Who can read what a store persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreVisibility {
	/// Only the owning process can read the data.
	Private,
	/// Data outlives the process or is readable by other contexts (disk, shared memory).
	Shared,
}

/// Asynchronous JSON key-value store.
///
/// Stores that cannot enumerate their keys keep the default [`lists_keys`](Self::lists_keys);
/// the credential cache then maintains its own key manifest.
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>>;

	/// Writes `value` under `key`, replacing any previous value.
	fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()>;

	/// Removes `key`; missing keys are not an error.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Whether [`keys`](Self::keys) enumerates the store.
	fn lists_keys(&self) -> bool {
		false
	}

	/// Every key currently stored, when [`lists_keys`](Self::lists_keys) is `true`.
	fn keys(&self) -> StoreFuture<'_, Vec<String>> {
		Box::pin(async { Ok(Vec::new()) })
	}

	/// Visibility of the persisted data.
	fn visibility(&self) -> StoreVisibility {
		StoreVisibility::Private
	}
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced while encoding or decoding values.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Reads and decodes a typed value, reporting the failing JSON path on decode errors.
pub async fn get_typed<T>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StoreError>
where
	T: DeserializeOwned,
{
	let Some(value) = store.get(key).await? else {
		return Ok(None);
	};

	decode(key, value).map(Some)
}

/// Decodes a raw value read from `key`, reporting the failing JSON path.
pub fn decode<T>(key: &str, value: Value) -> Result<T, StoreError>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(value).map_err(|e| StoreError::Serialization {
		message: format!("Failed to decode `{key}` at `{}`: {}", e.path(), e.inner()),
	})
}

/// Encodes and writes a typed value.
pub async fn set_typed<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError>
where
	T: Serialize,
{
	let encoded = serde_json::to_value(value).map_err(|e| StoreError::Serialization {
		message: format!("Failed to encode `{key}`: {e}"),
	})?;

	store.set(key, encoded).await
}
