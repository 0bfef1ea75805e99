//! File-backed [`KeyValueStore`] that survives restarts and is visible to other processes.

// std
use std::{
	collections::BTreeMap,
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError, StoreFuture, StoreVisibility},
};

type Snapshot = BTreeMap<String, Value>;

/// Persists a JSON object to disk after each mutation.
///
/// Reads re-load the file so writes made by other processes sharing the path become visible.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn refresh(&self) -> Result<(), StoreError> {
		let snapshot = load_snapshot(&self.path)?;

		*self.inner.write() = snapshot;

		Ok(())
	}

	fn mutate(&self, f: impl FnOnce(&mut Snapshot)) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		*guard = load_snapshot(&self.path)?;
		f(&mut guard);

		persist(&self.path, &guard)
	}
}
impl KeyValueStore for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
		Box::pin(async move {
			self.refresh()?;

			Ok(self.inner.read().get(key).cloned())
		})
	}

	fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|map| {
				map.insert(key.to_owned(), value);
			})
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|map| {
				map.remove(key);
			})
		})
	}

	fn lists_keys(&self) -> bool {
		true
	}

	fn keys(&self) -> StoreFuture<'_, Vec<String>> {
		Box::pin(async move {
			self.refresh()?;

			Ok(self.inner.read().keys().cloned().collect())
		})
	}

	fn visibility(&self) -> StoreVisibility {
		StoreVisibility::Shared
	}
}

fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
	if !path.exists() {
		return Ok(Snapshot::new());
	}

	let bytes = fs::read(path).map_err(|e| StoreError::Backend {
		message: format!("Failed to read {}: {e}", path.display()),
	})?;

	if bytes.is_empty() {
		return Ok(Snapshot::new());
	}

	let mut de = serde_json::Deserializer::from_slice(&bytes);

	serde_path_to_error::deserialize(&mut de).map_err(|e| StoreError::Serialization {
		message: format!("Failed to parse {} at `{}`: {}", path.display(), e.path(), e.inner()),
	})
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create store directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

fn persist(path: &Path, contents: &Snapshot) -> Result<(), StoreError> {
	ensure_parent_exists(path)?;

	let serialized = serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
		message: format!("Failed to serialize store snapshot: {e}"),
	})?;
	let mut tmp_path = path.to_path_buf();

	tmp_path.set_extension(format!("{}.tmp", std::process::id()));

	{
		let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
			message: format!("Failed to create {}: {e}", tmp_path.display()),
		})?;

		file.write_all(&serialized).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", tmp_path.display()),
		})?;
		file.sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", tmp_path.display()),
		})?;
	}

	fs::rename(&tmp_path, path).map_err(|e| StoreError::Backend {
		message: format!("Failed to replace {}: {e}", path.display()),
	})
}
