//! Cross-process [`NamedLock`] backed by exclusively created lock files.

// std
use std::{
	fs::{self, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	clock::Clock,
	lock::{LockError, LockFuture, LockHandle, NamedLock},
};

/// Lock files live at `<dir>/<name>.lock` and hold the owner token plus the lease expiry.
///
/// A lock file is written in full to a private temporary file and published with a hard link,
/// so contenders never observe a partial body. A file that still cannot be decoded counts as
/// held until its modification time is older than the requested lease. Expired files are broken
/// by moving them aside first and checking that the moved file is the one judged stale.
#[derive(Clone)]
pub struct FileLock {
	dir: PathBuf,
	clock: Arc<dyn Clock>,
}
impl FileLock {
	/// Creates a lock directory, creating it if needed.
	pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, LockError> {
		let dir = dir.into();

		fs::create_dir_all(&dir).map_err(|e| backend(&dir, "create", e))?;

		Ok(Self { dir, clock })
	}

	fn file_stem(name: &str) -> String {
		name.chars()
			.map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
			.collect()
	}

	fn path_for(&self, name: &str) -> PathBuf {
		self.dir.join(format!("{}.lock", Self::file_stem(name)))
	}

	fn scratch_path(&self, name: &str, owner: &str, kind: &str) -> PathBuf {
		self.dir.join(format!(".{}.{owner}.{kind}", Self::file_stem(name)))
	}

	fn acquire_now(&self, name: &str, lease: Duration) -> Result<Option<LockHandle>, LockError> {
		let path = self.path_for(name);

		// One retry after breaking a stale lock.
		for _ in 0..2 {
			let now = self.clock.now();
			let handle = LockHandle::issue(name, now + lease);

			if self.publish(&path, &handle)? {
				return Ok(Some(handle));
			}

			match inspect(&path, lease)? {
				Observed::Missing => continue,
				Observed::Held { expires_at, .. } if expires_at > now => return Ok(None),
				Observed::Held { body, .. } =>
					if !self.break_stale(name, &path, &body, &handle.owner)? {
						return Ok(None);
					},
			}
		}

		Ok(None)
	}

	/// Writes `handle` beside `path` and links it into place; `false` when `path` exists.
	fn publish(&self, path: &Path, handle: &LockHandle) -> Result<bool, LockError> {
		let staged = self.scratch_path(&handle.name, &handle.owner, "tmp");
		let payload = serde_json::to_vec(handle).map_err(|e| LockError::Backend {
			message: format!("Failed to encode lock {}: {e}", path.display()),
		})?;
		let written = OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(&staged)
			.and_then(|mut file| file.write_all(&payload).and_then(|()| file.sync_all()));

		if let Err(e) = written {
			let _ = fs::remove_file(&staged);

			return Err(backend(&staged, "write", e));
		}

		let linked = fs::hard_link(&staged, path);

		remove_if_present(&staged)?;

		match linked {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
			Err(e) => Err(backend(path, "link", e)),
		}
	}

	/// Moves the stale file aside and keeps it removed only if it is still the file judged stale.
	fn break_stale(
		&self,
		name: &str,
		path: &Path,
		stale_body: &[u8],
		owner: &str,
	) -> Result<bool, LockError> {
		let aside = self.scratch_path(name, owner, "stale");

		match fs::rename(path, &aside) {
			Ok(()) => {},
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
			Err(e) => return Err(backend(path, "rename", e)),
		}

		let moved = fs::read(&aside).map_err(|e| backend(&aside, "read", e))?;

		if moved == stale_body {
			#[cfg(feature = "tracing")]
			tracing::debug!(lock = name, "Broke stale lock file.");

			remove_if_present(&aside)?;

			return Ok(true);
		}

		// Another contender replaced the stale file in between; put its lock back.
		let restored = fs::hard_link(&aside, path);

		remove_if_present(&aside)?;

		match restored {
			Ok(()) => Ok(false),
			Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
			Err(e) => Err(backend(path, "restore", e)),
		}
	}

	fn release_now(&self, handle: &LockHandle) -> Result<(), LockError> {
		let path = self.path_for(&handle.name);
		let body = match fs::read(&path) {
			Ok(body) => body,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
			Err(e) => return Err(backend(&path, "read", e)),
		};

		match serde_json::from_slice::<LockHandle>(&body) {
			Ok(current) if current.owner == handle.owner => remove_if_present(&path),
			_ => Ok(()),
		}
	}
}
impl NamedLock for FileLock {
	fn try_acquire<'a>(&'a self, name: &'a str, lease: Duration) -> LockFuture<'a, Option<LockHandle>> {
		Box::pin(async move { self.acquire_now(name, lease) })
	}

	fn release(&self, handle: LockHandle) -> LockFuture<'_, ()> {
		Box::pin(async move { self.release_now(&handle) })
	}
}
impl Debug for FileLock {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FileLock").field("dir", &self.dir).finish()
	}
}

enum Observed {
	Missing,
	Held { body: Vec<u8>, expires_at: OffsetDateTime },
}

/// Reads the lock at `path`; undecodable bodies expire `lease` after their last modification.
fn inspect(path: &Path, lease: Duration) -> Result<Observed, LockError> {
	let body = match fs::read(path) {
		Ok(body) => body,
		Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Observed::Missing),
		Err(e) => return Err(backend(path, "read", e)),
	};
	let expires_at = match serde_json::from_slice::<LockHandle>(&body) {
		Ok(current) => current.expires_at,
		Err(_) => {
			let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
				Ok(modified) => modified,
				Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Observed::Missing),
				Err(e) => return Err(backend(path, "stat", e)),
			};

			OffsetDateTime::from(modified) + lease
		},
	};

	Ok(Observed::Held { body, expires_at })
}

fn remove_if_present(path: &Path) -> Result<(), LockError> {
	match fs::remove_file(path) {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
		Err(e) => Err(backend(path, "remove", e)),
	}
}

fn backend(path: &Path, action: &str, e: std::io::Error) -> LockError {
	LockError::Backend { message: format!("Failed to {action} {}: {e}", path.display()) }
}
