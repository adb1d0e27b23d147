//! Primitive types for test setup.

use std::ops::Deref;

use rand::{distributions::Alphanumeric, prelude::*};

const TMP_SUFFIX_LEN: usize = 12;

/// Wrapper type for [`std::path::Path`] that attempts to remove a file or
/// directory at the path on drop.
#[derive(Debug)]
pub struct PathWrapper(String);

impl From<String> for PathWrapper {
	fn from(path: String) -> Self {
		Self(path)
	}
}

impl Drop for PathWrapper {
	fn drop(&mut self) {
		// Try removing it both as a file and as a directory. One of these
		// will always fail
		drop(std::fs::remove_dir_all(&self.0));
		drop(std::fs::remove_file(&self.0));
	}
}

impl Deref for PathWrapper {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// A fresh path under the system temp dir, starting with `prefix`. Nothing
/// is created; whatever the test creates there is removed when the wrapper
/// drops.
#[must_use]
pub fn tmp_path(prefix: &str) -> PathWrapper {
	let suffix: String = rand::thread_rng()
		.sample_iter(&Alphanumeric)
		.take(TMP_SUFFIX_LEN)
		.map(char::from)
		.collect();
	let path = std::env::temp_dir().join(format!("{prefix}.{suffix}"));
	path.to_string_lossy().into_owned().into()
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn path_wrapper_removes_file() {
		let path = tmp_path("ctl_test_primitives");
		std::fs::write(&*path, b"x").unwrap();
		let owned = path.to_string();
		drop(path);
		assert!(!std::path::Path::new(&owned).exists());
	}

	#[test]
	fn path_wrapper_removes_directory() {
		let path = tmp_path("ctl_test_primitives_dir");
		std::fs::create_dir_all(format!("{}/nested", &*path)).unwrap();
		let owned = path.to_string();
		drop(path);
		assert!(!std::path::Path::new(&owned).exists());
	}

	#[test]
	fn tmp_paths_differ() {
		assert_ne!(tmp_path("same").to_string(), tmp_path("same").to_string());
	}
}
