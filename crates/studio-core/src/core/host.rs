// studio-core/src/core/host.rs
// ============================================================================
// Module: Studio Host Environment
// Description: The narrow capability bundle a host embeds the runtime against.
// Purpose: Decouple the runtime from any specific editor/document host.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The reference implementation this runtime is modeled on is embedded in a
//! host that supplies vault paths, editor views, and notifications. This
//! runtime never depends on any of that: it only asks the embedding host for
//! binary file I/O, directory creation, existence checks, and a base path,
//! through [`HostEnvironment`]. The Runtime never touches notifications or
//! editor state.

use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

/// Errors a [`HostEnvironment`] implementation may raise.
#[derive(Debug, Error)]
pub enum HostError {
    /// The underlying I/O operation failed.
    #[error("host io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The narrow capability bundle the Runtime and its components use to reach
/// the filesystem, supplied by the embedding host.
pub trait HostEnvironment: Send + Sync {
    /// Reads the full contents of a file as bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the file cannot be read.
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>, HostError>;

    /// Writes bytes to a file, creating or truncating it.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the file cannot be written.
    fn write_binary(&self, path: &Path, bytes: &[u8]) -> Result<(), HostError>;

    /// Creates a directory and all missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the directory cannot be created.
    fn mkdir_all(&self, path: &Path) -> Result<(), HostError>;

    /// Returns true if `path` exists.
    fn exists(&self, path: &Path) -> bool;

    /// Appends bytes to a file, creating it if absent. Hosts that lack a
    /// native append primitive may fall back to read-modify-write.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the file cannot be read or written.
    fn append(&self, path: &Path, bytes: &[u8]) -> Result<(), HostError> {
        let mut existing = if self.exists(path) {
            self.read_binary(path)?
        } else {
            Vec::new()
        };
        existing.extend_from_slice(bytes);
        self.write_binary(path, &existing)
    }

    /// Removes a file, or a directory and its contents recursively.
    /// Best-effort in some callers: retention pruning of a whole run
    /// directory and sweeping the transcription temp root treat a failure
    /// here as non-fatal and merely log it.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the path cannot be removed.
    fn remove(&self, path: &Path) -> Result<(), HostError>;

    /// The root path this host resolves relative project/asset paths against.
    fn base_path(&self) -> &Path;

    /// True on hosts that support subprocess execution (desktop); false on
    /// hosts where the Sandbox Runner must fail fast with
    /// `UnsupportedEnvironment`.
    fn is_desktop(&self) -> bool;

    /// Resolves a path relative to [`HostEnvironment::base_path`] to an
    /// absolute path.
    fn resolve_absolute(&self, relative: &Path) -> PathBuf {
        self.base_path().join(relative)
    }

    /// Writes `bytes` to a freshly named scratch file under `dir` (created if
    /// missing) and returns its path. Used by node executors (e.g.
    /// transcription) that must hand a local path to an external tool.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the directory cannot be created or the file
    /// cannot be written.
    fn write_temp_file(&self, dir: &Path, suffix: &str, bytes: &[u8]) -> Result<PathBuf, HostError> {
        self.mkdir_all(dir)?;
        let name = crate::core::identifiers::random_id("tmp");
        let path = dir.join(format!("{name}{suffix}"));
        self.write_binary(&path, bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct MemoryHost {
        files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
        base: PathBuf,
    }

    impl HostEnvironment for MemoryHost {
        fn read_binary(&self, path: &Path) -> Result<Vec<u8>, HostError> {
            self.files
                .lock()
                .expect("lock")
                .get(path)
                .cloned()
                .ok_or_else(|| HostError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))
        }

        fn write_binary(&self, path: &Path, bytes: &[u8]) -> Result<(), HostError> {
            self.files
                .lock()
                .expect("lock")
                .insert(path.to_path_buf(), bytes.to_vec());
            Ok(())
        }

        fn mkdir_all(&self, _path: &Path) -> Result<(), HostError> {
            Ok(())
        }

        fn exists(&self, path: &Path) -> bool {
            self.files.lock().expect("lock").contains_key(path)
        }

        fn remove(&self, path: &Path) -> Result<(), HostError> {
            self.files.lock().expect("lock").remove(path);
            Ok(())
        }

        fn base_path(&self) -> &Path {
            &self.base
        }

        fn is_desktop(&self) -> bool {
            true
        }
    }

    #[test]
    fn write_temp_file_creates_a_uniquely_named_scratch_file() {
        let host = MemoryHost::default();
        let dir = PathBuf::from("tmp");
        let a = host.write_temp_file(&dir, ".wav", b"audio").expect("write a");
        let b = host.write_temp_file(&dir, ".wav", b"audio").expect("write b");
        assert_ne!(a, b);
        assert_eq!(host.read_binary(&a).expect("read"), b"audio");
    }

    #[test]
    fn append_falls_back_to_read_modify_write() {
        let host = MemoryHost::default();
        let path = PathBuf::from("events.ndjson");
        host.append(&path, b"line1\n").expect("append");
        host.append(&path, b"line2\n").expect("append");
        let contents = host.read_binary(&path).expect("read");
        assert_eq!(contents, b"line1\nline2\n");
    }
}
