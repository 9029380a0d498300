// studio-store/src/host.rs
// ============================================================================
// Module: Filesystem Host Environment
// Description: A real-disk implementation of `studio_core::HostEnvironment`.
// Purpose: Supply the narrow filesystem capability bundle the Runtime and
//          its stores use, rooted at a fixed base path.
// Dependencies: std::fs, studio-core
// ============================================================================

//! ## Overview
//! [`FsHostEnvironment`] is the concrete, desktop-shaped [`HostEnvironment`]
//! this workspace ships: plain `std::fs` calls rooted at a base path, with a
//! native append (`OpenOptions::append`) rather than the trait's default
//! read-modify-write fallback.

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use studio_core::core::host::HostEnvironment;
use studio_core::core::host::HostError;

/// A [`HostEnvironment`] backed by the real filesystem, rooted at `base`.
pub struct FsHostEnvironment {
    base: PathBuf,
    desktop: bool,
}

impl FsHostEnvironment {
    /// Builds a host rooted at `base`, reporting as a desktop environment
    /// (subprocess execution supported).
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            desktop: true,
        }
    }

    /// Builds a host rooted at `base` that reports as non-desktop, for
    /// exercising the Sandbox Runner's `UnsupportedEnvironment` gate.
    #[must_use]
    pub fn new_non_desktop(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            desktop: false,
        }
    }
}

impl HostEnvironment for FsHostEnvironment {
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>, HostError> {
        Ok(fs::read(path)?)
    }

    fn write_binary(&self, path: &Path, bytes: &[u8]) -> Result<(), HostError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_name = format!(
            "{}.tmp-{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("write"),
            studio_core::core::identifiers::random_id("w")
        );
        let tmp_path = path.with_file_name(tmp_name);
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn mkdir_all(&self, path: &Path) -> Result<(), HostError> {
        Ok(fs::create_dir_all(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn append(&self, path: &Path, bytes: &[u8]) -> Result<(), HostError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), HostError> {
        if fs::symlink_metadata(path)?.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn base_path(&self) -> &Path {
        &self.base
    }

    fn is_desktop(&self) -> bool {
        self.desktop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let path = dir.path().join("sub/dir/file.bin");
        host.write_binary(&path, b"hello").expect("write");
        assert!(host.exists(&path));
        assert_eq!(host.read_binary(&path).expect("read"), b"hello");
    }

    #[test]
    fn append_uses_native_append_without_clobbering() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let path = dir.path().join("events.ndjson");
        host.append(&path, b"line1\n").expect("append");
        host.append(&path, b"line2\n").expect("append");
        assert_eq!(host.read_binary(&path).expect("read"), b"line1\nline2\n");
    }

    #[test]
    fn remove_deletes_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let path = dir.path().join("gone.bin");
        host.write_binary(&path, b"x").expect("write");
        host.remove(&path).expect("remove");
        assert!(!host.exists(&path));
    }
}
