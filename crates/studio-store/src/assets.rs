// studio-store/src/assets.rs
// ============================================================================
// Module: Filesystem Asset Store
// Description: Content-addressed blob storage sharded by SHA-256 prefix.
// Purpose: Implement `studio_core::interfaces::AssetStore` over a HostEnvironment.
// Dependencies: studio-core
// ============================================================================

//! ## Overview
//! [`FsAssetStore`] hashes bytes, derives the sharded
//! `assets/sha256/<xx>/<hash>.<ext>` path, and writes idempotently: a write
//! that targets an already-existing path is skipped entirely, so two writers
//! racing the same bytes converge without clobbering either.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use studio_core::core::hashing::HashAlgorithm;
use studio_core::core::hashing::hash_bytes;
use studio_core::core::host::HostEnvironment;
use studio_core::AssetRef;
use studio_core::interfaces::AssetStore;
use studio_core::interfaces::AssetStoreError;

/// The fixed MIME-to-extension table: known image/audio/video MIME types map
/// to their conventional extension, anything else to `bin`.
#[must_use]
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        _ => "bin",
    }
}

/// A content-addressed [`AssetStore`] rooted at `<project>-assets/assets/sha256/`.
pub struct FsAssetStore {
    host: Arc<dyn HostEnvironment>,
    assets_root: PathBuf,
}

impl FsAssetStore {
    /// Builds an asset store rooted at `assets_root` (e.g.
    /// `<project>.assets/assets`), resolved through `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostEnvironment>, assets_root: impl Into<PathBuf>) -> Self {
        Self {
            host,
            assets_root: assets_root.into(),
        }
    }

    /// Derives the sharded storage path for a given hash and MIME type,
    /// relative to the store's root.
    #[must_use]
    pub fn path_for(&self, hash_hex: &str, mime: &str) -> PathBuf {
        let shard = &hash_hex[..hash_hex.len().min(2)];
        self.assets_root
            .join("sha256")
            .join(shard)
            .join(format!("{hash_hex}.{}", extension_for_mime(mime)))
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn store(&self, bytes: &[u8], mime: &str) -> Result<AssetRef, AssetStoreError> {
        let digest = hash_bytes(HashAlgorithm::Sha256, bytes);
        let path = self.path_for(&digest.value, mime);

        if !self.host.exists(&path) {
            self.host
                .write_binary(&path, bytes)
                .map_err(|e| AssetStoreError::IoUnavailable(e.to_string()))?;
        }

        Ok(AssetRef {
            hash: digest.value,
            mime: mime.to_string(),
            size_bytes: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            path: path.display().to_string(),
        })
    }

    async fn read(&self, asset: &AssetRef) -> Result<Vec<u8>, AssetStoreError> {
        self.host
            .read_binary(Path::new(&asset.path))
            .map_err(|e| AssetStoreError::IoUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FsHostEnvironment;

    fn store() -> (tempfile::TempDir, FsAssetStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = Arc::new(FsHostEnvironment::new(dir.path()));
        let assets_root = dir.path().join("proj-assets/assets");
        let store = FsAssetStore::new(host, assets_root);
        (dir, store)
    }

    #[tokio::test]
    async fn storing_identical_bytes_twice_yields_the_same_ref_and_writes_once() {
        let (_dir, store) = store();
        let a = store.store(b"hello world", "text/plain").await.expect("store a");
        let b = store.store(b"hello world", "text/plain").await.expect("store b");
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.path, b.path);
        let bytes = store.read(&a).await.expect("read");
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn shards_by_first_two_hex_chars_and_maps_mime_to_extension() {
        let (_dir, store) = store();
        let asset = store.store(b"\x89PNG", "image/png").await.expect("store");
        assert!(asset.path.contains("/sha256/"));
        assert!(asset.path.ends_with(".png"));
        let shard = &asset.hash[..2];
        assert!(asset.path.contains(&format!("/{shard}/")));
    }

    #[tokio::test]
    async fn unknown_mime_falls_back_to_bin_extension() {
        let (_dir, store) = store();
        let asset = store.store(b"data", "application/x-unknown").await.expect("store");
        assert!(asset.path.ends_with(".bin"));
    }
}
