// studio-store/src/lib.rs
// ============================================================================
// Crate: studio-store
// Description: File-backed persistence: assets, result cache, run journal,
//              project/policy documents, and the real-disk HostEnvironment.
// Purpose: Give the Runtime and Service Facade a concrete, desktop-shaped
//          storage layer over `studio-core`'s capability traits.
// ============================================================================

//! # studio-store
//!
//! The file-backed half of Studio's persistence model: a real-disk
//! [`HostEnvironment`](studio_core::core::host::HostEnvironment), a
//! content-addressed [`AssetStore`](studio_core::interfaces::AssetStore), the
//! result cache snapshot, the run journal, and the project/policy document
//! store. None of these types know about node execution or scheduling; they
//! only read and write bytes through the host capability bundle.

pub mod assets;
pub mod cache;
pub mod clock;
pub mod host;
pub mod journal;
pub mod project_store;

pub use assets::FsAssetStore;
pub use assets::extension_for_mime;
pub use cache::CacheSnapshot;
pub use clock::Clock;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use host::FsHostEnvironment;
pub use journal::JournalError;
pub use journal::RunJournal;
pub use journal::recent_runs;
pub use project_store::LEGACY_AUTO_MIGRATION_ID;
pub use project_store::ProjectStore;
pub use project_store::ProjectStoreError;
pub use project_store::parse_project;
pub use project_store::validate;
