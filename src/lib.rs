//! Version-tree manager of a versioned block-storage engine.
//!
//! The manager keeps a persistent forest of versions rooted at id 0. A
//! version is created either as a *snapshot* (read-only child of a leaf)
//! or as a *clone* (writable child of a non-attached or non-leaf parent).
//! A processor threads freshly created or freshly loaded records into the
//! forest in parent-before-child order, tolerating arbitrary input order
//! from the metadata store, and reassigns DFS enter/exit numbers, which
//! make ancestry tests and version comparison O(1).
//!
//! Persistence and presentation are external collaborators behind the
//! traits in [metadata] and [report].
//!
//! # Example
//!
//! ```
//! use castle_version_stack::{
//!     version::{VersionKind, VersionManager},
//!     GroupId, VersionId, VersionManagerConfig,
//! };
//!
//! let manager = VersionManager::new(VersionManagerConfig::default());
//! manager.zero_init().unwrap();
//! let child = manager
//!     .create(VersionKind::Clone, VersionId::ROOT, GroupId(7), 0)
//!     .unwrap();
//! assert!(manager.is_ancestor(VersionId::ROOT, child));
//! assert!(!manager.is_ancestor(child, VersionId::ROOT));
//! ```

mod config;
pub mod metadata;
pub mod report;
pub mod version;

pub use config::VersionManagerConfig;
pub use version::{Error, GroupId, VersionId, VersionInfo, VersionKind, VersionManager};

/// Initialise a default `env_logger` unless the host application already
/// configured logging.
#[cfg(feature = "init_env_logger")]
pub fn init_env_logger() {
    let _ = env_logger::builder().try_init();
}
