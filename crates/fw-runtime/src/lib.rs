#![forbid(unsafe_code)]

//! Session runtime for the FieldWatch workspace.
//!
//! Wraps the pure layout engine from `fw-layout` with a mode flag, a
//! configurable storage backend and logging.

pub mod config;
pub mod session;
pub mod state_persistence;

pub use config::{ConfigError, DEFAULT_STORAGE_KEY, DanglingPagePolicy, SessionConfig};
pub use session::{WorkspaceMode, WorkspaceSession};
#[cfg(feature = "file-storage")]
pub use state_persistence::FileStorage;
pub use state_persistence::{
    MemoryStorage, StorageBackend, StorageError, StorageResult, WorkspaceStore,
};
