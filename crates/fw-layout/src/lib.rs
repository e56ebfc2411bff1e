#![forbid(unsafe_code)]

//! Tiling pane layout engine for the field-device monitoring dashboard.
//!
//! - [`pane`]: the workspace tree and its edit operations.
//! - [`content`]: what a pane is bound to and how it is resolved for display.
//! - [`virtual_page`]: pages that live only inside the workspace.
//! - [`workspace`]: the persisted document and schema migration.
//!
//! The crate does no I/O; persistence lives in `fw-runtime`.

pub mod content;
pub mod pane;
pub mod virtual_page;
pub mod workspace;

pub use content::{
    ContentDirectory, ContentRef, ContentResolver, MISSING_PAGE_TITLE, MISSING_TAB_TITLE,
    ResolvedContent, TabDescriptor, TabId, TabRegistry, VirtualPageId,
};
pub use pane::{
    DEFAULT_SECTION_COLUMNS, LayoutTreeSnapshot, PaneEditOutcome, PaneId, PaneModelError,
    PaneNode, PaneNodeSnapshot, PaneNoopReason, PanePosition, PaneTree, SplitAxis,
};
pub use virtual_page::{VirtualPage, VirtualPageRegistry};
pub use workspace::{
    MigrationResult, WORKSPACE_SCHEMA_VERSION, WorkspaceMigrationError, WorkspaceSnapshot,
    WorkspaceValidationError, migrate_workspace, needs_migration,
};
