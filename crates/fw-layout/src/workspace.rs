//! Persisted workspace document with versioning and migration scaffolding.
//!
//! A [`WorkspaceSnapshot`] wraps the layout tree snapshot with the mode flag,
//! the active pane and a forward-compatible extension bag.
//!
//! # Schema Versioning Policy
//!
//! - **Additive fields** may be carried in `extensions` without a version bump.
//! - **Breaking changes** require incrementing [`WORKSPACE_SCHEMA_VERSION`]
//!   and adding a migration path to [`migrate_workspace`].
//! - Loaders reject unknown versions with a typed error.
//!
//! # Usage
//!
//! ```
//! use fw_layout::pane::{PaneTree, SplitAxis};
//! use fw_layout::workspace::{WorkspaceSnapshot, WORKSPACE_SCHEMA_VERSION};
//!
//! let mut tree = PaneTree::new();
//! let _ = tree.split(tree.sections()[0], SplitAxis::Vertical);
//!
//! let snapshot = WorkspaceSnapshot::capture(true, Some(&tree));
//! assert_eq!(snapshot.schema_version, WORKSPACE_SCHEMA_VERSION);
//! assert_eq!(snapshot.leaf_count(), 2);
//!
//! let restored = snapshot.restore_tree().unwrap().unwrap();
//! assert_eq!(restored, tree);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pane::{LayoutTreeSnapshot, PaneId, PaneModelError, PaneTree};

/// Current workspace schema version.
pub const WORKSPACE_SCHEMA_VERSION: u16 = 1;

/// Persisted workspace state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSnapshot {
    #[serde(default = "default_workspace_version")]
    pub schema_version: u16,
    /// Whether the workspace view was on when persisted.
    #[serde(default)]
    pub enabled: bool,
    /// `None` until the workspace has been enabled for the first time.
    #[serde(default)]
    pub tree: Option<LayoutTreeSnapshot>,
    #[serde(default)]
    pub active_pane_id: Option<PaneId>,
    /// Forward-compatible extension bag.
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

fn default_workspace_version() -> u16 {
    WORKSPACE_SCHEMA_VERSION
}

impl Default for WorkspaceSnapshot {
    fn default() -> Self {
        Self {
            schema_version: WORKSPACE_SCHEMA_VERSION,
            enabled: false,
            tree: None,
            active_pane_id: None,
            extensions: BTreeMap::new(),
        }
    }
}

impl WorkspaceSnapshot {
    /// Capture the current mode flag and tree.
    #[must_use]
    pub fn capture(enabled: bool, tree: Option<&PaneTree>) -> Self {
        Self {
            enabled,
            tree: tree.map(PaneTree::to_snapshot),
            active_pane_id: tree.and_then(PaneTree::active_pane),
            ..Self::default()
        }
    }

    /// Validate the schema version and the tree's structural invariants.
    pub fn validate(&self) -> Result<(), WorkspaceValidationError> {
        self.restore_tree().map(|_| ())
    }

    /// Rebuild the live tree, if one was persisted.
    pub fn restore_tree(&self) -> Result<Option<PaneTree>, WorkspaceValidationError> {
        if self.schema_version != WORKSPACE_SCHEMA_VERSION {
            return Err(WorkspaceValidationError::UnsupportedVersion {
                found: self.schema_version,
                expected: WORKSPACE_SCHEMA_VERSION,
            });
        }
        let Some(tree) = &self.tree else {
            return Ok(None);
        };
        let tree = PaneTree::from_snapshot(tree.clone(), self.active_pane_id)?;
        Ok(Some(tree))
    }

    /// Count of leaf panes in the persisted tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.tree.as_ref().map_or(0, LayoutTreeSnapshot::leaf_count)
    }
}

/// Errors from workspace validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceValidationError {
    /// Schema version is not supported.
    UnsupportedVersion { found: u16, expected: u16 },
    /// The persisted tree breaks a structural invariant.
    PaneModel(PaneModelError),
}

impl fmt::Display for WorkspaceValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { found, expected } => {
                write!(
                    f,
                    "unsupported workspace schema version {found} (expected {expected})"
                )
            }
            Self::PaneModel(e) => write!(f, "pane model error: {e}"),
        }
    }
}

impl std::error::Error for WorkspaceValidationError {}

impl From<PaneModelError> for WorkspaceValidationError {
    fn from(err: PaneModelError) -> Self {
        Self::PaneModel(err)
    }
}

// =========================================================================
// Migration scaffolding
// =========================================================================

/// Result of migrating a workspace from an older schema version.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub snapshot: WorkspaceSnapshot,
    pub from_version: u16,
    pub to_version: u16,
    pub warnings: Vec<String>,
}

/// Errors from workspace migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceMigrationError {
    /// Written by a newer build.
    UnsupportedVersion { version: u16 },
    NoMigrationPath { from: u16, to: u16 },
}

impl fmt::Display for WorkspaceMigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported schema version {version} for migration")
            }
            Self::NoMigrationPath { from, to } => {
                write!(f, "no migration path from v{from} to v{to}")
            }
        }
    }
}

impl std::error::Error for WorkspaceMigrationError {}

/// Migrate a snapshot to the current schema version.
///
/// The current version is an identity migration.
pub fn migrate_workspace(
    snapshot: WorkspaceSnapshot,
) -> Result<MigrationResult, WorkspaceMigrationError> {
    match snapshot.schema_version {
        WORKSPACE_SCHEMA_VERSION => Ok(MigrationResult {
            from_version: WORKSPACE_SCHEMA_VERSION,
            to_version: WORKSPACE_SCHEMA_VERSION,
            warnings: Vec::new(),
            snapshot,
        }),
        v if v > WORKSPACE_SCHEMA_VERSION => {
            Err(WorkspaceMigrationError::UnsupportedVersion { version: v })
        }
        v => Err(WorkspaceMigrationError::NoMigrationPath {
            from: v,
            to: WORKSPACE_SCHEMA_VERSION,
        }),
    }
}

#[must_use]
pub fn needs_migration(snapshot: &WorkspaceSnapshot) -> bool {
    snapshot.schema_version != WORKSPACE_SCHEMA_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentRef;
    use crate::pane::SplitAxis;

    fn sample_tree() -> PaneTree {
        let mut tree = PaneTree::new();
        let root = tree.sections()[0];
        let _ = tree.split(root, SplitAxis::Vertical);
        let kids = tree.node(root).unwrap().children.clone();
        let _ = tree.assign_content(kids[1], ContentRef::tab("tab-7"));
        let _ = tree.set_active(kids[1]);
        tree
    }

    #[test]
    fn default_snapshot_is_disabled_and_empty() {
        let snapshot = WorkspaceSnapshot::default();
        assert!(!snapshot.enabled);
        assert!(snapshot.tree.is_none());
        assert_eq!(snapshot.leaf_count(), 0);
        snapshot.validate().unwrap();
        assert_eq!(snapshot.restore_tree(), Ok(None));
    }

    #[test]
    fn capture_records_active_pane() {
        let tree = sample_tree();
        let snapshot = WorkspaceSnapshot::capture(true, Some(&tree));
        assert_eq!(snapshot.active_pane_id, tree.active_pane());
        assert_eq!(snapshot.leaf_count(), 2);
    }

    #[test]
    fn json_roundtrip_restores_same_tree() {
        let tree = sample_tree();
        let snapshot = WorkspaceSnapshot::capture(true, Some(&tree));
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: WorkspaceSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.restore_tree().unwrap(), Some(tree));
    }

    #[test]
    fn json_uses_camel_case_fields() {
        let tree = sample_tree();
        let json = serde_json::to_value(WorkspaceSnapshot::capture(false, Some(&tree))).unwrap();
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(json["enabled"], false);
        assert!(json["activePaneId"].is_u64());
        assert!(json["tree"]["topLevelSections"].is_array());
        assert_eq!(json["tree"]["nextId"], 4);
    }

    #[test]
    fn missing_optional_fields_default() {
        let parsed: WorkspaceSnapshot = serde_json::from_str(r#"{"enabled": true}"#).unwrap();
        assert_eq!(parsed.schema_version, WORKSPACE_SCHEMA_VERSION);
        assert!(parsed.enabled);
        assert!(parsed.tree.is_none());
        assert!(parsed.extensions.is_empty());
    }

    #[test]
    fn handcrafted_document_loads() {
        let json = r#"{
            "schemaVersion": 1,
            "enabled": true,
            "tree": {
                "topLevelSections": [{
                    "id": 1,
                    "contentRef": null,
                    "direction": "horizontal",
                    "children": [
                        {"id": 2, "contentRef": {"type": "tab", "id": "t1"}},
                        {"id": 3, "contentRef": {"type": "virtual", "id": "vp-1"}}
                    ]
                }],
                "rowCount": 1,
                "colCount": 1
            },
            "activePaneId": 3,
            "extensions": {"host": "panel-a"}
        }"#;
        let snapshot: WorkspaceSnapshot = serde_json::from_str(json).unwrap();
        let tree = snapshot.restore_tree().unwrap().unwrap();
        assert_eq!(tree.leaves().len(), 2);
        assert_eq!(tree.active_pane(), Some(PaneId::new(3).unwrap()));
        assert_eq!(tree.next_id(), PaneId::new(4).unwrap());
        assert_eq!(snapshot.extensions["host"], "panel-a");
    }

    #[test]
    fn validate_rejects_wrong_version() {
        let snapshot = WorkspaceSnapshot {
            schema_version: 99,
            ..WorkspaceSnapshot::default()
        };
        assert_eq!(
            snapshot.validate(),
            Err(WorkspaceValidationError::UnsupportedVersion {
                found: 99,
                expected: WORKSPACE_SCHEMA_VERSION
            })
        );
    }

    #[test]
    fn validate_rejects_broken_tree() {
        let mut snapshot = WorkspaceSnapshot::capture(true, Some(&sample_tree()));
        if let Some(tree) = snapshot.tree.as_mut() {
            tree.top_level_sections.clear();
        }
        assert_eq!(
            snapshot.validate(),
            Err(WorkspaceValidationError::PaneModel(
                PaneModelError::EmptyWorkspace
            ))
        );
    }

    #[test]
    fn migrate_current_is_identity() {
        let snapshot = WorkspaceSnapshot::capture(true, Some(&sample_tree()));
        assert!(!needs_migration(&snapshot));
        let result = migrate_workspace(snapshot.clone()).unwrap();
        assert_eq!(result.snapshot, snapshot);
        assert_eq!(result.from_version, result.to_version);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn migrate_rejects_future_and_unknown_old_versions() {
        let future = WorkspaceSnapshot {
            schema_version: WORKSPACE_SCHEMA_VERSION + 1,
            ..WorkspaceSnapshot::default()
        };
        assert!(needs_migration(&future));
        assert!(matches!(
            migrate_workspace(future),
            Err(WorkspaceMigrationError::UnsupportedVersion { .. })
        ));

        let old = WorkspaceSnapshot {
            schema_version: 0,
            ..WorkspaceSnapshot::default()
        };
        assert_eq!(
            migrate_workspace(old).unwrap_err(),
            WorkspaceMigrationError::NoMigrationPath { from: 0, to: 1 }
        );
    }
}
