//! The workspace session: mode flag, live tree, virtual pages and
//! persistence, owned by one explicit instance.
//!
//! Every edit that changes the tree is followed by a save. Saves are
//! fire-and-forget: a failed write is logged and counted, and the in-memory
//! tree stays authoritative.

use std::collections::BTreeMap;
use std::fmt;

use fw_layout::{
    ContentDirectory, ContentRef, PaneEditOutcome, PaneId, PaneNoopReason, PaneTree,
    ResolvedContent, SplitAxis, TabId, TabRegistry, VirtualPageRegistry, WorkspaceSnapshot,
};
use serde::{Deserialize, Serialize};

use crate::config::{DanglingPagePolicy, SessionConfig};
use crate::state_persistence::{StorageBackend, WorkspaceStore};

/// Whether the tiled workspace view is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceMode {
    #[default]
    Disabled,
    Enabled,
}

impl WorkspaceMode {
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }

    const fn from_flag(enabled: bool) -> Self {
        if enabled { Self::Enabled } else { Self::Disabled }
    }
}

impl fmt::Display for WorkspaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Enabled => f.write_str("enabled"),
        }
    }
}

pub struct WorkspaceSession<B: StorageBackend> {
    mode: WorkspaceMode,
    tree: Option<PaneTree>,
    pages: VirtualPageRegistry,
    store: WorkspaceStore<B>,
    config: SessionConfig,
    extensions: BTreeMap<String, String>,
    last_persist_error: Option<String>,
    persist_failures: u64,
}

impl<B: StorageBackend> WorkspaceSession<B> {
    /// Load the persisted workspace, falling back to a disabled, empty
    /// session when nothing usable is stored.
    pub fn restore(store: WorkspaceStore<B>, config: SessionConfig) -> Self {
        let loaded = match store.load() {
            Ok(loaded) => loaded,
            Err(err) => {
                tracing::warn!(
                    key = %store.key(),
                    backend = store.backend().name(),
                    error = %err,
                    "discarding unreadable workspace state"
                );
                None
            }
        };

        let mut session = Self {
            mode: WorkspaceMode::Disabled,
            tree: None,
            pages: VirtualPageRegistry::new(),
            store,
            config,
            extensions: BTreeMap::new(),
            last_persist_error: None,
            persist_failures: 0,
        };

        let Some(snapshot) = loaded else {
            tracing::debug!(key = %session.store.key(), "no stored workspace; starting fresh");
            return session;
        };
        match snapshot.restore_tree() {
            Ok(tree) => {
                session.mode = WorkspaceMode::from_flag(snapshot.enabled);
                session.tree = tree;
                session.extensions = snapshot.extensions;
            }
            Err(err) => {
                tracing::warn!(
                    key = %session.store.key(),
                    error = %err,
                    "discarding invalid workspace tree"
                );
                return session;
            }
        }

        if session.mode.is_enabled() && session.tree.is_none() {
            session.tree = Some(PaneTree::with_section_columns(session.config.section_columns));
            tracing::warn!(
                key = %session.store.key(),
                "enabled workspace had no tree; created a fresh one"
            );
            session.persist();
        }

        session.apply_dangling_policy();
        tracing::info!(
            key = %session.store.key(),
            mode = %session.mode,
            state_hash = session.tree.as_ref().map(PaneTree::state_hash),
            "workspace restored"
        );
        session
    }

    /// Pages are never persisted, so every `virtual` binding in a freshly
    /// restored tree is dangling.
    fn apply_dangling_policy(&mut self) {
        if self.config.dangling_virtual_pages == DanglingPagePolicy::Keep {
            return;
        }
        let Some(tree) = self.tree.as_mut() else {
            return;
        };
        let pages = &self.pages;
        let purged = tree.purge_content(|content| match content {
            ContentRef::VirtualPage(id) => !pages.contains(id),
            ContentRef::Tab(_) => false,
        });
        if purged > 0 {
            tracing::info!(purged, "cleared dangling virtual page bindings");
            self.persist();
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn mode(&self) -> WorkspaceMode {
        self.mode
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.mode.is_enabled()
    }

    /// `None` until the workspace is enabled for the first time.
    #[must_use]
    pub fn tree(&self) -> Option<&PaneTree> {
        self.tree.as_ref()
    }

    #[must_use]
    pub fn pages(&self) -> &VirtualPageRegistry {
        &self.pages
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &WorkspaceStore<B> {
        &self.store
    }

    pub fn into_store(self) -> WorkspaceStore<B> {
        self.store
    }

    /// Most recent failed save, cleared by the next successful one.
    #[must_use]
    pub fn last_persist_error(&self) -> Option<&str> {
        self.last_persist_error.as_deref()
    }

    #[must_use]
    pub const fn persist_failures(&self) -> u64 {
        self.persist_failures
    }

    /// The document that would be written right now.
    #[must_use]
    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            extensions: self.extensions.clone(),
            ..WorkspaceSnapshot::capture(self.mode.is_enabled(), self.tree.as_ref())
        }
    }

    /// Display title and URL for a binding.
    pub fn resolve<T: TabRegistry + ?Sized>(
        &self,
        content: &ContentRef,
        tabs: &T,
    ) -> ResolvedContent {
        ContentDirectory::new(tabs, &self.pages).resolve(content)
    }

    // ------------------------------------------------------------------
    // Mode
    // ------------------------------------------------------------------

    /// Flip the mode flag. Enabling creates the tree on first use and
    /// otherwise brings back the existing one untouched.
    pub fn toggle_mode(&mut self) -> WorkspaceMode {
        self.mode = match self.mode {
            WorkspaceMode::Disabled => {
                if self.tree.is_none() {
                    self.tree = Some(PaneTree::with_section_columns(self.config.section_columns));
                    tracing::debug!("created workspace tree");
                }
                WorkspaceMode::Enabled
            }
            WorkspaceMode::Enabled => WorkspaceMode::Disabled,
        };
        tracing::info!(mode = %self.mode, "workspace mode toggled");
        self.persist();
        self.mode
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    pub fn split(&mut self, pane_id: PaneId, axis: SplitAxis) -> PaneEditOutcome {
        self.edit("split", Some(pane_id), |tree, _| tree.split(pane_id, axis))
    }

    pub fn close(&mut self, pane_id: PaneId) -> PaneEditOutcome {
        self.edit("close", Some(pane_id), |tree, _| tree.close(pane_id))
    }

    pub fn assign_content(&mut self, pane_id: PaneId, content: ContentRef) -> PaneEditOutcome {
        self.edit("assign_content", Some(pane_id), |tree, _| {
            tree.assign_content(pane_id, content)
        })
    }

    pub fn assign_tab(&mut self, pane_id: PaneId, tab: TabId) -> PaneEditOutcome {
        self.assign_content(pane_id, ContentRef::Tab(tab))
    }

    /// Register a virtual page and bind it to `pane_id`.
    pub fn open_page(
        &mut self,
        pane_id: PaneId,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> PaneEditOutcome {
        self.edit("open_page", Some(pane_id), |tree, pages| {
            pages.register_and_assign(tree, pane_id, url, title)
        })
    }

    pub fn clear_content(&mut self, pane_id: PaneId) -> PaneEditOutcome {
        self.edit("clear_content", Some(pane_id), |tree, _| {
            tree.clear_content(pane_id)
        })
    }

    pub fn set_active(&mut self, pane_id: PaneId) -> PaneEditOutcome {
        self.edit("set_active", Some(pane_id), |tree, _| tree.set_active(pane_id))
    }

    pub fn set_section_columns(&mut self, columns: u16) -> PaneEditOutcome {
        self.edit("set_section_columns", None, |tree, _| {
            tree.set_section_columns(columns)
        })
    }

    /// Append a top-level section; `None` when there is no tree.
    pub fn add_section(&mut self) -> Option<PaneId> {
        let added = self.tree.as_mut()?.add_section()?;
        tracing::debug!(pane_id = %added, "added section");
        self.persist();
        Some(added)
    }

    /// Replace the tree with a fresh single leaf, creating one if needed.
    pub fn reset(&mut self) -> PaneEditOutcome {
        let outcome = match self.tree.as_mut() {
            Some(tree) => tree.reset(),
            None => {
                self.tree = Some(PaneTree::with_section_columns(self.config.section_columns));
                PaneEditOutcome::Applied
            }
        };
        tracing::info!(%outcome, "workspace reset");
        self.persist();
        outcome
    }

    /// Drop pages no pane is bound to.
    pub fn prune_pages(&mut self) -> usize {
        match self.tree.as_ref() {
            Some(tree) => self.pages.prune_unreferenced(tree),
            None => 0,
        }
    }

    fn edit(
        &mut self,
        op: &'static str,
        pane_id: Option<PaneId>,
        apply: impl FnOnce(&mut PaneTree, &mut VirtualPageRegistry) -> PaneEditOutcome,
    ) -> PaneEditOutcome {
        let Some(tree) = self.tree.as_mut() else {
            let reason = match pane_id {
                Some(pane_id) => PaneNoopReason::MissingPane { pane_id },
                None => PaneNoopReason::NoWorkspace,
            };
            return PaneEditOutcome::Noop { reason };
        };

        let outcome = apply(tree, &mut self.pages);
        tracing::debug!(
            op,
            pane_id = pane_id.map(PaneId::get),
            outcome = %outcome,
            "workspace edit"
        );
        if outcome.is_applied() {
            self.persist();
        }
        outcome
    }

    fn persist(&mut self) {
        let snapshot = self.snapshot();
        match self.store.save(&snapshot) {
            Ok(()) => {
                self.last_persist_error = None;
                tracing::debug!(
                    key = %self.store.key(),
                    state_hash = self.tree.as_ref().map(PaneTree::state_hash),
                    "workspace persisted"
                );
            }
            Err(err) => {
                self.persist_failures = self.persist_failures.saturating_add(1);
                tracing::warn!(
                    key = %self.store.key(),
                    backend = self.store.backend().name(),
                    failures = self.persist_failures,
                    error = %err,
                    "failed to persist workspace; keeping in-memory state"
                );
                self.last_persist_error = Some(err.to_string());
            }
        }
    }
}

impl<B: StorageBackend> fmt::Debug for WorkspaceSession<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceSession")
            .field("mode", &self.mode)
            .field("tree", &self.tree)
            .field("pages", &self.pages.len())
            .field("key", &self.store.key())
            .field("persist_failures", &self.persist_failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_persistence::MemoryStorage;

    fn fresh() -> WorkspaceSession<MemoryStorage> {
        WorkspaceSession::restore(
            WorkspaceStore::new(MemoryStorage::new(), "ws"),
            SessionConfig::default(),
        )
    }

    #[test]
    fn starts_disabled_without_tree() {
        let session = fresh();
        assert_eq!(session.mode(), WorkspaceMode::Disabled);
        assert!(session.tree().is_none());
        assert!(session.store().backend().is_empty());
    }

    #[test]
    fn edits_without_tree_are_noops() {
        let mut session = fresh();
        assert_eq!(
            session.split(PaneId::MIN, SplitAxis::Vertical),
            PaneEditOutcome::Noop {
                reason: PaneNoopReason::MissingPane {
                    pane_id: PaneId::MIN
                }
            }
        );
        assert_eq!(
            session.set_section_columns(3),
            PaneEditOutcome::Noop {
                reason: PaneNoopReason::NoWorkspace
            }
        );
        assert!(session.add_section().is_none());
        assert!(session.store().backend().is_empty());
    }

    #[test]
    fn first_enable_creates_tree_and_persists() {
        let mut session = fresh();
        assert_eq!(session.toggle_mode(), WorkspaceMode::Enabled);
        let tree = session.tree().unwrap();
        assert_eq!(tree.leaves().len(), 1);
        assert_eq!(tree.section_columns(), 2);
        let stored = session.store().load().unwrap().unwrap();
        assert!(stored.enabled);
        assert_eq!(stored, session.snapshot());
    }

    #[test]
    fn disable_keeps_tree() {
        let mut session = fresh();
        let _ = session.toggle_mode();
        let root = session.tree().unwrap().sections()[0];
        let _ = session.split(root, SplitAxis::Horizontal);
        let before = session.tree().unwrap().clone();

        assert_eq!(session.toggle_mode(), WorkspaceMode::Disabled);
        assert_eq!(session.tree(), Some(&before));
        assert!(!session.store().load().unwrap().unwrap().enabled);
    }

    #[test]
    fn noop_edits_do_not_write() {
        let mut session = fresh();
        let _ = session.toggle_mode();
        let stored = session.store().backend().get("ws").unwrap().to_owned();
        let _ = session.close(session.tree().unwrap().sections()[0]);
        assert_eq!(session.store().backend().get("ws").unwrap(), stored);
    }

    #[test]
    fn open_page_resolves_through_session() {
        let mut session = fresh();
        let _ = session.toggle_mode();
        let root = session.tree().unwrap().sections()[0];
        assert!(session.open_page(root, "/alarms", "Alarms").is_applied());

        let content = session.tree().unwrap().node(root).unwrap().content.clone().unwrap();
        let tabs: BTreeMap<TabId, fw_layout::TabDescriptor> = BTreeMap::new();
        let resolved = session.resolve(&content, &tabs);
        assert_eq!(resolved.title, "Alarms");
        assert!(!resolved.dangling);
    }

    #[test]
    fn reset_without_tree_creates_one() {
        let mut session = fresh();
        assert!(session.reset().is_applied());
        assert!(session.tree().is_some());
        assert!(!session.is_enabled());
    }

    #[test]
    fn prune_pages_drops_unbound() {
        let mut session = fresh();
        let _ = session.toggle_mode();
        let root = session.tree().unwrap().sections()[0];
        let _ = session.open_page(root, "/a", "A");
        let _ = session.open_page(root, "/b", "B");
        assert_eq!(session.pages().len(), 2);
        assert_eq!(session.prune_pages(), 1);
    }
}
