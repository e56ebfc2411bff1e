//! Registry of virtual pages: pane content that exists only inside the
//! workspace and has no tab behind it.
//!
//! Entries are keyed by `vp-<uuid v4>` ids so a fresh registry never hands
//! out an id that a reloaded tree still references.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::{ContentRef, VirtualPageId};
use crate::pane::{PaneEditOutcome, PaneId, PaneNoopReason, PaneTree};

const VIRTUAL_PAGE_PREFIX: &str = "vp-";

/// A page descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPage {
    pub id: VirtualPageId,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualPageRegistry {
    pages: FxHashMap<VirtualPageId, VirtualPage>,
}

impl VirtualPageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new page and return its freshly minted id.
    pub fn register(&mut self, url: impl Into<String>, title: impl Into<String>) -> VirtualPageId {
        let id = VirtualPageId::new(format!("{VIRTUAL_PAGE_PREFIX}{}", Uuid::new_v4()));
        let page = VirtualPage {
            id: id.clone(),
            title: title.into(),
            url: url.into(),
        };
        let _ = self.pages.insert(id.clone(), page);
        id
    }

    /// Register a page and bind it to `pane_id` in one step.
    ///
    /// Nothing is registered when the pane is missing or split.
    pub fn register_and_assign(
        &mut self,
        tree: &mut PaneTree,
        pane_id: PaneId,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> PaneEditOutcome {
        match tree.node(pane_id) {
            None => {
                return PaneEditOutcome::Noop {
                    reason: PaneNoopReason::MissingPane { pane_id },
                };
            }
            Some(node) if node.is_split() => {
                return PaneEditOutcome::Noop {
                    reason: PaneNoopReason::NotALeaf { pane_id },
                };
            }
            Some(_) => {}
        }
        let id = self.register(url, title);
        tree.assign_content(pane_id, ContentRef::VirtualPage(id))
    }

    #[must_use]
    pub fn lookup(&self, id: &VirtualPageId) -> Option<&VirtualPage> {
        self.pages.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &VirtualPageId) -> bool {
        self.pages.contains_key(id)
    }

    /// Drop every page no pane in `tree` is bound to. Returns the number of
    /// pages removed.
    pub fn prune_unreferenced(&mut self, tree: &PaneTree) -> usize {
        let bound: FxHashSet<&VirtualPageId> = tree
            .bindings()
            .into_iter()
            .filter_map(|(_, content)| match content {
                ContentRef::VirtualPage(id) => Some(id),
                ContentRef::Tab(_) => None,
            })
            .collect();
        let before = self.pages.len();
        self.pages.retain(|id, _| bound.contains(id));
        before - self.pages.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Pages sorted by id, for stable output.
    #[must_use]
    pub fn pages(&self) -> Vec<&VirtualPage> {
        let mut pages: Vec<&VirtualPage> = self.pages.values().collect();
        pages.sort_by(|a, b| a.id.cmp(&b.id));
        pages
    }
}
