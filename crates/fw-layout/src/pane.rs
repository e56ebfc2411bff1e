//! Workspace pane tree.
//!
//! The workspace is a row-major grid of independent top-level sections, each
//! of which may be split recursively into an ordered list of child panes.
//! This module owns that structure and the active-pane pointer, and keeps
//! the following invariants after every edit:
//!
//! - At least one top-level section exists.
//! - A content binding is held by at most one pane.
//! - A pane holds content only while it has no children.
//! - A pane has a split direction exactly when it has children.
//! - Pane ids are never reused: `next_id` only grows.
//! - The active pane, when set, is an existing leaf.
//!
//! Storage is an arena keyed by [`PaneId`] with parent back-pointers. The
//! nested [`LayoutTreeSnapshot`] shape is used only at the persistence
//! boundary.
//!
//! Edits never fail loudly: each mutator returns a [`PaneEditOutcome`] that
//! tells the caller whether anything changed and, if not, why.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::content::ContentRef;

/// Default grid width used to arrange top-level sections.
pub const DEFAULT_SECTION_COLUMNS: u16 = 2;

/// Stable identifier for pane nodes.
///
/// `0` is reserved/invalid so IDs are always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PaneId(u64);

impl PaneId {
    /// Lowest valid pane ID.
    pub const MIN: Self = Self(1);

    /// Create a new pane ID, rejecting 0.
    pub fn new(raw: u64) -> Result<Self, PaneModelError> {
        if raw == 0 {
            return Err(PaneModelError::ZeroPaneId);
        }
        Ok(Self(raw))
    }

    /// Get the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Return the next ID, or an error on overflow.
    pub fn checked_next(self) -> Result<Self, PaneModelError> {
        let Some(next) = self.0.checked_add(1) else {
            return Err(PaneModelError::PaneIdOverflow { current: self });
        };
        Self::new(next)
    }
}

impl TryFrom<u64> for PaneId {
    type Error = PaneModelError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<PaneId> for u64 {
    fn from(id: PaneId) -> Self {
        id.0
    }
}

impl Default for PaneId {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PaneId {
    type Err = PaneModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .trim()
            .parse::<u64>()
            .map_err(|_| PaneModelError::InvalidPaneId { raw: s.to_owned() })?;
        Self::new(raw)
    }
}

/// Arrangement of a split pane's children.
///
/// `Horizontal` places children side by side (one row, many columns);
/// `Vertical` stacks them (one column, many rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitAxis {
    Horizontal,
    Vertical,
}

/// `(row, col)` ordinal of a pane inside its parent's arrangement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanePosition {
    pub row: u16,
    pub col: u16,
}

impl PanePosition {
    #[must_use]
    pub const fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }
}

/// One pane in the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneNode {
    pub id: PaneId,
    /// `None` for top-level sections.
    pub parent: Option<PaneId>,
    pub content: Option<ContentRef>,
    pub children: Vec<PaneId>,
    pub direction: Option<SplitAxis>,
    pub position: PanePosition,
}

impl PaneNode {
    fn leaf(id: PaneId, parent: Option<PaneId>, content: Option<ContentRef>) -> Self {
        Self {
            id,
            parent,
            content,
            children: Vec::new(),
            direction: None,
            position: PanePosition::default(),
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    #[must_use]
    pub fn is_split(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Result of one tree edit.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaneEditOutcome {
    Applied,
    Noop { reason: PaneNoopReason },
}

impl PaneEditOutcome {
    const fn noop(reason: PaneNoopReason) -> Self {
        Self::Noop { reason }
    }

    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

impl fmt::Display for PaneEditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => f.write_str("applied"),
            Self::Noop { reason } => write!(f, "no-op: {reason}"),
        }
    }
}

/// Why an edit left the tree untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaneNoopReason {
    MissingPane { pane_id: PaneId },
    LastSection { pane_id: PaneId },
    NotALeaf { pane_id: PaneId },
    /// The tree was already in the requested state.
    Unchanged,
    IdSpaceExhausted,
    /// No workspace tree exists yet.
    NoWorkspace,
}

impl fmt::Display for PaneNoopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPane { pane_id } => write!(f, "pane {pane_id} not found"),
            Self::LastSection { pane_id } => {
                write!(f, "pane {pane_id} is the last top-level section")
            }
            Self::NotALeaf { pane_id } => write!(f, "pane {pane_id} is split, not a leaf"),
            Self::Unchanged => f.write_str("already in requested state"),
            Self::IdSpaceExhausted => f.write_str("pane id space exhausted"),
            Self::NoWorkspace => f.write_str("workspace has not been enabled yet"),
        }
    }
}

/// Persisted shape of one pane, children nested inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneNodeSnapshot {
    pub id: PaneId,
    #[serde(default)]
    pub content_ref: Option<ContentRef>,
    #[serde(default)]
    pub children: Vec<PaneNodeSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SplitAxis>,
    #[serde(default)]
    pub position: PanePosition,
}

impl PaneNodeSnapshot {
    /// Empty leaf record.
    #[must_use]
    pub fn leaf(id: PaneId) -> Self {
        Self {
            id,
            content_ref: None,
            children: Vec::new(),
            direction: None,
            position: PanePosition::default(),
        }
    }
}

/// Persisted shape of the whole layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutTreeSnapshot {
    pub top_level_sections: Vec<PaneNodeSnapshot>,
    #[serde(default)]
    pub row_count: u16,
    #[serde(default)]
    pub col_count: u16,
    #[serde(default = "default_section_columns")]
    pub section_columns: u16,
    /// Next id to hand out. Bumped past the largest stored id on load.
    #[serde(default)]
    pub next_id: PaneId,
}

fn default_section_columns() -> u16 {
    DEFAULT_SECTION_COLUMNS
}

impl LayoutTreeSnapshot {
    /// Pre-order walk over every stored node.
    pub fn walk(&self) -> impl Iterator<Item = &PaneNodeSnapshot> {
        let mut stack: Vec<&PaneNodeSnapshot> = self.top_level_sections.iter().rev().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.walk().filter(|node| node.children.is_empty()).count()
    }
}

/// The workspace pane tree plus its active-pane pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneTree {
    sections: Vec<PaneId>,
    section_columns: u16,
    next_id: PaneId,
    nodes: BTreeMap<PaneId, PaneNode>,
    active: Option<PaneId>,
}

impl Default for PaneTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PaneTree {
    /// A tree with a single empty leaf, which is also the active pane.
    #[must_use]
    pub fn new() -> Self {
        let root = PaneId::MIN;
        let mut nodes = BTreeMap::new();
        let _ = nodes.insert(root, PaneNode::leaf(root, None, None));
        Self {
            sections: vec![root],
            section_columns: DEFAULT_SECTION_COLUMNS,
            next_id: root.checked_next().unwrap_or(root),
            nodes,
            active: Some(root),
        }
    }

    /// Same as [`PaneTree::new`] with a custom section grid width.
    #[must_use]
    pub fn with_section_columns(columns: u16) -> Self {
        let mut tree = Self::new();
        tree.section_columns = columns.max(1);
        tree
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[must_use]
    pub fn node(&self, id: PaneId) -> Option<&PaneNode> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: PaneId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Iterate nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &PaneNode> {
        self.nodes.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level section ids in arrangement order.
    #[must_use]
    pub fn sections(&self) -> &[PaneId] {
        &self.sections
    }

    #[must_use]
    pub const fn active_pane(&self) -> Option<PaneId> {
        self.active
    }

    #[must_use]
    pub const fn next_id(&self) -> PaneId {
        self.next_id
    }

    #[must_use]
    pub const fn section_columns(&self) -> u16 {
        self.section_columns
    }

    #[must_use]
    pub fn col_count(&self) -> u16 {
        let sections = u16::try_from(self.sections.len()).unwrap_or(u16::MAX);
        sections.min(self.section_columns)
    }

    #[must_use]
    pub fn row_count(&self) -> u16 {
        let sections = u16::try_from(self.sections.len()).unwrap_or(u16::MAX);
        sections.div_ceil(self.section_columns)
    }

    /// Every node id in deterministic pre-order: sections in arrangement
    /// order, each parent before its children.
    #[must_use]
    pub fn preorder(&self) -> Vec<PaneId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<PaneId> = self.sections.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            order.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Leaf ids in pre-order.
    #[must_use]
    pub fn leaves(&self) -> Vec<PaneId> {
        self.preorder()
            .into_iter()
            .filter(|id| self.nodes.get(id).is_some_and(PaneNode::is_leaf))
            .collect()
    }

    #[must_use]
    pub fn first_leaf(&self) -> Option<PaneId> {
        self.leaves().into_iter().next()
    }

    /// The pane currently bound to `content`, if any.
    #[must_use]
    pub fn find_content(&self, content: &ContentRef) -> Option<PaneId> {
        self.nodes
            .values()
            .find(|node| node.content.as_ref() == Some(content))
            .map(|node| node.id)
    }

    /// All bindings in pre-order.
    #[must_use]
    pub fn bindings(&self) -> Vec<(PaneId, &ContentRef)> {
        self.preorder()
            .into_iter()
            .filter_map(|id| {
                let node = self.nodes.get(&id)?;
                node.content.as_ref().map(|content| (id, content))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Split `pane_id` along `axis`.
    ///
    /// A leaf becomes a parent of two new leaves; the first inherits its
    /// content. A pane that is already split gets one more empty child
    /// appended and its direction overwritten with `axis`, so repeated
    /// splits fan out rather than nest.
    pub fn split(&mut self, pane_id: PaneId, axis: SplitAxis) -> PaneEditOutcome {
        let Some(node) = self.nodes.get(&pane_id) else {
            return PaneEditOutcome::noop(PaneNoopReason::MissingPane { pane_id });
        };

        if node.is_split() {
            let Some(extra) = self.allocate_id() else {
                return PaneEditOutcome::noop(PaneNoopReason::IdSpaceExhausted);
            };
            let _ = self
                .nodes
                .insert(extra, PaneNode::leaf(extra, Some(pane_id), None));
            if let Some(node) = self.nodes.get_mut(&pane_id) {
                node.children.push(extra);
                node.direction = Some(axis);
            }
            self.renumber_children(pane_id);
            return PaneEditOutcome::Applied;
        }

        let Some((first, second)) = self.allocate_pair() else {
            return PaneEditOutcome::noop(PaneNoopReason::IdSpaceExhausted);
        };
        let content = self
            .nodes
            .get_mut(&pane_id)
            .and_then(|node| node.content.take());
        let _ = self
            .nodes
            .insert(first, PaneNode::leaf(first, Some(pane_id), content));
        let _ = self
            .nodes
            .insert(second, PaneNode::leaf(second, Some(pane_id), None));
        if let Some(node) = self.nodes.get_mut(&pane_id) {
            node.children = vec![first, second];
            node.direction = Some(axis);
        }
        self.renumber_children(pane_id);

        if self.active == Some(pane_id) {
            self.active = Some(first);
        }
        PaneEditOutcome::Applied
    }

    /// Close `pane_id` together with its subtree.
    ///
    /// A parent left with a single child absorbs that child's content,
    /// children and direction (keeping its own id); a parent left with no
    /// children reverts to an empty leaf. The last top-level section is
    /// never closed.
    pub fn close(&mut self, pane_id: PaneId) -> PaneEditOutcome {
        let Some(node) = self.nodes.get(&pane_id) else {
            return PaneEditOutcome::noop(PaneNoopReason::MissingPane { pane_id });
        };

        let Some(parent_id) = node.parent else {
            if self.sections.len() <= 1 {
                return PaneEditOutcome::noop(PaneNoopReason::LastSection { pane_id });
            }
            self.sections.retain(|id| *id != pane_id);
            self.remove_subtree(pane_id);
            self.renumber_sections();
            self.repair_active(None);
            return PaneEditOutcome::Applied;
        };

        self.remove_subtree(pane_id);
        let remaining = match self.nodes.get_mut(&parent_id) {
            Some(parent) => {
                parent.children.retain(|id| *id != pane_id);
                parent.children.clone()
            }
            None => Vec::new(),
        };

        let absorbed = match remaining.as_slice() {
            [] => {
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.direction = None;
                }
                None
            }
            [sibling] => {
                self.absorb_child(parent_id, *sibling);
                Some(*sibling)
            }
            _ => {
                self.renumber_children(parent_id);
                None
            }
        };

        self.repair_active(absorbed.map(|sibling| (sibling, parent_id)));
        PaneEditOutcome::Applied
    }

    /// Bind `content` to `pane_id`, first clearing any other pane that holds
    /// the same binding.
    pub fn assign_content(&mut self, pane_id: PaneId, content: ContentRef) -> PaneEditOutcome {
        let Some(node) = self.nodes.get(&pane_id) else {
            return PaneEditOutcome::noop(PaneNoopReason::MissingPane { pane_id });
        };
        if node.is_split() {
            return PaneEditOutcome::noop(PaneNoopReason::NotALeaf { pane_id });
        }
        if node.content.as_ref() == Some(&content) {
            return PaneEditOutcome::noop(PaneNoopReason::Unchanged);
        }

        for other in self.nodes.values_mut() {
            if other.content.as_ref() == Some(&content) {
                other.content = None;
            }
        }
        if let Some(node) = self.nodes.get_mut(&pane_id) {
            node.content = Some(content);
        }
        PaneEditOutcome::Applied
    }

    /// Drop whatever `pane_id` is bound to.
    pub fn clear_content(&mut self, pane_id: PaneId) -> PaneEditOutcome {
        let Some(node) = self.nodes.get_mut(&pane_id) else {
            return PaneEditOutcome::noop(PaneNoopReason::MissingPane { pane_id });
        };
        if node.content.take().is_none() {
            return PaneEditOutcome::noop(PaneNoopReason::Unchanged);
        }
        PaneEditOutcome::Applied
    }

    /// Point the active pane at `pane_id`, which must be an existing leaf.
    pub fn set_active(&mut self, pane_id: PaneId) -> PaneEditOutcome {
        let Some(node) = self.nodes.get(&pane_id) else {
            return PaneEditOutcome::noop(PaneNoopReason::MissingPane { pane_id });
        };
        if node.is_split() {
            return PaneEditOutcome::noop(PaneNoopReason::NotALeaf { pane_id });
        }
        if self.active == Some(pane_id) {
            return PaneEditOutcome::noop(PaneNoopReason::Unchanged);
        }
        self.active = Some(pane_id);
        PaneEditOutcome::Applied
    }

    /// Replace everything with a single empty, active leaf.
    ///
    /// The id counter carries over so retired ids stay retired.
    pub fn reset(&mut self) -> PaneEditOutcome {
        let Some(root) = self.allocate_id() else {
            return PaneEditOutcome::noop(PaneNoopReason::IdSpaceExhausted);
        };
        self.nodes.clear();
        let _ = self.nodes.insert(root, PaneNode::leaf(root, None, None));
        self.sections = vec![root];
        self.active = Some(root);
        PaneEditOutcome::Applied
    }

    /// Append an empty top-level section and return its id.
    pub fn add_section(&mut self) -> Option<PaneId> {
        let id = self.allocate_id()?;
        let _ = self.nodes.insert(id, PaneNode::leaf(id, None, None));
        self.sections.push(id);
        self.renumber_sections();
        Some(id)
    }

    /// Change the grid width used for top-level sections (minimum 1).
    pub fn set_section_columns(&mut self, columns: u16) -> PaneEditOutcome {
        let columns = columns.max(1);
        if columns == self.section_columns {
            return PaneEditOutcome::noop(PaneNoopReason::Unchanged);
        }
        self.section_columns = columns;
        self.renumber_sections();
        PaneEditOutcome::Applied
    }

    /// Clear every binding selected by `predicate`; returns how many were
    /// cleared.
    pub fn purge_content(&mut self, mut predicate: impl FnMut(&ContentRef) -> bool) -> usize {
        let mut cleared = 0;
        for node in self.nodes.values_mut() {
            if node.content.as_ref().is_some_and(&mut predicate) {
                node.content = None;
                cleared += 1;
            }
        }
        cleared
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Export to the nested persisted shape.
    #[must_use]
    pub fn to_snapshot(&self) -> LayoutTreeSnapshot {
        LayoutTreeSnapshot {
            top_level_sections: self
                .sections
                .iter()
                .filter_map(|id| self.snapshot_node(*id))
                .collect(),
            row_count: self.row_count(),
            col_count: self.col_count(),
            section_columns: self.section_columns,
            next_id: self.next_id,
        }
    }

    fn snapshot_node(&self, id: PaneId) -> Option<PaneNodeSnapshot> {
        let node = self.nodes.get(&id)?;
        Some(PaneNodeSnapshot {
            id,
            content_ref: node.content.clone(),
            children: node
                .children
                .iter()
                .filter_map(|child| self.snapshot_node(*child))
                .collect(),
            direction: node.direction,
            position: node.position,
        })
    }

    /// Rebuild from a persisted snapshot and validate it.
    ///
    /// Positions are re-derived, a stale `next_id` is bumped past the
    /// largest stored id, and an `active` id that does not name a leaf
    /// falls back to the first leaf.
    pub fn from_snapshot(
        snapshot: LayoutTreeSnapshot,
        active: Option<PaneId>,
    ) -> Result<Self, PaneModelError> {
        if snapshot.top_level_sections.is_empty() {
            return Err(PaneModelError::EmptyWorkspace);
        }

        let sections: Vec<PaneId> = snapshot.top_level_sections.iter().map(|s| s.id).collect();
        let mut nodes = BTreeMap::new();
        let mut stack: Vec<(PaneNodeSnapshot, Option<PaneId>)> = snapshot
            .top_level_sections
            .into_iter()
            .map(|section| (section, None))
            .collect();

        while let Some((record, parent)) = stack.pop() {
            let id = record.id;
            let node = PaneNode {
                id,
                parent,
                content: record.content_ref,
                children: record.children.iter().map(|child| child.id).collect(),
                direction: record.direction,
                position: record.position,
            };
            if nodes.insert(id, node).is_some() {
                return Err(PaneModelError::DuplicateNodeId { node_id: id });
            }
            stack.extend(record.children.into_iter().map(|child| (child, Some(id))));
        }

        let mut next_id = snapshot.next_id;
        if let Some(max_existing) = nodes.keys().next_back().copied()
            && next_id <= max_existing
        {
            next_id = max_existing.checked_next()?;
        }

        let mut tree = Self {
            sections,
            section_columns: snapshot.section_columns.max(1),
            next_id,
            nodes,
            active: None,
        };
        tree.validate()?;

        let parents: Vec<PaneId> = tree
            .nodes
            .values()
            .filter(|node| node.is_split())
            .map(|node| node.id)
            .collect();
        for parent in parents {
            tree.renumber_children(parent);
        }
        tree.renumber_sections();

        tree.active = active
            .filter(|id| tree.nodes.get(id).is_some_and(PaneNode::is_leaf))
            .or_else(|| tree.first_leaf());
        Ok(tree)
    }

    /// Check every structural invariant.
    pub fn validate(&self) -> Result<(), PaneModelError> {
        validate_tree(self)
    }

    /// Deterministic structural hash over the tree and active pointer.
    ///
    /// Intended for logs and equality checks across save/restore.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0001_0000_01b3;

        fn mix(hash: &mut u64, byte: u8) {
            *hash ^= u64::from(byte);
            *hash = hash.wrapping_mul(PRIME);
        }

        fn mix_bytes(hash: &mut u64, bytes: &[u8]) {
            for byte in bytes {
                mix(hash, *byte);
            }
        }

        fn mix_u16(hash: &mut u64, value: u16) {
            mix_bytes(hash, &value.to_le_bytes());
        }

        fn mix_u64(hash: &mut u64, value: u64) {
            mix_bytes(hash, &value.to_le_bytes());
        }

        fn mix_opt_pane_id(hash: &mut u64, value: Option<PaneId>) {
            match value {
                Some(value) => {
                    mix(hash, 1);
                    mix_u64(hash, value.get());
                }
                None => mix(hash, 0),
            }
        }

        fn mix_str(hash: &mut u64, value: &str) {
            mix_u64(hash, value.len() as u64);
            mix_bytes(hash, value.as_bytes());
        }

        let mut hash = OFFSET_BASIS;
        mix_u16(&mut hash, self.section_columns);
        mix_u64(&mut hash, self.next_id.get());
        mix_opt_pane_id(&mut hash, self.active);
        mix_u64(&mut hash, self.sections.len() as u64);
        for section in &self.sections {
            mix_u64(&mut hash, section.get());
        }
        mix_u64(&mut hash, self.nodes.len() as u64);

        for node in self.nodes.values() {
            mix_u64(&mut hash, node.id.get());
            mix_opt_pane_id(&mut hash, node.parent);
            match &node.content {
                None => mix(&mut hash, 0),
                Some(ContentRef::Tab(id)) => {
                    mix(&mut hash, 1);
                    mix_str(&mut hash, id.as_str());
                }
                Some(ContentRef::VirtualPage(id)) => {
                    mix(&mut hash, 2);
                    mix_str(&mut hash, id.as_str());
                }
            }
            let axis_byte = match node.direction {
                None => 0,
                Some(SplitAxis::Horizontal) => 1,
                Some(SplitAxis::Vertical) => 2,
            };
            mix(&mut hash, axis_byte);
            mix_u64(&mut hash, node.children.len() as u64);
            for child in &node.children {
                mix_u64(&mut hash, child.get());
            }
            mix_u16(&mut hash, node.position.row);
            mix_u16(&mut hash, node.position.col);
        }

        hash
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn allocate_id(&mut self) -> Option<PaneId> {
        let current = self.next_id;
        self.next_id = current.checked_next().ok()?;
        Some(current)
    }

    /// Both ids or neither: `next_id` is untouched when the pair won't fit.
    fn allocate_pair(&mut self) -> Option<(PaneId, PaneId)> {
        let first = self.next_id;
        let second = first.checked_next().ok()?;
        self.next_id = second.checked_next().ok()?;
        Some((first, second))
    }

    fn remove_subtree(&mut self, root: PaneId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children);
            }
        }
    }

    /// Fold `child` (the only remaining child of `parent_id`) into its parent.
    fn absorb_child(&mut self, parent_id: PaneId, child: PaneId) {
        let Some(absorbed) = self.nodes.remove(&child) else {
            return;
        };
        for grandchild in &absorbed.children {
            if let Some(node) = self.nodes.get_mut(grandchild) {
                node.parent = Some(parent_id);
            }
        }
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.content = absorbed.content;
            parent.children = absorbed.children;
            parent.direction = absorbed.direction;
        }
        self.renumber_children(parent_id);
    }

    fn repair_active(&mut self, absorbed: Option<(PaneId, PaneId)>) {
        let still_valid = self
            .active
            .is_some_and(|id| self.nodes.get(&id).is_some_and(PaneNode::is_leaf));
        if still_valid {
            return;
        }
        if let Some((sibling, parent)) = absorbed
            && self.active == Some(sibling)
            && self.nodes.get(&parent).is_some_and(PaneNode::is_leaf)
        {
            self.active = Some(parent);
            return;
        }
        self.active = self.first_leaf();
    }

    fn renumber_children(&mut self, parent_id: PaneId) {
        let Some(parent) = self.nodes.get(&parent_id) else {
            return;
        };
        let direction = parent.direction.unwrap_or(SplitAxis::Horizontal);
        let children = parent.children.clone();
        for (index, child) in children.into_iter().enumerate() {
            let ordinal = u16::try_from(index).unwrap_or(u16::MAX);
            if let Some(node) = self.nodes.get_mut(&child) {
                node.position = match direction {
                    SplitAxis::Horizontal => PanePosition::new(0, ordinal),
                    SplitAxis::Vertical => PanePosition::new(ordinal, 0),
                };
            }
        }
    }

    fn renumber_sections(&mut self) {
        let columns = usize::from(self.section_columns.max(1));
        for (index, section) in self.sections.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(section) {
                node.position = PanePosition::new(
                    u16::try_from(index / columns).unwrap_or(u16::MAX),
                    u16::try_from(index % columns).unwrap_or(u16::MAX),
                );
            }
        }
    }
}

/// Structural errors found while loading or validating a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneModelError {
    ZeroPaneId,
    InvalidPaneId {
        raw: String,
    },
    EmptyWorkspace,
    DuplicateNodeId {
        node_id: PaneId,
    },
    MissingNode {
        node_id: PaneId,
        parent: Option<PaneId>,
    },
    ParentMismatch {
        node_id: PaneId,
        expected: Option<PaneId>,
        actual: Option<PaneId>,
    },
    CycleDetected {
        node_id: PaneId,
    },
    UnreachableNode {
        node_id: PaneId,
    },
    ContentOnSplit {
        node_id: PaneId,
    },
    DirectionMismatch {
        node_id: PaneId,
    },
    DuplicateBinding {
        content: ContentRef,
        first: PaneId,
        second: PaneId,
    },
    NextIdNotGreaterThanExisting {
        next_id: PaneId,
        max_existing: PaneId,
    },
    ActivePaneMissing {
        pane_id: PaneId,
    },
    ActivePaneNotLeaf {
        pane_id: PaneId,
    },
    PaneIdOverflow {
        current: PaneId,
    },
}

impl fmt::Display for PaneModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroPaneId => write!(f, "pane id 0 is invalid"),
            Self::InvalidPaneId { raw } => write!(f, "invalid pane id {raw:?}"),
            Self::EmptyWorkspace => write!(f, "workspace has no top-level sections"),
            Self::DuplicateNodeId { node_id } => write!(f, "duplicate pane node id {node_id}"),
            Self::MissingNode { node_id, parent } => match parent {
                Some(parent) => write!(f, "pane {parent} references missing child {node_id}"),
                None => write!(f, "top-level section {node_id} not found"),
            },
            Self::ParentMismatch {
                node_id,
                expected,
                actual,
            } => write!(
                f,
                "pane {node_id} parent mismatch: expected {:?}, got {:?}",
                expected.map(PaneId::get),
                actual.map(PaneId::get)
            ),
            Self::CycleDetected { node_id } => write!(f, "cycle detected at pane {node_id}"),
            Self::UnreachableNode { node_id } => {
                write!(f, "pane {node_id} is unreachable from any section")
            }
            Self::ContentOnSplit { node_id } => {
                write!(f, "split pane {node_id} must not hold content")
            }
            Self::DirectionMismatch { node_id } => write!(
                f,
                "pane {node_id} must have a direction exactly when it has children"
            ),
            Self::DuplicateBinding {
                content,
                first,
                second,
            } => write!(f, "{content} is bound to both pane {first} and pane {second}"),
            Self::NextIdNotGreaterThanExisting {
                next_id,
                max_existing,
            } => write!(
                f,
                "next_id {next_id} must be greater than max existing id {max_existing}"
            ),
            Self::ActivePaneMissing { pane_id } => write!(f, "active pane {pane_id} not found"),
            Self::ActivePaneNotLeaf { pane_id } => {
                write!(f, "active pane {pane_id} is split, not a leaf")
            }
            Self::PaneIdOverflow { current } => write!(f, "pane id overflow after {current}"),
        }
    }
}

impl std::error::Error for PaneModelError {}

fn validate_tree(tree: &PaneTree) -> Result<(), PaneModelError> {
    if tree.sections.is_empty() {
        return Err(PaneModelError::EmptyWorkspace);
    }

    let mut visited = BTreeSet::new();
    let mut bound: BTreeMap<&ContentRef, PaneId> = BTreeMap::new();
    let mut stack: Vec<(PaneId, Option<PaneId>)> =
        tree.sections.iter().rev().map(|id| (*id, None)).collect();

    while let Some((node_id, expected_parent)) = stack.pop() {
        if !visited.insert(node_id) {
            return Err(PaneModelError::CycleDetected { node_id });
        }
        let Some(node) = tree.nodes.get(&node_id) else {
            return Err(PaneModelError::MissingNode {
                node_id,
                parent: expected_parent,
            });
        };
        if node.parent != expected_parent {
            return Err(PaneModelError::ParentMismatch {
                node_id,
                expected: expected_parent,
                actual: node.parent,
            });
        }
        if node.is_split() && node.content.is_some() {
            return Err(PaneModelError::ContentOnSplit { node_id });
        }
        if node.direction.is_some() != node.is_split() {
            return Err(PaneModelError::DirectionMismatch { node_id });
        }
        if let Some(content) = &node.content
            && let Some(first) = bound.insert(content, node_id)
        {
            return Err(PaneModelError::DuplicateBinding {
                content: content.clone(),
                first,
                second: node_id,
            });
        }
        stack.extend(node.children.iter().rev().map(|child| (*child, Some(node_id))));
    }

    if let Some(orphan) = tree.nodes.keys().find(|id| !visited.contains(id)) {
        return Err(PaneModelError::UnreachableNode { node_id: *orphan });
    }

    if let Some(max_existing) = tree.nodes.keys().next_back().copied()
        && tree.next_id <= max_existing
    {
        return Err(PaneModelError::NextIdNotGreaterThanExisting {
            next_id: tree.next_id,
            max_existing,
        });
    }

    if let Some(pane_id) = tree.active {
        match tree.nodes.get(&pane_id) {
            None => return Err(PaneModelError::ActivePaneMissing { pane_id }),
            Some(node) if node.is_split() => {
                return Err(PaneModelError::ActivePaneNotLeaf { pane_id });
            }
            Some(_) => {}
        }
    }

    Ok(())
}
