//! Content bindings for workspace panes.
//!
//! A pane never owns what it displays. It stores a [`ContentRef`]: a tagged
//! id pointing either at a tab tracked by the host's tab registry or at an
//! entry in the [`VirtualPageRegistry`](crate::virtual_page::VirtualPageRegistry).
//! Titles and URLs are looked up on demand through [`ContentResolver`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::virtual_page::VirtualPageRegistry;

/// Placeholder title for a tab reference the registry no longer knows.
pub const MISSING_TAB_TITLE: &str = "Missing tab";

/// Placeholder title for a virtual page that was not restored.
pub const MISSING_PAGE_TITLE: &str = "Missing page";

/// Identifier of a tab owned by the host tab registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a virtual page descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualPageId(String);

impl VirtualPageId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VirtualPageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a pane is bound to.
///
/// Serialized as `{"type": "tab", "id": "..."}` or
/// `{"type": "virtual", "id": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
pub enum ContentRef {
    #[serde(rename = "tab")]
    Tab(TabId),
    #[serde(rename = "virtual")]
    VirtualPage(VirtualPageId),
}

impl ContentRef {
    #[must_use]
    pub fn tab(id: impl Into<String>) -> Self {
        Self::Tab(TabId::new(id))
    }

    #[must_use]
    pub fn virtual_page(id: impl Into<String>) -> Self {
        Self::VirtualPage(VirtualPageId::new(id))
    }

    /// Raw id regardless of variant.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Tab(id) => id.as_str(),
            Self::VirtualPage(id) => id.as_str(),
        }
    }

    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self, Self::VirtualPage(_))
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tab(id) => write!(f, "tab:{id}"),
            Self::VirtualPage(id) => write!(f, "virtual:{id}"),
        }
    }
}

/// Tab entity as exposed by the host tab registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabDescriptor {
    pub id: TabId,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub custom_title: Option<String>,
}

impl TabDescriptor {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: TabId::new(id),
            title: title.into(),
            url: url.into(),
            custom_title: None,
        }
    }

    #[must_use]
    pub fn with_custom_title(mut self, title: impl Into<String>) -> Self {
        self.custom_title = Some(title.into());
        self
    }

    /// Title shown to the user: the custom title wins when set.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.custom_title.as_deref().unwrap_or(&self.title)
    }
}

/// Read access to the host's tab registry.
pub trait TabRegistry {
    fn tab(&self, id: &TabId) -> Option<TabDescriptor>;
}

impl TabRegistry for BTreeMap<TabId, TabDescriptor> {
    fn tab(&self, id: &TabId) -> Option<TabDescriptor> {
        self.get(id).cloned()
    }
}

/// Title/URL lookup for a content binding.
///
/// Implementations must never panic on unknown ids; they degrade to a
/// placeholder title and no URL instead.
pub trait ContentResolver {
    fn resolve_title(&self, content: &ContentRef) -> String;
    fn resolve_url(&self, content: &ContentRef) -> Option<String>;

    /// Whether the reference points at something that still exists.
    fn is_resolvable(&self, content: &ContentRef) -> bool {
        self.resolve_url(content).is_some()
    }
}

/// Resolver over a tab registry and the virtual page registry.
pub struct ContentDirectory<'a, T: TabRegistry + ?Sized> {
    tabs: &'a T,
    pages: &'a VirtualPageRegistry,
}

impl<'a, T: TabRegistry + ?Sized> ContentDirectory<'a, T> {
    #[must_use]
    pub fn new(tabs: &'a T, pages: &'a VirtualPageRegistry) -> Self {
        Self { tabs, pages }
    }

    /// Resolve both title and URL in one call.
    #[must_use]
    pub fn resolve(&self, content: &ContentRef) -> ResolvedContent {
        let url = self.resolve_url(content);
        ResolvedContent {
            title: self.resolve_title(content),
            dangling: url.is_none(),
            url,
        }
    }
}

impl<T: TabRegistry + ?Sized> ContentResolver for ContentDirectory<'_, T> {
    fn resolve_title(&self, content: &ContentRef) -> String {
        match content {
            ContentRef::Tab(id) => self
                .tabs
                .tab(id)
                .map_or_else(|| MISSING_TAB_TITLE.to_owned(), |tab| tab.display_title().to_owned()),
            ContentRef::VirtualPage(id) => self
                .pages
                .lookup(id)
                .map_or_else(|| MISSING_PAGE_TITLE.to_owned(), |page| page.title.clone()),
        }
    }

    fn resolve_url(&self, content: &ContentRef) -> Option<String> {
        match content {
            ContentRef::Tab(id) => self.tabs.tab(id).map(|tab| tab.url),
            ContentRef::VirtualPage(id) => self.pages.lookup(id).map(|page| page.url.clone()),
        }
    }
}

/// Display-ready view of one binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedContent {
    pub title: String,
    pub url: Option<String>,
    /// The reference no longer resolves and `title` is a placeholder.
    pub dangling: bool,
}
