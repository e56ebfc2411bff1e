//! Session save/restore behavior across simulated restarts.
//!
//! Run:
//!   cargo test -p fw-runtime --test session_persistence

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use fw_layout::{
    ContentRef, MISSING_PAGE_TITLE, PaneId, PaneTree, SplitAxis, TabDescriptor, TabId,
};
use fw_runtime::{
    DanglingPagePolicy, MemoryStorage, SessionConfig, StorageBackend, StorageError, StorageResult,
    WorkspaceMode, WorkspaceSession, WorkspaceStore,
};
use proptest::prelude::*;
use tracing_subscriber::layer::SubscriberExt;

// ============================================================================
// Test Infrastructure
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    message: String,
}

struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.0,
        });
    }
}

fn capture_events<T>(run: impl FnOnce() -> T) -> (T, Vec<CapturedEvent>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(EventCapture {
        events: events.clone(),
    });
    let result = tracing::subscriber::with_default(subscriber, run);
    let captured = events.lock().unwrap().clone();
    (result, captured)
}

/// Backend whose writes always fail.
#[derive(Debug, Default)]
struct FailingStorage {
    attempts: usize,
}

impl StorageBackend for FailingStorage {
    fn name(&self) -> &str {
        "failing"
    }

    fn load(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    fn save(&mut self, _key: &str, _value: &str) -> StorageResult<()> {
        self.attempts += 1;
        Err(StorageError::Unavailable {
            backend: "failing".into(),
            message: "quota exceeded".into(),
        })
    }

    fn remove(&mut self, _key: &str) -> StorageResult<()> {
        Ok(())
    }
}

fn session_with(
    storage: MemoryStorage,
    config: SessionConfig,
) -> WorkspaceSession<MemoryStorage> {
    let store = WorkspaceStore::new(storage, config.storage_key.clone());
    WorkspaceSession::restore(store, config)
}

fn restart(
    session: WorkspaceSession<MemoryStorage>,
    config: SessionConfig,
) -> WorkspaceSession<MemoryStorage> {
    session_with(session.into_store().into_backend(), config)
}

fn root(session: &WorkspaceSession<MemoryStorage>) -> PaneId {
    session.tree().expect("tree exists").sections()[0]
}

fn kids(session: &WorkspaceSession<MemoryStorage>, pane: PaneId) -> Vec<PaneId> {
    session.tree().unwrap().node(pane).unwrap().children.clone()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn toggle_roundtrip_preserves_tree_and_active_pane() {
    let mut session = session_with(MemoryStorage::new(), SessionConfig::default());
    assert_eq!(session.toggle_mode(), WorkspaceMode::Enabled);

    let root = root(&session);
    let _ = session.split(root, SplitAxis::Vertical);
    let children = kids(&session, root);
    let _ = session.split(children[1], SplitAxis::Horizontal);
    let _ = session.assign_tab(children[0], TabId::new("tab-1"));
    let _ = session.set_active(kids(&session, children[1])[0]);

    let before = session.tree().unwrap().clone();
    assert_eq!(session.toggle_mode(), WorkspaceMode::Disabled);
    assert_eq!(session.toggle_mode(), WorkspaceMode::Enabled);
    let after = session.tree().unwrap();
    assert_eq!(after, &before);
    assert_eq!(after.active_pane(), before.active_pane());
    assert_eq!(after.state_hash(), before.state_hash());
}

#[test]
fn restart_restores_mode_tree_and_active_pane() {
    let config = SessionConfig::default();
    let mut session = session_with(MemoryStorage::new(), config.clone());
    let _ = session.toggle_mode();
    let root = root(&session);
    let _ = session.split(root, SplitAxis::Horizontal);
    let _ = session.assign_tab(kids(&session, root)[1], TabId::new("tab-9"));
    let _ = session.set_active(kids(&session, root)[1]);
    let section = session.add_section().unwrap();
    let expected = session.tree().unwrap().clone();

    let restored = restart(session, config);
    assert_eq!(restored.mode(), WorkspaceMode::Enabled);
    assert_eq!(restored.tree(), Some(&expected));
    assert!(restored.tree().unwrap().contains(section));
    assert_eq!(restored.persist_failures(), 0);
}

#[test]
fn restored_tree_never_reuses_retired_ids() {
    let config = SessionConfig::default();
    let mut session = session_with(MemoryStorage::new(), config.clone());
    let _ = session.toggle_mode();
    let root = root(&session);
    let _ = session.split(root, SplitAxis::Vertical);
    let retired = kids(&session, root);
    let _ = session.close(retired[0]);

    let mut session = restart(session, config);
    let _ = session.split(root, SplitAxis::Vertical);
    for fresh in kids(&session, root) {
        assert!(!retired.contains(&fresh));
    }
}

#[test]
fn failed_writes_keep_memory_state_and_are_counted() {
    let store = WorkspaceStore::new(FailingStorage::default(), "ws");
    let ((session, tree_leaves), events) = capture_events(|| {
        let mut session = WorkspaceSession::restore(store, SessionConfig::default());
        let _ = session.toggle_mode();
        let root = session.tree().unwrap().sections()[0];
        assert!(session.split(root, SplitAxis::Vertical).is_applied());
        let leaves = session.tree().unwrap().leaves();
        (session, leaves)
    });

    assert_eq!(tree_leaves.len(), 2);
    assert_eq!(session.tree().unwrap().leaves(), tree_leaves);
    assert_eq!(session.persist_failures(), 2);
    assert_eq!(session.store().backend().attempts, 2);
    assert!(session.last_persist_error().unwrap().contains("quota exceeded"));
    assert!(events.iter().any(|event| {
        event.level == tracing::Level::WARN && event.message.contains("failed to persist")
    }));
}

#[test]
fn unreadable_state_starts_fresh_with_warning() {
    let mut storage = MemoryStorage::new();
    storage
        .save("fieldwatch.workspace", "{\"enabled\": true, \"tree\": 12}")
        .unwrap();

    let (session, events) =
        capture_events(|| session_with(storage, SessionConfig::default()));
    assert_eq!(session.mode(), WorkspaceMode::Disabled);
    assert!(session.tree().is_none());
    assert!(
        events
            .iter()
            .any(|event| event.level == tracing::Level::WARN)
    );
}

#[test]
fn enabled_document_without_tree_gets_fresh_tree() {
    let config = SessionConfig {
        section_columns: 3,
        ..SessionConfig::default()
    };
    let mut storage = MemoryStorage::new();
    storage.save(&config.storage_key, "{\"enabled\": true}").unwrap();

    let (mut session, events) = capture_events(|| session_with(storage, config.clone()));
    assert_eq!(session.mode(), WorkspaceMode::Enabled);
    let tree = session.tree().expect("tree created on restore");
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.section_columns(), 3);
    assert!(
        events
            .iter()
            .any(|event| event.level == tracing::Level::WARN)
    );

    let root = root(&session);
    assert!(session.split(root, SplitAxis::Vertical).is_applied());

    // The repaired document was written back.
    let restored = restart(session, config);
    assert_eq!(restored.mode(), WorkspaceMode::Enabled);
    assert_eq!(restored.tree().unwrap().leaves().len(), 2);
}

#[test]
fn disabled_document_without_tree_stays_empty() {
    let mut storage = MemoryStorage::new();
    storage
        .save("fieldwatch.workspace", "{\"enabled\": false}")
        .unwrap();

    let session = session_with(storage, SessionConfig::default());
    assert_eq!(session.mode(), WorkspaceMode::Disabled);
    assert!(session.tree().is_none());
}

#[test]
fn dangling_virtual_pages_are_purged_on_restore_by_default() {
    let config = SessionConfig::default();
    let mut session = session_with(MemoryStorage::new(), config.clone());
    let _ = session.toggle_mode();
    let root = root(&session);
    let _ = session.split(root, SplitAxis::Vertical);
    let children = kids(&session, root);
    let _ = session.open_page(children[0], "/trend/7", "Trend 7");
    let _ = session.assign_tab(children[1], TabId::new("tab-2"));

    let restored = restart(session, config.clone());
    let tree = restored.tree().unwrap();
    assert!(tree.node(children[0]).unwrap().content.is_none());
    assert_eq!(
        tree.node(children[1]).unwrap().content,
        Some(ContentRef::tab("tab-2"))
    );

    // The purge was written back.
    let reloaded = restart(restored, config);
    assert_eq!(reloaded.tree().unwrap().bindings().len(), 1);
}

#[test]
fn dangling_virtual_pages_resolve_to_placeholder_when_kept() {
    let config = SessionConfig {
        dangling_virtual_pages: DanglingPagePolicy::Keep,
        ..SessionConfig::default()
    };
    let mut session = session_with(MemoryStorage::new(), config.clone());
    let _ = session.toggle_mode();
    let root = root(&session);
    let _ = session.open_page(root, "/trend/7", "Trend 7");

    let restored = restart(session, config);
    let content = restored
        .tree()
        .unwrap()
        .node(root)
        .unwrap()
        .content
        .clone()
        .expect("binding kept");
    assert!(content.is_virtual());

    let tabs: BTreeMap<TabId, TabDescriptor> = BTreeMap::new();
    let resolved = restored.resolve(&content, &tabs);
    assert_eq!(resolved.title, MISSING_PAGE_TITLE);
    assert!(resolved.url.is_none());
    assert!(resolved.dangling);
}

#[test]
fn config_columns_apply_to_new_trees_only() {
    let config = SessionConfig {
        section_columns: 3,
        ..SessionConfig::default()
    };
    let mut session = session_with(MemoryStorage::new(), config);
    let _ = session.toggle_mode();
    assert_eq!(session.tree().unwrap().section_columns(), 3);
    assert!(session.set_section_columns(1).is_applied());

    let restored = restart(session, SessionConfig::default());
    assert_eq!(restored.tree().unwrap().section_columns(), 1);
}

#[cfg(feature = "file-storage")]
#[test]
fn file_backed_session_survives_restart() {
    use fw_runtime::FileStorage;

    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig::default();

    let mut session = WorkspaceSession::restore(
        WorkspaceStore::new(FileStorage::new(dir.path()), config.storage_key.clone()),
        config.clone(),
    );
    let _ = session.toggle_mode();
    let root = session.tree().unwrap().sections()[0];
    let _ = session.split(root, SplitAxis::Horizontal);
    let expected = session.tree().unwrap().clone();
    drop(session);

    assert!(dir.path().join("fieldwatch.workspace.json").exists());
    let restored = WorkspaceSession::restore(
        WorkspaceStore::new(FileStorage::new(dir.path()), config.storage_key.clone()),
        config,
    );
    assert_eq!(restored.tree(), Some(&expected));
}

// ============================================================================
// Property tests
// ============================================================================

#[derive(Debug, Clone)]
enum Edit {
    Split(usize, bool),
    Close(usize),
    Tab(usize, u8),
    Focus(usize),
    AddSection,
    Toggle,
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (any::<usize>(), any::<bool>()).prop_map(|(i, v)| Edit::Split(i, v)),
        2 => any::<usize>().prop_map(Edit::Close),
        2 => (any::<usize>(), 0u8..5).prop_map(|(i, t)| Edit::Tab(i, t)),
        1 => any::<usize>().prop_map(Edit::Focus),
        1 => Just(Edit::AddSection),
        1 => Just(Edit::Toggle),
    ]
}

fn pick(tree: &PaneTree, index: usize) -> PaneId {
    let ids: Vec<PaneId> = tree.nodes().map(|node| node.id).collect();
    ids[index % ids.len()]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn persisted_state_matches_memory_after_every_edit(
        edits in proptest::collection::vec(edit_strategy(), 1..40),
    ) {
        let config = SessionConfig::default();
        let mut session = session_with(MemoryStorage::new(), config.clone());
        let _ = session.toggle_mode();

        for edit in edits {
            let tree = session.tree().unwrap();
            let _ = match edit {
                Edit::Split(i, vertical) => {
                    let target = pick(tree, i);
                    let axis = if vertical { SplitAxis::Vertical } else { SplitAxis::Horizontal };
                    session.split(target, axis)
                }
                Edit::Close(i) => {
                    let target = pick(tree, i);
                    session.close(target)
                }
                Edit::Tab(i, t) => {
                    let target = pick(tree, i);
                    session.assign_tab(target, TabId::new(format!("tab-{t}")))
                }
                Edit::Focus(i) => {
                    let target = pick(tree, i);
                    session.set_active(target)
                }
                Edit::AddSection => {
                    let _ = session.add_section();
                    continue;
                }
                Edit::Toggle => {
                    let _ = session.toggle_mode();
                    continue;
                }
            };
            let stored = session.store().load().unwrap().unwrap();
            prop_assert_eq!(stored, session.snapshot());
        }

        let expected_mode = session.mode();
        let expected_tree = session.tree().cloned();
        let restored = restart(session, config);
        prop_assert_eq!(restored.mode(), expected_mode);
        prop_assert_eq!(restored.tree().cloned(), expected_tree);
    }
}
