use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use fw_layout::{
    ContentRef, PaneEditOutcome, PaneId, ResolvedContent, SplitAxis, TabDescriptor, TabId,
    WorkspaceSnapshot,
};
use fw_runtime::{FileStorage, SessionConfig, WorkspaceMode, WorkspaceSession, WorkspaceStore};

use crate::error::{Result, ShellError};

#[derive(Debug, Parser)]
#[command(
    name = "fieldwatch-shell",
    about = "Inspect and edit the persisted FieldWatch workspace layout",
    version
)]
pub struct Cli {
    /// Directory holding the persisted workspace document.
    #[arg(long, global = true, default_value = ".fieldwatch", value_name = "DIR")]
    pub state_dir: PathBuf,

    /// Session config file (`.toml` or `.json`).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON array of tab descriptors used to resolve titles in `show`.
    #[arg(long, global = true, value_name = "FILE")]
    pub tabs: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AxisArg {
    Horizontal,
    Vertical,
}

impl From<AxisArg> for SplitAxis {
    fn from(axis: AxisArg) -> Self {
        match axis {
            AxisArg::Horizontal => Self::Horizontal,
            AxisArg::Vertical => Self::Vertical,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the workspace document and resolved bindings as JSON.
    Show,

    /// Enable or disable the workspace view.
    Toggle,

    /// Split a pane along an axis.
    Split { pane: PaneId, axis: AxisArg },

    /// Close a pane and its subtree.
    Close { pane: PaneId },

    /// Bind a tab to a pane.
    #[command(name = "assign-tab")]
    AssignTab { pane: PaneId, tab: String },

    /// Open a virtual page in a pane and print the new binding.
    ///
    /// Pages are not persisted; with the default `purge` policy the binding
    /// is cleared the next time the workspace is loaded.
    #[command(name = "open-page")]
    OpenPage {
        pane: PaneId,
        url: String,
        title: String,
    },

    /// Clear whatever a pane is bound to.
    Clear { pane: PaneId },

    /// Make a pane the active one.
    Focus { pane: PaneId },

    /// Append a top-level section.
    #[command(name = "add-section")]
    AddSection,

    /// Set the grid width for top-level sections.
    Columns { n: u16 },

    /// Replace the layout with a single empty pane.
    Reset,
}

#[derive(Debug, Serialize)]
struct ShowReport {
    mode: WorkspaceMode,
    snapshot: WorkspaceSnapshot,
    bindings: Vec<BindingView>,
}

#[derive(Debug, Serialize)]
struct BindingView {
    pane_id: PaneId,
    content: ContentRef,
    #[serde(flatten)]
    resolved: ResolvedContent,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    run(cli, &mut stdout.lock())
}

pub fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let store = WorkspaceStore::new(
        FileStorage::new(&cli.state_dir),
        config.storage_key.clone(),
    );
    let mut session = WorkspaceSession::restore(store, config);

    let outcome = match cli.command {
        Commands::Show => {
            let tabs = load_tabs(cli.tabs.as_deref())?;
            let report = show_report(&session, &tabs);
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
            return Ok(());
        }
        Commands::Toggle => {
            let mode = session.toggle_mode();
            writeln!(out, "workspace {mode}")?;
            return check_persisted(&session);
        }
        Commands::AddSection => {
            match session.add_section() {
                Some(pane_id) => writeln!(out, "added section {pane_id}")?,
                None => writeln!(out, "no-op: workspace has not been enabled yet")?,
            }
            return check_persisted(&session);
        }
        Commands::Split { pane, axis } => session.split(pane, axis.into()),
        Commands::Close { pane } => session.close(pane),
        Commands::AssignTab { pane, tab } => session.assign_tab(pane, TabId::new(tab)),
        Commands::OpenPage { pane, url, title } => {
            let outcome = session.open_page(pane, url, title);
            report_outcome(out, &outcome)?;
            if outcome.is_applied()
                && let Some(view) = binding_view(&session, pane, &BTreeMap::new())
            {
                serde_json::to_writer(&mut *out, &view)?;
                writeln!(out)?;
            }
            return check_persisted(&session);
        }
        Commands::Clear { pane } => session.clear_content(pane),
        Commands::Focus { pane } => session.set_active(pane),
        Commands::Columns { n } => session.set_section_columns(n),
        Commands::Reset => session.reset(),
    };

    report_outcome(out, &outcome)?;
    check_persisted(&session)
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    if !path.exists() {
        return Err(ShellError::MissingPath {
            path: path.to_path_buf(),
        });
    }
    Ok(SessionConfig::from_file(path)?.validated()?)
}

fn load_tabs(path: Option<&Path>) -> Result<BTreeMap<TabId, TabDescriptor>> {
    let Some(path) = path else {
        return Ok(BTreeMap::new());
    };
    if !path.exists() {
        return Err(ShellError::MissingPath {
            path: path.to_path_buf(),
        });
    }
    let raw = std::fs::read_to_string(path)?;
    let tabs: Vec<TabDescriptor> = serde_json::from_str(&raw)?;
    Ok(tabs.into_iter().map(|tab| (tab.id.clone(), tab)).collect())
}

fn show_report(
    session: &WorkspaceSession<FileStorage>,
    tabs: &BTreeMap<TabId, TabDescriptor>,
) -> ShowReport {
    let bindings = session
        .tree()
        .map(|tree| {
            tree.bindings()
                .into_iter()
                .filter_map(|(pane_id, _)| binding_view(session, pane_id, tabs))
                .collect()
        })
        .unwrap_or_default();
    ShowReport {
        mode: session.mode(),
        snapshot: session.snapshot(),
        bindings,
    }
}

fn binding_view(
    session: &WorkspaceSession<FileStorage>,
    pane_id: PaneId,
    tabs: &BTreeMap<TabId, TabDescriptor>,
) -> Option<BindingView> {
    let content = session.tree()?.node(pane_id)?.content.as_ref()?;
    Some(BindingView {
        pane_id,
        content: content.clone(),
        resolved: session.resolve(content, tabs),
    })
}

fn report_outcome(out: &mut impl Write, outcome: &PaneEditOutcome) -> Result<()> {
    tracing::debug!(%outcome, "command finished");
    writeln!(out, "{outcome}")?;
    Ok(())
}

/// A shell invocation is short-lived, so a lost write is surfaced as an
/// error instead of only being logged.
fn check_persisted(session: &WorkspaceSession<FileStorage>) -> Result<()> {
    match session.last_persist_error() {
        Some(message) => Err(ShellError::PersistFailed {
            message: message.to_owned(),
        }),
        None => Ok(()),
    }
}
