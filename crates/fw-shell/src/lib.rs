#![forbid(unsafe_code)]

//! `fieldwatch-shell`: a thin command-line front end over the workspace
//! session, backed by file storage.

pub mod cli;
pub mod error;
pub mod logging;

pub use cli::{Cli, Commands, run, run_from_env};
pub use error::{Result, ShellError};
