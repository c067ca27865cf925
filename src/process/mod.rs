//! External command execution.
//!
//! Commands run either blocking, where failure is fatal to the host, or
//! detached, returning a [`ProcessHandle`] that can only be interrupted.

mod shell;

pub use shell::{ChildHandle, ShellRunner};

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Result;

/// A command line plus the environment it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Shell command line.
    pub command: String,
    /// Variables set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Directory the command runs in.
    pub working_dir: PathBuf,
    /// Discard the command's output instead of passing it through.
    pub silenced: bool,
}

impl Invocation {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            env: BTreeMap::new(),
            working_dir: working_dir.into(),
            silenced: false,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn silenced(mut self, silenced: bool) -> Self {
        self.silenced = silenced;
        self
    }
}

/// Handle to a detached background process.
pub trait ProcessHandle: Send {
    /// OS process id.
    fn id(&self) -> u32;

    /// Sends one interrupt signal. Never escalates.
    fn interrupt(&mut self) -> Result<()>;
}

/// Runs commands for the coordinator.
pub trait ProcessRunner: Send + Sync {
    /// Runs `invocation` to completion.
    ///
    /// Implementations treat start failures and non-zero exits as fatal.
    fn run_blocking(&self, invocation: &Invocation) -> Result<()>;

    /// Starts `invocation` in the background without waiting for it.
    fn spawn_detached(&self, invocation: &Invocation) -> Result<Box<dyn ProcessHandle>>;
}
