//! `sh -c` based process runner.

use std::os::fd::AsFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::error::{Error, Result};

use super::{Invocation, ProcessHandle, ProcessRunner};

/// Runs invocations through a POSIX shell.
///
/// The child's stderr is merged into its stdout. Silenced invocations send
/// both to the null device.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Shell binary, `sh` by default.
    shell: PathBuf,
    /// Exit the host process when a blocking command fails.
    exit_on_failure: bool,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRunner {
    /// Creates a runner that terminates the host on blocking failures.
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("sh"),
            exit_on_failure: true,
        }
    }

    /// Creates a runner that reports blocking failures as [`Error::Command`].
    pub fn returning_errors() -> Self {
        Self {
            exit_on_failure: false,
            ..Self::new()
        }
    }

    /// Uses a different shell binary.
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    fn command(&self, invocation: &Invocation) -> Result<Command> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&invocation.command)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .stdin(Stdio::null());

        if invocation.silenced {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        } else {
            let stdout = std::io::stdout().as_fd().try_clone_to_owned()?;
            cmd.stdout(Stdio::inherit()).stderr(Stdio::from(stdout));
        }

        Ok(cmd)
    }

    fn fail(&self, invocation: &Invocation, reason: String) -> Result<()> {
        tracing::error!(
            command = %invocation.command,
            working_dir = ?invocation.working_dir,
            reason = %reason,
            "command failed"
        );

        if self.exit_on_failure {
            std::process::exit(1);
        }

        Err(Error::Command {
            command: invocation.command.clone(),
            reason,
        })
    }
}

impl ProcessRunner for ShellRunner {
    fn run_blocking(&self, invocation: &Invocation) -> Result<()> {
        tracing::debug!(command = %invocation.command, "running command");

        let status = match self.command(invocation)?.status() {
            Ok(status) => status,
            Err(e) => return self.fail(invocation, format!("failed to start: {}", e)),
        };

        if !status.success() {
            return self.fail(invocation, format!("exited with {}", status));
        }
        Ok(())
    }

    fn spawn_detached(&self, invocation: &Invocation) -> Result<Box<dyn ProcessHandle>> {
        let mut cmd = self.command(invocation)?;
        // Own process group so an interrupt reaches the whole pipeline.
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| Error::Command {
            command: invocation.command.clone(),
            reason: format!("failed to spawn: {}", e),
        })?;

        tracing::info!(pid = child.id(), command = %invocation.command, "spawned background command");
        Ok(Box::new(ChildHandle::new(child, self.shell.clone())))
    }
}

/// Handle to a child started by [`ShellRunner::spawn_detached`].
#[derive(Debug)]
pub struct ChildHandle {
    pid: u32,
    shell: PathBuf,
    child: Option<Child>,
}

impl ChildHandle {
    fn new(child: Child, shell: PathBuf) -> Self {
        Self {
            pid: child.id(),
            shell,
            child: Some(child),
        }
    }

    /// Reaps the child on a background thread so it never lingers as a zombie.
    fn detach(&mut self) {
        if let Some(mut child) = self.child.take() {
            std::thread::spawn(move || {
                if let Err(e) = child.wait() {
                    tracing::warn!(error = %e, "failed to reap background command");
                }
            });
        }
    }
}

/// Sends SIGINT to process group `pgid` with the shell's `kill` builtin.
///
/// A group that no longer exists is not an error.
fn interrupt_group(shell: &Path, pgid: u32) -> Result<()> {
    let command = format!("kill -s INT -- -{}", pgid);
    let output = Command::new(shell)
        .arg("-c")
        .arg(&command)
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .output()?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("No such process") {
        tracing::debug!(pgid, "process group already exited");
        return Ok(());
    }

    Err(Error::Command {
        command,
        reason: stderr.trim().to_string(),
    })
}

impl ProcessHandle for ChildHandle {
    fn id(&self) -> u32 {
        self.pid
    }

    fn interrupt(&mut self) -> Result<()> {
        if self.child.is_none() {
            return Ok(());
        }

        interrupt_group(&self.shell, self.pid)?;
        tracing::info!(pid = self.pid, "interrupted background command");
        self.detach();
        Ok(())
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        self.detach();
    }
}
