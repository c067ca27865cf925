//! Build lifecycle of one Ember application.
//!
//! ```text
//! NotPrepared -> Prepared -> Compiled   (compile)
//!                         -> Failed     (compile, error file non-empty)
//!                         -> Running    (run)
//! ```
//!
//! `compile` and `run` prepare first. `stop` moves a running coordinator
//! back to `Prepared`. Completion of watch builds is observed through
//! [`BuildSignals`], never through the child process itself.

use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::assets::AssetPipeline;
use crate::command::{build_env, shell_quote, BuildCommand};
use crate::config::{BuildEnvironment, Configuration};
use crate::dependency::DependencyChecker;
use crate::error::{Error, Result};
use crate::paths::{PathSet, PathSetInputs};
use crate::process::{Invocation, ProcessHandle, ProcessRunner};
use crate::signals::BuildSignals;
use crate::verbosity;

/// Interval between build-status samples in [`BuildCoordinator::wait`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Extra time suggested when waiting times out.
pub const TIMEOUT_SUGGESTION_STEP: Duration = Duration::from_secs(5);

/// Lifecycle state of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotPrepared,
    Prepared,
    Compiled,
    Running,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotPrepared => "not prepared",
            Self::Prepared => "prepared",
            Self::Compiled => "compiled",
            Self::Running => "running",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How [`BuildCoordinator::wait`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The lock file is gone: the build pass completed.
    Ready,
    /// Gave up waiting. The build may still be running.
    TimedOut { suggested_timeout: Duration },
}

/// Host-level inputs shared by every app.
#[derive(Debug, Clone)]
pub struct HostContext {
    /// Host environment name.
    pub environment: String,
    /// Root of the host application.
    pub host_root: PathBuf,
    /// Directory the build tool writes apps and assets into.
    pub build_root: PathBuf,
}

impl HostContext {
    pub fn new(environment: impl Into<String>, host_root: impl Into<PathBuf>) -> Self {
        let host_root = host_root.into();
        Self {
            environment: environment.into(),
            build_root: host_root.join("tmp").join("ember-cli"),
            host_root,
        }
    }

    pub fn with_build_root(mut self, build_root: impl Into<PathBuf>) -> Self {
        self.build_root = build_root.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct AppManifest {
    name: String,
}

/// Drives the build tool for one application.
pub struct BuildCoordinator {
    paths: PathSet,
    signals: OnceLock<BuildSignals>,
    runner: Arc<dyn ProcessRunner>,
    pipeline: Arc<AssetPipeline>,
    state: LifecycleState,
    process: Option<Box<dyn ProcessHandle>>,
    ember_app_name: OnceLock<String>,
}

impl fmt::Debug for BuildCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildCoordinator")
            .field("name", &self.name())
            .field("state", &self.state)
            .field("pid", &self.process.as_ref().map(|p| p.id()))
            .finish()
    }
}

impl BuildCoordinator {
    pub fn new(
        paths: PathSet,
        runner: Arc<dyn ProcessRunner>,
        pipeline: Arc<AssetPipeline>,
    ) -> Self {
        Self {
            paths,
            signals: OnceLock::new(),
            runner,
            pipeline,
            state: LifecycleState::NotPrepared,
            process: None,
            ember_app_name: OnceLock::new(),
        }
    }

    /// Creates a coordinator for `name` using its overrides from `configuration`.
    pub fn for_app(
        name: impl Into<String>,
        configuration: &Configuration,
        host: &HostContext,
        runner: Arc<dyn ProcessRunner>,
        pipeline: Arc<AssetPipeline>,
    ) -> Self {
        let name = name.into();
        let paths = PathSet::new(PathSetInputs {
            options: configuration.app_options(&name),
            app_name: name,
            configuration: configuration.clone(),
            environment: host.environment.clone(),
            host_root: host.host_root.clone(),
            build_root: host.build_root.clone(),
        });
        Self::new(paths, runner, pipeline)
    }

    pub fn name(&self) -> &str {
        self.paths.app_name()
    }

    pub fn paths(&self) -> &PathSet {
        &self.paths
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns true while a watch-mode build process is owned.
    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    pub fn build_environment(&self) -> BuildEnvironment {
        BuildEnvironment::from_host(self.paths.environment())
    }

    /// Time [`wait`](Self::wait) allows for the first build.
    pub fn build_timeout(&self) -> Duration {
        self.paths
            .configuration()
            .build_timeout_for(self.paths.options())
    }

    pub fn signals(&self) -> Result<&BuildSignals> {
        if let Some(signals) = self.signals.get() {
            return Ok(signals);
        }
        let signals = BuildSignals::new(
            self.paths.lockfile()?,
            self.paths.build_error_file()?,
        );
        Ok(self.signals.get_or_init(|| signals))
    }

    /// Validates dependencies and readies output locations. Runs once.
    pub fn prepare(&mut self) -> Result<()> {
        if self.state != LifecycleState::NotPrepared {
            return Ok(());
        }

        DependencyChecker::for_paths(&self.paths).check()?;
        if self.signals()?.reset_error()? {
            tracing::info!(app = %self.name(), "cleared stale build error");
        }
        self.symlink_to_assets_root()?;
        self.pipeline.register_app(self.name())?;

        self.state = LifecycleState::Prepared;
        tracing::info!(app = %self.name(), "prepared");
        Ok(())
    }

    /// Builds once, blocking until the build tool exits.
    ///
    /// A compiled coordinator returns immediately without rebuilding.
    pub fn compile(&mut self) -> Result<bool> {
        match self.state {
            LifecycleState::Compiled => return Ok(true),
            LifecycleState::Running => return Err(self.invalid("compile")),
            _ => {}
        }

        self.prepare()?;
        tracing::info!(app = %self.name(), environment = %self.build_environment().as_str(), "compiling");

        let result = self
            .build_invocation(false)
            .and_then(|invocation| self.runner.run_blocking(&invocation))
            .and_then(|()| self.check_for_build_error())
            .and_then(|()| self.copy_index_html_file());

        match result {
            Ok(()) => {
                self.state = LifecycleState::Compiled;
                tracing::info!(app = %self.name(), "compiled");
                Ok(true)
            }
            Err(e) => {
                self.state = LifecycleState::Failed;
                tracing::error!(app = %self.name(), error = %e, "build failed");
                Err(e)
            }
        }
    }

    /// Starts the build tool in watch mode in the background.
    ///
    /// The lock file is created before the process starts so that
    /// [`wait`](Self::wait) blocks until the first pass completes.
    pub fn run(&mut self) -> Result<()> {
        if self.state == LifecycleState::Running {
            return Err(self.invalid("run"));
        }

        self.prepare()?;
        let signals = self.signals()?.clone();
        // A failed compile leaves its trace behind without re-preparing.
        if signals.reset_error()? {
            tracing::info!(app = %self.name(), "cleared stale build error");
        }
        signals.lock()?;

        let handle = match self
            .build_invocation(true)
            .and_then(|invocation| self.runner.spawn_detached(&invocation))
        {
            Ok(handle) => handle,
            Err(e) => {
                signals.unlock()?;
                return Err(e);
            }
        };

        tracing::info!(app = %self.name(), pid = handle.id(), "watching");
        self.process = Some(handle);
        self.state = LifecycleState::Running;

        match self.copy_index_html_file() {
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(app = %self.name(), "index not built yet, skipped copying it");
                Ok(())
            }
            other => other,
        }
    }

    /// Waits for the current build pass using the configured timeout.
    pub fn wait(&self) -> Result<WaitOutcome> {
        self.wait_for(self.build_timeout())
    }

    /// Polls the build signals until the build completes, fails, or
    /// `timeout` passes.
    ///
    /// A recorded failure is returned as [`Error::Build`] at whichever poll
    /// first sees it, even before the timeout. Timing out is not an error.
    pub fn wait_for(&self, timeout: Duration) -> Result<WaitOutcome> {
        let signals = self.signals()?;
        let started = Instant::now();

        loop {
            self.check_for_build_error()?;

            if !signals.in_progress() {
                tracing::debug!(app = %self.name(), elapsed = ?started.elapsed(), "build complete");
                return Ok(WaitOutcome::Ready);
            }

            if started.elapsed() >= timeout {
                let suggested_timeout = timeout + TIMEOUT_SUGGESTION_STEP;
                tracing::warn!(
                    app = %self.name(),
                    timeout_secs = timeout.as_secs(),
                    suggested_secs = suggested_timeout.as_secs(),
                    "Ember app {} takes more than {} seconds to compile. To prevent race \
                     conditions consider setting build_timeout = {} for this app",
                    self.name(),
                    timeout.as_secs(),
                    suggested_timeout.as_secs()
                );
                return Ok(WaitOutcome::TimedOut { suggested_timeout });
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Interrupts the watch-mode process, if any.
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut handle) = self.process.take() else {
            return Ok(());
        };

        tracing::info!(app = %self.name(), pid = handle.id(), "stopping");
        self.state = LifecycleState::Prepared;
        handle.interrupt()
    }

    /// Runs the build tool's test suite.
    pub fn run_tests(&mut self) -> Result<()> {
        self.prepare()?;
        let command = format!("{} test", shell_quote(&self.paths.ember()?.to_string_lossy()));
        self.runner.run_blocking(&self.invocation(command))
    }

    /// Installs backend, npm and bower dependencies, in that order.
    pub fn install_dependencies(&self) -> Result<()> {
        let quote = |path: &std::path::Path| shell_quote(&path.to_string_lossy());

        if self.paths.gemfile().exists() {
            let command = format!("{} install", quote(self.paths.bundler()));
            self.runner.run_blocking(&self.invocation(command))?;
        }

        let npm = quote(self.paths.npm());
        self.runner
            .run_blocking(&self.invocation(format!("{} prune && {} install", npm, npm)))?;

        let bower = quote(self.paths.bower());
        self.runner
            .run_blocking(&self.invocation(format!("{} prune && {} install", bower, bower)))
    }

    /// Logical asset paths the host should expose for this app.
    pub fn exposed_assets(&self) -> Result<Vec<String>> {
        Ok(vec![
            format!("{}/vendor", self.name()),
            format!("{}/{}", self.name(), self.ember_app_name()?),
        ])
    }

    /// Name of the Ember application, from overrides or package.json.
    pub fn ember_app_name(&self) -> Result<&str> {
        if let Some(name) = self.ember_app_name.get() {
            return Ok(name);
        }

        let name = match &self.paths.options().name {
            Some(name) => name.clone(),
            None => {
                let manifest = self.paths.package_json_file();
                let content = std::fs::read_to_string(manifest)?;
                let parsed: AppManifest =
                    serde_json::from_str(&content).map_err(|source| Error::Manifest {
                        path: manifest.to_path_buf(),
                        source,
                    })?;
                parsed.name
            }
        };
        Ok(self.ember_app_name.get_or_init(|| name))
    }

    /// Page the host serves for this app.
    pub fn index_file(&self) -> Result<PathBuf> {
        if self.build_environment().is_production() {
            Ok(self
                .paths
                .applications()?
                .join(format!("{}.html", self.name())))
        } else {
            Ok(self.paths.dist()?.join("index.html"))
        }
    }

    pub fn read_index(&self) -> Result<String> {
        Ok(std::fs::read_to_string(self.index_file()?)?)
    }

    /// `<assets>/<name>`, linked to the build output's assets.
    fn assets_path(&self) -> Result<PathBuf> {
        Ok(self.paths.assets()?.join(self.name()))
    }

    fn symlink_to_assets_root(&self) -> Result<()> {
        let link = self.assets_path()?;
        let target = self.paths.dist()?.join("assets");

        match std::os::unix::fs::symlink(&target, &link) {
            Ok(()) => {
                tracing::debug!(link = ?link, target = ?target, "linked assets");
                Ok(())
            }
            // Several host workers prepare concurrently.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn copy_index_html_file(&self) -> Result<()> {
        if !self.build_environment().is_production() {
            return Ok(());
        }
        let source = self.assets_path()?.join("index.html");
        let destination = self.index_file()?;
        std::fs::copy(&source, &destination)?;
        tracing::debug!(from = ?source, to = ?destination, "copied index");
        Ok(())
    }

    fn check_for_build_error(&self) -> Result<()> {
        match self.signals()?.error_trace()? {
            Some(trace) => Err(Error::Build {
                app: self.name().to_string(),
                trace,
            }),
            None => Ok(()),
        }
    }

    fn build_invocation(&self, watch: bool) -> Result<Invocation> {
        let log_pipe = match self.paths.tee() {
            Some(tee) => {
                let log = self.paths.log();
                if let Some(dir) = log.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                Some((tee, log))
            }
            None => None,
        };

        let command = BuildCommand {
            ember: self.paths.ember()?,
            environment: self.build_environment(),
            output_path: self.paths.dist()?,
            error_file: self.paths.build_error_file()?,
            watch,
            watcher: self
                .paths
                .configuration()
                .watcher_for(self.paths.options()),
            log_pipe,
        }
        .render();

        Ok(self
            .invocation(command)
            .silenced(verbosity::is_silenced(self.build_environment())))
    }

    fn invocation(&self, command: String) -> Invocation {
        Invocation::new(command, self.paths.root()).with_env(build_env(
            self.paths.environment(),
            &self.paths.options().exclude_ember_deps,
            self.paths.gemfile(),
        ))
    }

    fn invalid(&self, action: &'static str) -> Error {
        Error::InvalidTransition {
            action,
            state: self.state.to_string(),
        }
    }
}

impl Drop for BuildCoordinator {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, app = %self.name(), "failed to stop build on drop");
        }
    }
}
