//! Coordinators owned by a host process.
//!
//! The registry is the host's shutdown hook: [`AppRegistry::shutdown`]
//! stops every watch build it owns. Dropping the registry does the same
//! through each coordinator's `Drop`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::assets::AssetPipeline;
use crate::config::Configuration;
use crate::coordinator::{BuildCoordinator, HostContext, WaitOutcome};
use crate::error::{Error, Result};
use crate::process::ProcessRunner;

pub struct AppRegistry {
    configuration: Configuration,
    host: HostContext,
    runner: Arc<dyn ProcessRunner>,
    pipeline: Arc<AssetPipeline>,
    apps: BTreeMap<String, BuildCoordinator>,
}

impl AppRegistry {
    pub fn new(
        configuration: Configuration,
        host: HostContext,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            configuration,
            host,
            runner,
            pipeline: Arc::new(AssetPipeline::new()),
            apps: BTreeMap::new(),
        }
    }

    /// Registers every app named in the configuration.
    pub fn with_configured_apps(mut self) -> Self {
        let names: Vec<String> = self.configuration.apps.keys().cloned().collect();
        for name in names {
            self.add(name);
        }
        self
    }

    pub fn pipeline(&self) -> &Arc<AssetPipeline> {
        &self.pipeline
    }

    /// Adds a coordinator for `name`, returning the existing one if present.
    pub fn add(&mut self, name: impl Into<String>) -> &mut BuildCoordinator {
        let name = name.into();
        let Self {
            configuration,
            host,
            runner,
            pipeline,
            apps,
        } = self;

        apps.entry(name.clone()).or_insert_with(|| {
            tracing::debug!(app = %name, "registered app");
            BuildCoordinator::for_app(name, configuration, host, runner.clone(), pipeline.clone())
        })
    }

    pub fn get(&self, name: &str) -> Option<&BuildCoordinator> {
        self.apps.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut BuildCoordinator> {
        self.apps.get_mut(name)
    }

    /// Looks up `name`, failing with a configuration error if unknown.
    pub fn require_mut(&mut self, name: &str) -> Result<&mut BuildCoordinator> {
        self.apps
            .get_mut(name)
            .ok_or_else(|| Error::Config(format!("unknown app '{}'", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Compiles every app, stopping at the first failure.
    pub fn compile_all(&mut self) -> Result<()> {
        for coordinator in self.apps.values_mut() {
            coordinator.compile()?;
        }
        Ok(())
    }

    /// Starts every app in watch mode.
    pub fn run_all(&mut self) -> Result<()> {
        for coordinator in self.apps.values_mut() {
            coordinator.run()?;
        }
        Ok(())
    }

    /// Waits for every app's first build, in name order.
    pub fn wait_all(&self) -> Result<Vec<(String, WaitOutcome)>> {
        self.apps
            .iter()
            .map(|(name, coordinator)| Ok((name.clone(), coordinator.wait()?)))
            .collect()
    }

    /// Stops every running watch build.
    ///
    /// Keeps going after a failure and returns the first error.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut first_error = None;
        for coordinator in self.apps.values_mut() {
            if let Err(e) = coordinator.stop() {
                tracing::error!(app = %coordinator.name(), error = %e, "failed to stop build");
                first_error.get_or_insert(e);
            }
        }
        tracing::info!(apps = self.apps.len(), "shut down build coordinators");
        first_error.map_or(Ok(()), Err)
    }
}
