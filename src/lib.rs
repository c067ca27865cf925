//! Ember Coordinator - build lifecycle coordination for Ember CLI frontends
//!
//! This library drives the Ember CLI build tool on behalf of a host server:
//! it gates builds on installed tooling, runs one-shot and watch-mode
//! builds, and tracks build completion across processes through a lock file
//! and an error file.

pub mod assets;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod dependency;
pub mod error;
pub mod paths;
pub mod process;
pub mod registry;
pub mod signals;
pub mod verbosity;
pub mod version;

pub use assets::AssetPipeline;
pub use config::{AppOptions, BuildEnvironment, Configuration, Validate, ValidationResult};
pub use coordinator::{BuildCoordinator, HostContext, LifecycleState, WaitOutcome};
pub use dependency::{DependencyChecker, DependencyLayout, DependencyRequirement};
pub use error::{Error, Result};
pub use paths::{PathSet, PathSetInputs};
pub use process::{Invocation, ProcessHandle, ProcessRunner, ShellRunner};
pub use registry::AppRegistry;
pub use signals::BuildSignals;
