//! Pre-build validation of installed tooling and packages.
//!
//! [`DependencyChecker::check`] runs its assertions in a fixed order and
//! stops at the first failure. Every failure is an [`Error::Dependency`]
//! whose message says how to fix it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::paths::{is_executable, PathSet};
use crate::version;

/// Accepted `ember-cli` versions.
pub const EMBER_CLI_VERSIONS: &[&str] = &["~> 0.1.5", "~> 0.2.0", "~> 1.13"];

/// Accepted `ember-cli-rails-addon` versions.
pub const ADDON_VERSIONS: &[&str] = &["~> 0.0.13"];

/// Locations the checker inspects.
#[derive(Debug, Clone)]
pub struct DependencyLayout {
    pub node_modules: PathBuf,
    pub bower_components: PathBuf,
    pub bower: PathBuf,
    pub ember_cli_package_json_file: PathBuf,
    pub addon_package_json_file: PathBuf,
}

impl DependencyLayout {
    pub fn from_paths(paths: &PathSet) -> Self {
        Self {
            node_modules: paths.node_modules().to_path_buf(),
            bower_components: paths.bower_components().to_path_buf(),
            bower: paths.bower().to_path_buf(),
            ember_cli_package_json_file: paths.ember_cli_package_json_file().to_path_buf(),
            addon_package_json_file: paths.addon_package_json_file().to_path_buf(),
        }
    }
}

/// A package that must be installed at a compatible version.
#[derive(Debug, Clone)]
pub struct DependencyRequirement<'a> {
    /// Package name, used in error messages.
    pub name: &'a str,
    /// Acceptable ranges, OR-combined.
    pub versions: &'a [&'a str],
    /// Installed package manifest to read the version from.
    pub manifest: &'a Path,
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    version: Option<String>,
}

impl DependencyRequirement<'_> {
    /// Asserts the package is installed and version-compatible.
    pub fn check(&self) -> Result<()> {
        if !self.manifest.exists() {
            return Err(Error::Dependency(format!(
                "Ember CLI Rails requires `{}` version `{:?}`\n\n\
                 Please add it to your `package.json` and run\n\n    $ npm install\n",
                self.name, self.versions
            )));
        }

        let installed = read_version(self.manifest)?;

        if !version::satisfies(&installed, self.versions)? {
            return Err(Error::Dependency(format!(
                "Ember CLI Rails requires `{}` version `{:?}`\n\n\
                 You have `{}` installed.\n\n\
                 Please update your `package.json` and run\n\n    $ npm install\n",
                self.name, self.versions, installed
            )));
        }

        tracing::debug!(package = %self.name, version = %installed, "dependency satisfied");
        Ok(())
    }
}

/// Reads the `version` field of a package manifest.
///
/// A manifest without a version yields an empty string.
pub fn read_version(manifest: &Path) -> Result<String> {
    let content = std::fs::read_to_string(manifest)?;
    let parsed: PackageManifest =
        serde_json::from_str(&content).map_err(|source| Error::Manifest {
            path: manifest.to_path_buf(),
            source,
        })?;
    Ok(parsed.version.unwrap_or_default())
}

/// Validates that the build can run at all.
pub struct DependencyChecker {
    layout: DependencyLayout,
}

impl DependencyChecker {
    pub fn new(layout: DependencyLayout) -> Self {
        Self { layout }
    }

    pub fn for_paths(paths: &PathSet) -> Self {
        Self::new(DependencyLayout::from_paths(paths))
    }

    /// Runs every check in order, failing fast.
    pub fn check(&self) -> Result<()> {
        assert_directory_exists(&self.layout.node_modules)?;
        assert_directory_exists(&self.layout.bower_components)?;
        self.assert_bower_executable()?;

        DependencyRequirement {
            name: "ember-cli",
            versions: EMBER_CLI_VERSIONS,
            manifest: &self.layout.ember_cli_package_json_file,
        }
        .check()?;

        DependencyRequirement {
            name: "ember-cli-rails-addon",
            versions: ADDON_VERSIONS,
            manifest: &self.layout.addon_package_json_file,
        }
        .check()
    }

    fn assert_bower_executable(&self) -> Result<()> {
        if is_executable(&self.layout.bower) {
            return Ok(());
        }
        Err(Error::Dependency(
            "Bower is required by Ember CLI\n\nInstall it with:\n\n    $ npm install -g bower\n"
                .to_string(),
        ))
    }
}

fn assert_directory_exists(directory: &Path) -> Result<()> {
    if directory.exists() {
        return Ok(());
    }
    Err(Error::Dependency(format!(
        "Ember CLI app dependencies are not installed ({} is missing).\n\
         From your host application root please run:\n\n    \
         $ ember-coordinator install\n",
        directory.display()
    )))
}
