//! Filesystem locations used while building an application.
//!
//! [`PathSet`] exposes one accessor per location. Each value is computed on
//! first access and cached for the lifetime of the instance, so a location
//! never changes once resolved even if the inputs it came from would now
//! produce something else. Working directories are created on first access.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::{AppOptions, Configuration};
use crate::error::{Error, Result};

/// Everything a [`PathSet`] resolves locations from.
#[derive(Debug, Clone)]
pub struct PathSetInputs {
    /// Name of the application.
    pub app_name: String,
    /// Per-app overrides.
    pub options: AppOptions,
    /// Global defaults for executables.
    pub configuration: Configuration,
    /// Host environment name, e.g. `development` or `production`.
    pub environment: String,
    /// Root of the host application.
    pub host_root: PathBuf,
    /// Directory the build tool writes apps and assets into.
    pub build_root: PathBuf,
}

/// Lazily resolved, memoized application locations.
#[derive(Debug)]
pub struct PathSet {
    inputs: PathSetInputs,

    root: OnceLock<PathBuf>,
    tmp: OnceLock<PathBuf>,
    log: OnceLock<PathBuf>,
    dist: OnceLock<PathBuf>,
    assets: OnceLock<PathBuf>,
    applications: OnceLock<PathBuf>,
    gemfile: OnceLock<PathBuf>,
    tests: OnceLock<PathBuf>,
    node_modules: OnceLock<PathBuf>,
    bower_components: OnceLock<PathBuf>,
    package_json_file: OnceLock<PathBuf>,
    addon_package_json_file: OnceLock<PathBuf>,
    ember_cli_package_json_file: OnceLock<PathBuf>,
    ember: OnceLock<PathBuf>,
    lockfile: OnceLock<PathBuf>,
    build_error_file: OnceLock<PathBuf>,
    tee: OnceLock<Option<PathBuf>>,
    bower: OnceLock<PathBuf>,
    npm: OnceLock<PathBuf>,
    bundler: OnceLock<PathBuf>,
}

/// Returns the cached value or computes, caches and returns it.
///
/// A failed computation leaves the cell empty.
fn cached<'a>(
    cell: &'a OnceLock<PathBuf>,
    compute: impl FnOnce() -> Result<PathBuf>,
) -> Result<&'a Path> {
    if let Some(path) = cell.get() {
        return Ok(path);
    }
    let path = compute()?;
    Ok(cell.get_or_init(|| path))
}

/// Creates `path` recursively and returns it.
fn mkpath(path: PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

/// Returns true if `path` is a regular file with any execute bit set.
pub fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

impl PathSet {
    pub fn new(inputs: PathSetInputs) -> Self {
        Self {
            inputs,
            root: OnceLock::new(),
            tmp: OnceLock::new(),
            log: OnceLock::new(),
            dist: OnceLock::new(),
            assets: OnceLock::new(),
            applications: OnceLock::new(),
            gemfile: OnceLock::new(),
            tests: OnceLock::new(),
            node_modules: OnceLock::new(),
            bower_components: OnceLock::new(),
            package_json_file: OnceLock::new(),
            addon_package_json_file: OnceLock::new(),
            ember_cli_package_json_file: OnceLock::new(),
            ember: OnceLock::new(),
            lockfile: OnceLock::new(),
            build_error_file: OnceLock::new(),
            tee: OnceLock::new(),
            bower: OnceLock::new(),
            npm: OnceLock::new(),
            bundler: OnceLock::new(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.inputs.app_name
    }

    pub fn options(&self) -> &AppOptions {
        &self.inputs.options
    }

    pub fn configuration(&self) -> &Configuration {
        &self.inputs.configuration
    }

    pub fn environment(&self) -> &str {
        &self.inputs.environment
    }

    /// Root of the Ember application.
    pub fn root(&self) -> &Path {
        self.root.get_or_init(|| {
            let root = match &self.inputs.options.path {
                Some(path) if path.is_absolute() => path.clone(),
                Some(path) => self.inputs.host_root.join(path),
                None => self.inputs.host_root.join(&self.inputs.app_name),
            };
            tracing::debug!(app = %self.inputs.app_name, root = ?root, "resolved app root");
            root
        })
    }

    /// Work directory holding the lock and error files.
    pub fn tmp(&self) -> Result<&Path> {
        cached(&self.tmp, || mkpath(self.root().join("tmp")))
    }

    pub fn log(&self) -> &Path {
        self.log.get_or_init(|| {
            self.inputs.host_root.join("log").join(format!(
                "ember-{}.{}.log",
                self.inputs.app_name, self.inputs.environment
            ))
        })
    }

    /// Output directory passed to the build tool.
    pub fn dist(&self) -> Result<&Path> {
        cached(&self.dist, || {
            mkpath(self.inputs.build_root.join("apps").join(&self.inputs.app_name))
        })
    }

    /// Shared output-assets directory.
    pub fn assets(&self) -> Result<&Path> {
        cached(&self.assets, || mkpath(self.inputs.build_root.join("assets")))
    }

    /// Directory the host serves compiled index pages from.
    pub fn applications(&self) -> Result<&Path> {
        cached(&self.applications, || {
            mkpath(self.inputs.host_root.join("public").join("_apps"))
        })
    }

    pub fn gemfile(&self) -> &Path {
        self.gemfile.get_or_init(|| self.root().join("Gemfile"))
    }

    pub fn tests(&self) -> Result<&Path> {
        cached(&self.tests, || Ok(self.dist()?.join("tests")))
    }

    pub fn node_modules(&self) -> &Path {
        self.node_modules
            .get_or_init(|| self.root().join("node_modules"))
    }

    pub fn bower_components(&self) -> &Path {
        self.bower_components
            .get_or_init(|| self.root().join("bower_components"))
    }

    pub fn package_json_file(&self) -> &Path {
        self.package_json_file
            .get_or_init(|| self.root().join("package.json"))
    }

    pub fn addon_package_json_file(&self) -> &Path {
        self.addon_package_json_file.get_or_init(|| {
            self.node_modules()
                .join("ember-cli-rails-addon")
                .join("package.json")
        })
    }

    pub fn ember_cli_package_json_file(&self) -> &Path {
        self.ember_cli_package_json_file
            .get_or_init(|| self.node_modules().join("ember-cli").join("package.json"))
    }

    /// The app-local `ember` executable.
    ///
    /// Fails unless the file exists and is executable.
    pub fn ember(&self) -> Result<&Path> {
        cached(&self.ember, || {
            let path = self.node_modules().join(".bin").join("ember");
            if !is_executable(&path) {
                return Err(Error::Dependency(format!(
                    "No local ember executable found. You should run `npm install`\n\
                     inside the {} app located at {}",
                    self.inputs.app_name,
                    self.root().display()
                )));
            }
            Ok(path)
        })
    }

    /// Marker whose existence means a build is in progress.
    pub fn lockfile(&self) -> Result<&Path> {
        cached(&self.lockfile, || Ok(self.tmp()?.join("build.lock")))
    }

    /// File the build tool writes diagnostics into when a build fails.
    pub fn build_error_file(&self) -> Result<&Path> {
        cached(&self.build_error_file, || Ok(self.tmp()?.join("error.txt")))
    }

    pub fn tee(&self) -> Option<&Path> {
        self.tee
            .get_or_init(|| {
                self.inputs
                    .options
                    .tee_path
                    .clone()
                    .or_else(|| self.inputs.configuration.tee_path.clone())
            })
            .as_deref()
    }

    pub fn bower(&self) -> &Path {
        self.bower.get_or_init(|| {
            self.inputs
                .options
                .bower_path
                .clone()
                .unwrap_or_else(|| self.inputs.configuration.bower_path.clone())
        })
    }

    pub fn npm(&self) -> &Path {
        self.npm.get_or_init(|| {
            self.inputs
                .options
                .npm_path
                .clone()
                .unwrap_or_else(|| self.inputs.configuration.npm_path.clone())
        })
    }

    pub fn bundler(&self) -> &Path {
        self.bundler.get_or_init(|| {
            self.inputs
                .options
                .bundler_path
                .clone()
                .unwrap_or_else(|| self.inputs.configuration.bundler_path.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inputs(host: &Path, options: AppOptions) -> PathSetInputs {
        PathSetInputs {
            app_name: "storefront".to_string(),
            options,
            configuration: Configuration {
                tee_path: None,
                bower_path: PathBuf::from("/usr/local/bin/bower"),
                npm_path: PathBuf::from("/usr/local/bin/npm"),
                bundler_path: PathBuf::from("/usr/local/bin/bundle"),
                ..Default::default()
            },
            environment: "development".to_string(),
            host_root: host.to_path_buf(),
            build_root: host.join("tmp").join("ember-cli"),
        }
    }

    #[test]
    fn root_defaults_to_app_name_under_host() {
        let host = TempDir::new().unwrap();
        let paths = PathSet::new(inputs(host.path(), AppOptions::default()));
        assert_eq!(paths.root(), host.path().join("storefront"));
    }

    #[test]
    fn relative_root_is_joined_onto_host() {
        let host = TempDir::new().unwrap();
        let options = AppOptions {
            path: Some(PathBuf::from("frontend/shop")),
            ..Default::default()
        };
        let paths = PathSet::new(inputs(host.path(), options));
        assert_eq!(paths.root(), host.path().join("frontend/shop"));
    }

    #[test]
    fn absolute_root_is_used_as_is() {
        let host = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let options = AppOptions {
            path: Some(elsewhere.path().to_path_buf()),
            ..Default::default()
        };
        let paths = PathSet::new(inputs(host.path(), options));
        assert_eq!(paths.root(), elsewhere.path());
    }

    #[test]
    fn working_directories_are_created_on_access() {
        let host = TempDir::new().unwrap();
        let paths = PathSet::new(inputs(host.path(), AppOptions::default()));

        let tmp = paths.tmp().unwrap().to_path_buf();
        let dist = paths.dist().unwrap().to_path_buf();
        let assets = paths.assets().unwrap().to_path_buf();
        let applications = paths.applications().unwrap().to_path_buf();

        assert!(tmp.is_dir());
        assert_eq!(dist, host.path().join("tmp/ember-cli/apps/storefront"));
        assert!(dist.is_dir());
        assert!(assets.is_dir());
        assert_eq!(applications, host.path().join("public/_apps"));
        assert!(applications.is_dir());
    }

    #[test]
    fn signal_files_live_in_tmp() {
        let host = TempDir::new().unwrap();
        let paths = PathSet::new(inputs(host.path(), AppOptions::default()));
        let tmp = host.path().join("storefront/tmp");

        assert_eq!(paths.lockfile().unwrap(), tmp.join("build.lock"));
        assert_eq!(paths.build_error_file().unwrap(), tmp.join("error.txt"));
        assert!(!tmp.join("build.lock").exists());
    }

    #[test]
    fn log_includes_app_and_environment() {
        let host = TempDir::new().unwrap();
        let paths = PathSet::new(inputs(host.path(), AppOptions::default()));
        assert_eq!(
            paths.log(),
            host.path().join("log/ember-storefront.development.log")
        );
    }

    #[test]
    fn resolved_paths_are_memoized() {
        let host = TempDir::new().unwrap();
        let paths = PathSet::new(inputs(host.path(), AppOptions::default()));

        let first = paths.tmp().unwrap().to_path_buf();
        std::fs::remove_dir_all(&first).unwrap();
        let second = paths.tmp().unwrap();

        assert_eq!(first, second);
        // Cached, so the directory is not recreated.
        assert!(!second.exists());
    }

    #[test]
    fn instances_do_not_share_cached_state() {
        let host = TempDir::new().unwrap();
        let a = PathSet::new(inputs(host.path(), AppOptions::default()));
        let b = PathSet::new(inputs(
            host.path(),
            AppOptions {
                path: Some(PathBuf::from("other")),
                ..Default::default()
            },
        ));

        assert_eq!(a.root(), host.path().join("storefront"));
        assert_eq!(b.root(), host.path().join("other"));
    }

    #[test]
    fn executables_prefer_app_overrides() {
        let host = TempDir::new().unwrap();
        let options = AppOptions {
            npm_path: Some(PathBuf::from("/opt/npm")),
            tee_path: Some(PathBuf::from("/opt/tee")),
            ..Default::default()
        };
        let paths = PathSet::new(inputs(host.path(), options));

        assert_eq!(paths.npm(), Path::new("/opt/npm"));
        assert_eq!(paths.bower(), Path::new("/usr/local/bin/bower"));
        assert_eq!(paths.bundler(), Path::new("/usr/local/bin/bundle"));
        assert_eq!(paths.tee(), Some(Path::new("/opt/tee")));
    }

    #[test]
    fn tee_is_optional() {
        let host = TempDir::new().unwrap();
        let paths = PathSet::new(inputs(host.path(), AppOptions::default()));
        assert_eq!(paths.tee(), None);
    }

    #[test]
    fn ember_requires_an_executable() {
        let host = TempDir::new().unwrap();
        let paths = PathSet::new(inputs(host.path(), AppOptions::default()));

        assert!(matches!(paths.ember(), Err(Error::Dependency(_))));

        let bin = host.path().join("storefront/node_modules/.bin");
        std::fs::create_dir_all(&bin).unwrap();
        let ember = bin.join("ember");
        std::fs::write(&ember, "#!/bin/sh\n").unwrap();
        assert!(paths.ember().is_err(), "not executable yet");

        std::fs::set_permissions(&ember, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(paths.ember().unwrap(), ember);
    }

    #[test]
    fn package_manifests_live_under_node_modules() {
        let host = TempDir::new().unwrap();
        let paths = PathSet::new(inputs(host.path(), AppOptions::default()));
        let modules = host.path().join("storefront/node_modules");

        assert_eq!(
            paths.ember_cli_package_json_file(),
            modules.join("ember-cli/package.json")
        );
        assert_eq!(
            paths.addon_package_json_file(),
            modules.join("ember-cli-rails-addon/package.json")
        );
        assert_eq!(
            paths.package_json_file(),
            host.path().join("storefront/package.json")
        );
    }
}
