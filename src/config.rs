//! Coordinator configuration and validation.
//!
//! Global defaults apply to every application; per-app [`AppOptions`]
//! override them. Configuration is loaded from TOML or YAML.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Watcher backends understood by the Ember CLI build tool.
pub const KNOWN_WATCHERS: &[&str] = &["polling", "watchman", "node", "events"];

/// Environment the build tool compiles for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildEnvironment {
    Development,
    Production,
}

impl BuildEnvironment {
    /// Maps a host environment name onto a build environment.
    ///
    /// Anything other than `production` builds for development.
    pub fn from_host(host_env: &str) -> Self {
        if host_env == "production" {
            Self::Production
        } else {
            Self::Development
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Per-application overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppOptions {
    /// Root of the Ember application, absolute or relative to the host root.
    pub path: Option<PathBuf>,
    /// Seconds to wait for the first watch build.
    pub build_timeout: Option<u64>,
    /// Watcher backend passed to `ember build --watch`.
    pub watcher: Option<String>,
    /// Dependencies the build tool should leave out of the bundle.
    pub exclude_ember_deps: Vec<String>,
    /// Name of the Ember application, overriding package.json.
    pub name: Option<String>,
    pub tee_path: Option<PathBuf>,
    pub bower_path: Option<PathBuf>,
    pub npm_path: Option<PathBuf>,
    pub bundler_path: Option<PathBuf>,
}

/// Global coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Default seconds to wait for the first watch build.
    #[serde(default = "default_build_timeout")]
    pub build_timeout: u64,

    /// Default watcher backend.
    #[serde(default)]
    pub watcher: Option<String>,

    #[serde(default = "default_tee_path")]
    pub tee_path: Option<PathBuf>,

    #[serde(default = "default_bower_path")]
    pub bower_path: PathBuf,

    #[serde(default = "default_npm_path")]
    pub npm_path: PathBuf,

    #[serde(default = "default_bundler_path")]
    pub bundler_path: PathBuf,

    /// Per-app overrides keyed by app name.
    #[serde(default)]
    pub apps: BTreeMap<String, AppOptions>,
}

fn default_build_timeout() -> u64 {
    5
}

fn default_tee_path() -> Option<PathBuf> {
    which::which("tee").ok()
}

fn default_bower_path() -> PathBuf {
    lookup_executable("bower")
}

fn default_npm_path() -> PathBuf {
    lookup_executable("npm")
}

fn default_bundler_path() -> PathBuf {
    lookup_executable("bundle")
}

/// Finds `name` on `PATH`, falling back to the bare program name.
fn lookup_executable(name: &str) -> PathBuf {
    which::which(name).unwrap_or_else(|_| PathBuf::from(name))
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            build_timeout: default_build_timeout(),
            watcher: None,
            tee_path: default_tee_path(),
            bower_path: default_bower_path(),
            npm_path: default_npm_path(),
            bundler_path: default_bundler_path(),
            apps: BTreeMap::new(),
        }
    }
}

impl Configuration {
    /// Loads configuration from a `.toml`, `.yml` or `.yaml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            other => Err(Error::Config(format!(
                "unsupported configuration format '{}' for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Returns the overrides registered for `app`, or empty ones.
    pub fn app_options(&self, app: &str) -> AppOptions {
        self.apps.get(app).cloned().unwrap_or_default()
    }

    /// Registers overrides for an app.
    pub fn with_app(mut self, name: impl Into<String>, options: AppOptions) -> Self {
        self.apps.insert(name.into(), options);
        self
    }

    /// Build timeout for `options`, falling back to the global default.
    pub fn build_timeout_for(&self, options: &AppOptions) -> Duration {
        Duration::from_secs(options.build_timeout.unwrap_or(self.build_timeout))
    }

    /// Watcher backend for `options`, falling back to the global default.
    pub fn watcher_for<'a>(&'a self, options: &'a AppOptions) -> Option<&'a str> {
        options.watcher.as_deref().or(self.watcher.as_deref())
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

fn validate_timeout(result: &mut ValidationResult, scope: &str, seconds: u64) {
    if seconds == 0 {
        result.add_error(format!("{}: build_timeout must be at least 1 second", scope));
    } else if seconds > 600 {
        result.add_warning(format!(
            "{}: build_timeout over 10 minutes may hide a stuck build",
            scope
        ));
    }
}

fn validate_watcher(result: &mut ValidationResult, scope: &str, watcher: Option<&str>) {
    if let Some(watcher) = watcher {
        if !KNOWN_WATCHERS.contains(&watcher) {
            result.add_warning(format!("{}: unknown watcher '{}'", scope, watcher));
        }
    }
}

impl Validate for AppOptions {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Some(timeout) = self.build_timeout {
            validate_timeout(&mut result, "app", timeout);
        }
        validate_watcher(&mut result, "app", self.watcher.as_deref());

        if self.exclude_ember_deps.iter().any(|d| d.trim().is_empty()) {
            result.add_warning("app: exclude_ember_deps contains an empty name");
        }

        result
    }
}

impl Validate for Configuration {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        validate_timeout(&mut result, "global", self.build_timeout);
        validate_watcher(&mut result, "global", self.watcher.as_deref());

        for (name, options) in &self.apps {
            if name.trim().is_empty() {
                result.add_error("app names cannot be empty");
            }
            let mut app = options.validate();
            for msg in app.errors.iter_mut().chain(app.warnings.iter_mut()) {
                *msg = msg.replacen("app:", &format!("apps.{}:", name), 1);
            }
            result.merge(app);
        }

        result
    }
}
