//! Build tool command lines and process environment.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::BuildEnvironment;

/// Variable carrying the host environment name to the build tool.
pub const HOST_ENV_VAR: &str = "HOST_ENV";

/// Quotes `value` for `sh` unless it only contains safe characters.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:@,%".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r#"'\''"#))
    }
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// `ember build` invocation.
#[derive(Debug, Clone)]
pub struct BuildCommand<'a> {
    pub ember: &'a Path,
    pub environment: BuildEnvironment,
    pub output_path: &'a Path,
    /// Receives the build tool's stderr.
    pub error_file: &'a Path,
    pub watch: bool,
    pub watcher: Option<&'a str>,
    /// `(tee, log)`: also append stdout to `log` through `tee -a`.
    pub log_pipe: Option<(&'a Path, &'a Path)>,
}

impl BuildCommand<'_> {
    pub fn render(&self) -> String {
        let mut parts = vec![quote_path(self.ember), "build".to_string()];

        if self.watch {
            parts.push("--watch".to_string());
            if let Some(watcher) = self.watcher {
                parts.push("--watcher".to_string());
                parts.push(shell_quote(watcher));
            }
        }

        parts.push("--environment".to_string());
        parts.push(self.environment.as_str().to_string());
        parts.push("--output-path".to_string());
        parts.push(quote_path(self.output_path));
        parts.push(format!("2> {}", quote_path(self.error_file)));

        if let Some((tee, log)) = self.log_pipe {
            parts.push(format!("| {} -a {}", quote_path(tee), quote_path(log)));
        }

        parts.join(" ")
    }
}

/// Environment overrides for every build tool invocation.
pub fn build_env(
    host_environment: &str,
    excluded_deps: &[String],
    gemfile: &Path,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(HOST_ENV_VAR.to_string(), host_environment.to_string());
    env.insert("DISABLE_FINGERPRINTING".to_string(), "true".to_string());
    env.insert("EXCLUDE_EMBER_ASSETS".to_string(), excluded_deps.join(","));
    if gemfile.exists() {
        env.insert(
            "BUNDLE_GEMFILE".to_string(),
            gemfile.to_string_lossy().into_owned(),
        );
    }
    env
}
