//! Build output verbosity.
//!
//! Setting `EMBER_CLI_VERBOSE` to any value shows build tool output for every
//! environment. When unset, output is shown for production builds and
//! silenced otherwise. The variable is read once per process.

use std::sync::OnceLock;

use crate::config::BuildEnvironment;

/// Name of the verbosity override variable.
pub const VERBOSE_VAR: &str = "EMBER_CLI_VERBOSE";

/// Override loaded once at first use.
static VERBOSE_OVERRIDE: OnceLock<bool> = OnceLock::new();

/// Returns true if the override variable is set, whatever its value.
pub fn override_from_env() -> bool {
    std::env::var_os(VERBOSE_VAR).is_some()
}

/// Gets the process-wide override.
pub fn verbose_override() -> bool {
    *VERBOSE_OVERRIDE.get_or_init(override_from_env)
}

/// Decides whether output is shown for `environment`.
pub fn resolve(verbose_override: bool, environment: BuildEnvironment) -> bool {
    verbose_override || environment.is_production()
}

/// Returns true if build tool output should be silenced.
pub fn is_silenced(environment: BuildEnvironment) -> bool {
    !resolve(verbose_override(), environment)
}
