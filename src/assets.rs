//! Precompile registry of the host's asset pipeline.
//!
//! Coordinators register their output prefix here during prepare so the
//! host treats the build tool's artifacts as servable static assets.

use std::sync::Mutex;

use regex::Regex;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct AssetPipeline {
    precompile: Mutex<Vec<Regex>>,
}

impl AssetPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every logical path under `<app_name>/`.
    pub fn register_app(&self, app_name: &str) -> Result<()> {
        let pattern = format!("^{}/", regex::escape(app_name));
        let regex = Regex::new(&pattern)
            .map_err(|e| Error::Config(format!("invalid asset pattern '{}': {}", pattern, e)))?;
        self.register(regex);
        Ok(())
    }

    pub fn register(&self, pattern: Regex) {
        let mut precompile = self.precompile.lock().unwrap_or_else(|e| e.into_inner());
        if precompile.iter().all(|p| p.as_str() != pattern.as_str()) {
            tracing::debug!(pattern = %pattern, "registered precompile pattern");
            precompile.push(pattern);
        }
    }

    /// Returns true if `logical_path` matches a registered pattern.
    pub fn is_precompiled(&self, logical_path: &str) -> bool {
        self.precompile
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|p| p.is_match(logical_path))
    }

    /// Registered patterns in registration order.
    pub fn patterns(&self) -> Vec<String> {
        self.precompile
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|p| p.as_str().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_prefix_is_precompiled() {
        let pipeline = AssetPipeline::new();
        pipeline.register_app("storefront").unwrap();

        assert!(pipeline.is_precompiled("storefront/vendor.js"));
        assert!(!pipeline.is_precompiled("admin/vendor.js"));
        assert!(!pipeline.is_precompiled("assets/storefront/vendor.js"));
    }

    #[test]
    fn app_names_are_escaped() {
        let pipeline = AssetPipeline::new();
        pipeline.register_app("shop.v2").unwrap();

        assert!(pipeline.is_precompiled("shop.v2/app.css"));
        assert!(!pipeline.is_precompiled("shopXv2/app.css"));
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let pipeline = AssetPipeline::new();
        pipeline.register_app("storefront").unwrap();
        pipeline.register_app("storefront").unwrap();

        assert_eq!(pipeline.patterns(), vec!["^storefront/"]);
    }
}
