//! Replay configuration, loaded from TOML.
//!
//! ```toml
//! workers = 8
//! error_policy = "abort"
//!
//! [[merge_rules]]
//! path = "spec.template.spec.tolerations"
//! strategy = "merge"
//! merge_key = "key"
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use khist_merge::{MergeConfig, MergeConfiguration, MergeStrategy, StaticResolver};
use khist_node::FieldPath;

use crate::error::{TimelineError, TimelineResult};
use crate::resolver::{builtin_resolver, LoggingResolver};

/// What to do when one audit entry cannot be applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Record the failure, leave the timeline unchanged, and continue.
    #[default]
    Skip,
    /// Stop the whole replay.
    Abort,
}

/// A merge-key rule layered over the built-in table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRule {
    pub path: String,
    #[serde(default)]
    pub strategy: MergeStrategy,
    #[serde(default)]
    pub merge_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub workers: usize,
    pub prefer_response_object: bool,
    pub null_removes_field: bool,
    pub error_policy: ErrorPolicy,
    pub include_subresources: bool,
    pub merge_rules: Vec<MergeRule>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            prefer_response_object: true,
            null_removes_field: true,
            error_policy: ErrorPolicy::Skip,
            include_subresources: true,
            merge_rules: Vec::new(),
        }
    }
}

impl ReplayConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> TimelineResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| TimelineError::io(path, e))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(text: &str) -> TimelineResult<Self> {
        let config: ReplayConfig =
            toml::from_str(text).map_err(|e| TimelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TimelineResult<()> {
        if self.workers == 0 {
            return Err(TimelineError::Config("workers must be at least 1".into()));
        }
        for rule in &self.merge_rules {
            FieldPath::parse(&rule.path)
                .map_err(|e| TimelineError::Config(format!("merge rule: {e}")))?;
            if rule.strategy == MergeStrategy::Merge
                && rule.merge_key.as_deref().map_or(true, str::is_empty)
            {
                return Err(TimelineError::Config(format!(
                    "merge rule for `{}` uses strategy \"merge\" without a merge_key",
                    rule.path
                )));
            }
        }
        Ok(())
    }

    /// Configured rules over the built-in table.
    pub fn resolver(&self) -> TimelineResult<StaticResolver> {
        let mut resolver = StaticResolver::new().with_parent(Arc::new(builtin_resolver()));
        for rule in &self.merge_rules {
            let path = FieldPath::parse(&rule.path)
                .map_err(|e| TimelineError::Config(format!("merge rule: {e}")))?;
            resolver.insert(
                path,
                MergeConfig {
                    strategy: rule.strategy,
                    merge_key: rule.merge_key.clone(),
                },
            );
        }
        Ok(resolver)
    }

    /// Engine configuration for replay: the layered resolver wrapped for
    /// logging, with this config's null handling.
    pub fn merge_configuration(&self) -> TimelineResult<MergeConfiguration> {
        let resolver = LoggingResolver::new(self.resolver()?);
        Ok(MergeConfiguration::new(resolver).with_null_removes_field(self.null_removes_field))
    }
}
