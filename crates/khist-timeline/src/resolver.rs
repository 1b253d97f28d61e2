//! Merge-key tables for common Kubernetes list fields, and a resolver wrapper
//! that reports unresolved paths.

use std::collections::HashSet;
use std::sync::Mutex;

use khist_merge::{MergeConfig, MergeConfigResolver, StaticResolver};
use khist_node::FieldPath;
use tracing::debug;

/// Pod-spec list fields, relative to a pod spec.
const POD_SPEC_LISTS: &[(&str, &str)] = &[
    ("containers", "name"),
    ("initContainers", "name"),
    ("ephemeralContainers", "name"),
    ("volumes", "name"),
    ("imagePullSecrets", "name"),
    ("hostAliases", "ip"),
    ("topologySpreadConstraints", "topologyKey"),
];

/// Container list fields, relative to a container.
const CONTAINER_LISTS: &[(&str, &str)] = &[
    ("ports", "containerPort"),
    ("env", "name"),
    ("volumeMounts", "mountPath"),
    ("volumeDevices", "devicePath"),
];

const CONTAINER_FIELDS: &[&str] = &["containers", "initContainers", "ephemeralContainers"];

/// Where a pod spec can appear inside a manifest.
const POD_SPEC_ROOTS: &[&str] = &[
    "spec",
    "spec.template.spec",
    "spec.jobTemplate.spec.template.spec",
];

/// Fields outside pod specs.
const OTHER_LISTS: &[(&str, &str)] = &[
    ("metadata.ownerReferences", "uid"),
    ("status.conditions", "type"),
    ("spec.ports", "port"),
    ("subsets.ports", "port"),
];

fn path(text: &str) -> FieldPath {
    FieldPath::from_segments(text.split('.'))
}

/// Merge keys for the list fields of built-in workload and core types.
pub fn builtin_resolver() -> StaticResolver {
    let mut resolver = StaticResolver::new();
    for root in POD_SPEC_ROOTS {
        for (field, key) in POD_SPEC_LISTS {
            resolver.insert(path(&format!("{root}.{field}")), MergeConfig::merge_on(*key));
        }
        for container in CONTAINER_FIELDS {
            for (field, key) in CONTAINER_LISTS {
                resolver.insert(
                    path(&format!("{root}.{container}.{field}")),
                    MergeConfig::merge_on(*key),
                );
            }
        }
    }
    for (field, key) in OTHER_LISTS {
        resolver.insert(path(field), MergeConfig::merge_on(*key));
    }
    resolver
}

/// Wraps a resolver and logs each distinct unresolved path once.
///
/// The dedup set belongs to the wrapper, so separate replays keep
/// separate logs.
pub struct LoggingResolver<R> {
    inner: R,
    unresolved: Mutex<HashSet<FieldPath>>,
}

impl<R: MergeConfigResolver> LoggingResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            unresolved: Mutex::new(HashSet::new()),
        }
    }

    /// Unresolved paths seen so far, sorted.
    pub fn unresolved(&self) -> Vec<FieldPath> {
        let seen = self.unresolved.lock().expect("resolver mutex poisoned");
        let mut paths: Vec<FieldPath> = seen.iter().cloned().collect();
        paths.sort();
        paths
    }
}

impl<R: MergeConfigResolver> MergeConfigResolver for LoggingResolver<R> {
    fn resolve(&self, path: &FieldPath) -> Option<MergeConfig> {
        let resolved = self.inner.resolve(path);
        if resolved.is_none() {
            let mut seen = self.unresolved.lock().expect("resolver mutex poisoned");
            if seen.insert(path.clone()) {
                debug!(path = %path, "no merge key configured, list will be replaced");
            }
        }
        resolved
    }
}
