use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audit::AuditEvent;

/// Identity of one resource timeline.
///
/// Rendered as `group/resource/namespace/name`, with `core` for the empty
/// API group and `-` for cluster-scoped resources.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub api_group: String,
    pub resource: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        api_group: impl Into<String>,
        resource: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_group: api_group.into(),
            resource: resource.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.into(),
        }
    }

    /// The parent object an audit event writes to. `None` when the event
    /// does not name a single object (lists, collection deletes).
    pub fn from_event(event: &AuditEvent) -> Option<Self> {
        let object = event.object_ref.as_ref()?;
        let resource = object.resource.as_deref().filter(|r| !r.is_empty())?;
        let name = object.name.as_deref().filter(|n| !n.is_empty())?;
        Some(Self::new(
            object.api_group.clone().unwrap_or_default(),
            resource,
            object.namespace.as_deref(),
            name,
        ))
    }

    /// Case-sensitive substring match against the rendered key.
    pub fn matches(&self, needle: &str) -> bool {
        needle.is_empty() || self.to_string().contains(needle)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = if self.api_group.is_empty() {
            "core"
        } else {
            &self.api_group
        };
        let namespace = self.namespace.as_deref().unwrap_or("-");
        write!(f, "{group}/{}/{namespace}/{}", self.resource, self.name)
    }
}
