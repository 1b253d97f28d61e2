//! Serial replay of one resource's audit entries into manifest revisions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use khist_codec::to_json_string;
use khist_merge::{merge, MergeConfiguration, MergeError};
use khist_node::{MapNode, Node, Scalar};

use crate::audit::AuditEvent;
use crate::config::{ErrorPolicy, ReplayConfig};
use crate::error::{TimelineError, TimelineResult};
use crate::key::ResourceKey;

/// One state of a resource, produced by one applied audit entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestRevision {
    /// 1-based position in the timeline.
    pub seq: u64,
    pub audit_id: String,
    pub verb: String,
    pub subresource: Option<String>,
    pub user: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// BLAKE3 (hex) of the compact JSON rendering. Deletions hash the
    /// string `null`.
    pub digest: String,
    /// `None` once the resource has been deleted.
    pub manifest: Option<Node>,
}

impl ManifestRevision {
    pub fn is_deletion(&self) -> bool {
        self.manifest.is_none()
    }
}

/// An audit entry that could not be applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFailure {
    pub resource: ResourceKey,
    pub audit_id: String,
    pub message: String,
}

/// The outcome of replaying one timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct TimelineReplay {
    pub key: ResourceKey,
    pub revisions: Vec<ManifestRevision>,
    pub failures: Vec<EntryFailure>,
}

/// Verbs that write an object.
const WRITE_VERBS: &[&str] = &["create", "update", "patch", "delete"];

/// Writes to this subresource carry a `Scale` object, not the parent.
const SCALE_SUBRESOURCE: &str = "scale";

/// Completed, successful writes.
pub fn is_replayable(event: &AuditEvent) -> bool {
    event.is_complete() && event.succeeded() && WRITE_VERBS.contains(&event.verb.as_str())
}

/// Group replayable events by resource, in first-seen order.
///
/// Each group is stably sorted by event time: the request timestamp, else the
/// stage timestamp. An entry with neither sorts as if it carried the time of
/// the entry logged before it, so it stays behind that entry.
pub fn group_events(
    events: Vec<AuditEvent>,
    include_subresources: bool,
) -> Vec<(ResourceKey, Vec<AuditEvent>)> {
    let mut groups: Vec<(ResourceKey, Vec<AuditEvent>)> = Vec::new();
    let mut index: HashMap<ResourceKey, usize> = HashMap::new();
    let mut ignored = 0usize;

    for event in events {
        if !is_replayable(&event) || (!include_subresources && event.subresource().is_some()) {
            ignored += 1;
            continue;
        }
        let Some(key) = ResourceKey::from_event(&event) else {
            ignored += 1;
            continue;
        };
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(event),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![event]));
            }
        }
    }

    for (_, entries) in &mut groups {
        let mut carried = None;
        let mut timed: Vec<(Option<DateTime<Utc>>, AuditEvent)> = std::mem::take(entries)
            .into_iter()
            .map(|event| {
                carried = event_time(&event).or(carried);
                (carried, event)
            })
            .collect();
        timed.sort_by_key(|(time, _)| *time);
        *entries = timed.into_iter().map(|(_, event)| event).collect();
    }
    debug!(timelines = groups.len(), ignored, "grouped audit events");
    groups
}

/// Apply `events` in order, starting from an absent resource.
///
/// Under [`ErrorPolicy::Skip`] a failing entry is recorded and the running
/// manifest is left as it was; under [`ErrorPolicy::Abort`] the first failure
/// is returned.
pub fn replay_timeline(
    key: &ResourceKey,
    events: &[AuditEvent],
    merge_config: &MergeConfiguration,
    config: &ReplayConfig,
) -> TimelineResult<TimelineReplay> {
    let mut running: Option<Node> = None;
    let mut revisions = Vec::new();
    let mut failures = Vec::new();

    for event in events {
        match next_manifest(key, event, running.as_ref(), merge_config, config) {
            Ok(manifest) => {
                let digest = digest(manifest.as_ref())?;
                revisions.push(ManifestRevision {
                    seq: revisions.len() as u64 + 1,
                    audit_id: event.audit_id.clone(),
                    verb: event.verb.clone(),
                    subresource: event.subresource().map(str::to_string),
                    user: event.username().map(str::to_string),
                    timestamp: event_time(event),
                    digest,
                    manifest: manifest.clone(),
                });
                running = manifest;
            }
            Err(err) => match config.error_policy {
                ErrorPolicy::Abort => return Err(err),
                ErrorPolicy::Skip => {
                    warn!(resource = %key, audit_id = %event.audit_id, error = %err, "skipping audit entry");
                    failures.push(EntryFailure {
                        resource: key.clone(),
                        audit_id: event.audit_id.clone(),
                        message: err.to_string(),
                    });
                }
            },
        }
    }

    Ok(TimelineReplay {
        key: key.clone(),
        revisions,
        failures,
    })
}

fn next_manifest(
    key: &ResourceKey,
    event: &AuditEvent,
    running: Option<&Node>,
    merge_config: &MergeConfiguration,
    config: &ReplayConfig,
) -> TimelineResult<Option<Node>> {
    let response = event
        .response_object
        .as_ref()
        .filter(|_| config.prefer_response_object);
    let entry_error = |reason: &str| TimelineError::Entry {
        audit_id: event.audit_id.clone(),
        resource: key.to_string(),
        reason: reason.to_string(),
    };
    let merge_error = |source: MergeError| TimelineError::Merge {
        audit_id: event.audit_id.clone(),
        resource: key.to_string(),
        source,
    };

    if event.subresource() == Some(SCALE_SUBRESOURCE) {
        if !matches!(event.verb.as_str(), "update" | "patch") {
            return Err(entry_error(&format!("verb `{}` on scale", event.verb)));
        }
        let running = running.ok_or_else(|| entry_error("scale before the resource exists"))?;
        let replicas = response
            .or(event.request_object.as_ref())
            .and_then(|scale| scale.get("spec"))
            .and_then(|spec| spec.get("replicas"))
            .filter(|replicas| matches!(replicas.as_scalar(), Some(Scalar::Int(_))))
            .ok_or_else(|| entry_error("scale without an integer spec.replicas"))?;
        return merge(Some(running), Some(&replicas_patch(replicas)), merge_config)
            .map_err(merge_error);
    }

    match event.verb.as_str() {
        "delete" => Ok(None),
        "create" | "update" => response
            .or(event.request_object.as_ref())
            .cloned()
            .map(Some)
            .ok_or_else(|| entry_error("no requestObject or responseObject")),
        "patch" => {
            if let Some(response) = response {
                return Ok(Some(response.clone()));
            }
            let patch = event
                .request_object
                .as_ref()
                .ok_or_else(|| entry_error("patch without requestObject"))?;
            if patch.as_sequence().is_some() {
                return Err(entry_error(
                    "JSON patch requests need a responseObject to replay",
                ));
            }
            merge(running, Some(patch), merge_config).map_err(merge_error)
        }
        other => Err(entry_error(&format!("verb `{other}` does not write an object"))),
    }
}

/// `{spec: {replicas: N}}`, applied to the parent manifest for scale writes.
fn replicas_patch(replicas: &Node) -> Node {
    let mut spec = MapNode::new();
    spec.insert("replicas", replicas.clone());
    let mut patch = MapNode::new();
    patch.insert("spec", Node::Map(spec));
    Node::Map(patch)
}

fn event_time(event: &AuditEvent) -> Option<DateTime<Utc>> {
    event.request_received_timestamp.or(event.stage_timestamp)
}

/// Hex BLAKE3 of the compact JSON rendering of `manifest`.
pub fn digest(manifest: Option<&Node>) -> TimelineResult<String> {
    let json = match manifest {
        Some(node) => to_json_string(node)?,
        None => "null".to_string(),
    };
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{ObjectReference, ResponseStatus};
    use khist_codec::from_yaml_str;
    use khist_node::Reader;

    fn yaml(text: &str) -> Node {
        from_yaml_str(text).unwrap()
    }

    fn event(id: &str, verb: &str, ts: &str, request: Option<&str>) -> AuditEvent {
        AuditEvent {
            audit_id: id.into(),
            stage: Some("ResponseComplete".into()),
            verb: verb.into(),
            object_ref: Some(ObjectReference {
                api_group: Some("apps".into()),
                resource: Some("deployments".into()),
                namespace: Some("prod".into()),
                name: Some("api".into()),
                ..ObjectReference::default()
            }),
            user: None,
            response_status: Some(ResponseStatus { code: Some(200) }),
            request_object: request.map(yaml),
            response_object: None,
            request_received_timestamp: Some(ts.parse().unwrap()),
            stage_timestamp: None,
        }
    }

    fn key() -> ResourceKey {
        ResourceKey::new("apps", "deployments", Some("prod"), "api")
    }

    fn replay(events: &[AuditEvent], config: &ReplayConfig) -> TimelineResult<TimelineReplay> {
        let merge_config = config.merge_configuration().unwrap();
        replay_timeline(&key(), events, &merge_config, config)
    }

    const CREATE: &str = "
spec:
  replicas: 1
  template:
    spec:
      containers:
      - name: app
        image: app:1
      - name: sidecar
        image: proxy:1
";

    #[test]
    fn create_then_patch_merges_by_name() {
        let events = vec![
            event("1", "create", "2024-05-01T12:00:00Z", Some(CREATE)),
            event(
                "2",
                "patch",
                "2024-05-01T12:01:00Z",
                Some("spec:\n  template:\n    spec:\n      containers:\n      - name: app\n        image: app:2\n"),
            ),
        ];
        let replay = replay(&events, &ReplayConfig::default()).unwrap();
        assert_eq!(replay.revisions.len(), 2);
        assert!(replay.failures.is_empty());

        let last = replay.revisions[1].manifest.as_ref().unwrap();
        let reader = Reader::new(last);
        let containers = reader.get("spec.template.spec.containers").unwrap();
        let containers = containers.as_sequence().unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].get("image").and_then(Node::as_str), Some("proxy:1"));
        assert_eq!(containers[1].get("image").and_then(Node::as_str), Some("app:2"));
        assert_eq!(reader.read_int("spec.replicas").unwrap(), 1);
        assert_eq!(replay.revisions[1].seq, 2);
    }

    #[test]
    fn response_object_preferred() {
        let mut patch = event("2", "patch", "2024-05-01T12:01:00Z", Some("spec:\n  replicas: 5\n"));
        patch.response_object = Some(yaml("spec:\n  replicas: 7\n"));
        let events = vec![event("1", "create", "2024-05-01T12:00:00Z", Some(CREATE)), patch];

        let replay_with = replay(&events, &ReplayConfig::default()).unwrap();
        let manifest = replay_with.revisions[1].manifest.as_ref().unwrap();
        assert_eq!(Reader::new(manifest).read_int("spec.replicas").unwrap(), 7);

        let config = ReplayConfig {
            prefer_response_object: false,
            ..ReplayConfig::default()
        };
        let replay_without = replay(&events, &config).unwrap();
        let manifest = replay_without.revisions[1].manifest.as_ref().unwrap();
        assert_eq!(Reader::new(manifest).read_int("spec.replicas").unwrap(), 5);
    }

    #[test]
    fn null_in_patch_removes_field() {
        let events = vec![
            event("1", "create", "2024-05-01T12:00:00Z", Some("metadata:\n  labels:\n    a: x\n    b: y\n")),
            event("2", "patch", "2024-05-01T12:01:00Z", Some("metadata:\n  labels:\n    a: null\n")),
        ];
        let replay = replay(&events, &ReplayConfig::default()).unwrap();
        let labels = replay.revisions[1]
            .manifest
            .as_ref()
            .and_then(|m| Reader::new(m).get("metadata.labels").ok().cloned())
            .unwrap();
        assert_eq!(labels, yaml("b: y\n"));
    }

    #[test]
    fn delete_then_recreate() {
        let events = vec![
            event("1", "create", "2024-05-01T12:00:00Z", Some(CREATE)),
            event("2", "delete", "2024-05-01T12:01:00Z", None),
            event("3", "patch", "2024-05-01T12:02:00Z", Some("spec:\n  replicas: 3\n")),
        ];
        let replay = replay(&events, &ReplayConfig::default()).unwrap();
        assert!(replay.revisions[1].is_deletion());
        assert_eq!(replay.revisions[1].digest, digest(None).unwrap());
        assert_eq!(
            replay.revisions[2].manifest,
            Some(yaml("spec:\n  replicas: 3\n"))
        );
    }

    #[test]
    fn failing_entry_skipped_or_aborts() {
        let events = vec![
            event("1", "create", "2024-05-01T12:00:00Z", Some(CREATE)),
            event("2", "patch", "2024-05-01T12:01:00Z", Some("spec:\n  $patch: bogus\n")),
            event("3", "patch", "2024-05-01T12:02:00Z", Some("spec:\n  replicas: 2\n")),
        ];
        let skipped = replay(&events, &ReplayConfig::default()).unwrap();
        assert_eq!(skipped.revisions.len(), 2);
        assert_eq!(skipped.failures.len(), 1);
        assert_eq!(skipped.failures[0].audit_id, "2");
        assert_eq!(skipped.revisions[1].audit_id, "3");
        assert_eq!(skipped.revisions[1].seq, 2);

        let config = ReplayConfig {
            error_policy: ErrorPolicy::Abort,
            ..ReplayConfig::default()
        };
        match replay(&events, &config) {
            Err(TimelineError::Merge { audit_id, .. }) => assert_eq!(audit_id, "2"),
            other => panic!("expected merge error, got {other:?}"),
        }
    }

    #[test]
    fn missing_objects_are_entry_errors() {
        let mut create = event("1", "create", "2024-05-01T12:00:00Z", None);
        create.request_object = None;
        let json_patch = event(
            "2",
            "patch",
            "2024-05-01T12:01:00Z",
            Some("- op: replace\n  path: /spec/replicas\n  value: 2\n"),
        );
        let replay = replay(&[create, json_patch], &ReplayConfig::default()).unwrap();
        assert!(replay.revisions.is_empty());
        assert_eq!(replay.failures.len(), 2);
    }

    #[test]
    fn grouping_filters_and_orders() {
        let mut pending = event("p", "update", "2024-05-01T12:00:00Z", Some(CREATE));
        pending.stage = Some("RequestReceived".into());
        let mut conflict = event("c", "update", "2024-05-01T12:00:00Z", Some(CREATE));
        conflict.response_status = Some(ResponseStatus { code: Some(409) });
        let read = event("g", "get", "2024-05-01T12:00:00Z", None);
        let mut status = event("s", "update", "2024-05-01T12:03:00Z", Some(CREATE));
        if let Some(r) = status.object_ref.as_mut() {
            r.subresource = Some("status".into());
        }
        let mut other = event("o", "create", "2024-05-01T11:00:00Z", Some(CREATE));
        if let Some(r) = other.object_ref.as_mut() {
            r.name = Some("worker".into());
        }

        let events = vec![
            event("late", "patch", "2024-05-01T12:02:00Z", Some("spec: {}\n")),
            other,
            pending,
            conflict,
            read,
            status,
            event("early", "create", "2024-05-01T12:00:00Z", Some(CREATE)),
        ];

        let groups = group_events(events.clone(), true);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, key());
        let ids: Vec<&str> = groups[0].1.iter().map(|e| e.audit_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "s"]);
        assert_eq!(groups[1].0.name, "worker");

        let groups = group_events(events, false);
        let ids: Vec<&str> = groups[0].1.iter().map(|e| e.audit_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    fn on_subresource(mut event: AuditEvent, subresource: &str) -> AuditEvent {
        if let Some(r) = event.object_ref.as_mut() {
            r.subresource = Some(subresource.into());
        }
        event
    }

    #[test]
    fn scale_writes_only_touch_replicas() {
        let scale = "kind: Scale\nmetadata:\n  name: api\nspec:\n  replicas: 4\nstatus:\n  replicas: 1\n";
        let events = vec![
            event("1", "create", "2024-05-01T12:00:00Z", Some(CREATE)),
            on_subresource(event("2", "update", "2024-05-01T12:01:00Z", Some(scale)), "scale"),
            on_subresource(
                event("3", "patch", "2024-05-01T12:02:00Z", Some("spec:\n  replicas: 6\n")),
                "scale",
            ),
        ];
        let replay = replay(&events, &ReplayConfig::default()).unwrap();
        assert!(replay.failures.is_empty());

        let scaled = replay.revisions[1].manifest.as_ref().unwrap();
        assert_eq!(scaled, &yaml(&CREATE.replace("replicas: 1", "replicas: 4")));
        assert_eq!(replay.revisions[1].subresource.as_deref(), Some("scale"));

        let patched = replay.revisions[2].manifest.as_ref().unwrap();
        let reader = Reader::new(patched);
        assert_eq!(reader.read_int("spec.replicas").unwrap(), 6);
        assert!(patched.get("kind").is_none());
        assert!(patched.get("status").is_none());
    }

    #[test]
    fn scale_needs_a_parent_and_replicas() {
        let events = vec![
            on_subresource(event("1", "update", "2024-05-01T12:00:00Z", Some("spec:\n  replicas: 2\n")), "scale"),
            event("2", "create", "2024-05-01T12:01:00Z", Some(CREATE)),
            on_subresource(event("3", "update", "2024-05-01T12:02:00Z", Some("kind: Scale\n")), "scale"),
        ];
        let replay = replay(&events, &ReplayConfig::default()).unwrap();
        assert_eq!(replay.revisions.len(), 1);
        let failed: Vec<&str> = replay.failures.iter().map(|f| f.audit_id.as_str()).collect();
        assert_eq!(failed, vec!["1", "3"]);
    }

    #[test]
    fn status_writes_replace_the_object() {
        let status = "spec:\n  replicas: 1\nstatus:\n  readyReplicas: 1\n";
        let events = vec![
            event("1", "create", "2024-05-01T12:00:00Z", Some(CREATE)),
            on_subresource(event("2", "update", "2024-05-01T12:01:00Z", Some(status)), "status"),
        ];
        let replay = replay(&events, &ReplayConfig::default()).unwrap();
        assert_eq!(replay.revisions[1].manifest, Some(yaml(status)));
    }

    #[test]
    fn grouping_falls_back_to_stage_time() {
        let mut staged = event("staged", "patch", "2024-05-01T12:00:00Z", Some("spec: {}\n"));
        staged.request_received_timestamp = None;
        staged.stage_timestamp = Some("2024-05-01T12:05:00Z".parse().unwrap());
        let mut untimed = event("untimed", "patch", "2024-05-01T12:00:00Z", Some("spec: {}\n"));
        untimed.request_received_timestamp = None;

        let events = vec![
            event("second", "patch", "2024-05-01T12:02:00Z", Some("spec: {}\n")),
            untimed,
            staged,
            event("first", "create", "2024-05-01T12:00:00Z", Some(CREATE)),
        ];
        let groups = group_events(events, false);
        let ids: Vec<&str> = groups[0].1.iter().map(|e| e.audit_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "untimed", "staged"]);

        let replay = replay(&groups[0].1, &ReplayConfig::default()).unwrap();
        let times: Vec<Option<String>> = replay
            .revisions
            .iter()
            .map(|r| r.timestamp.map(|t| t.to_rfc3339()))
            .collect();
        assert_eq!(times[2], None);
        assert_eq!(times[3].as_deref(), Some("2024-05-01T12:05:00+00:00"));
    }

    #[test]
    fn deletion_digest_hashes_the_null_string() {
        let expected = hex::encode(blake3::hash(b"null").as_bytes());
        assert_eq!(digest(None).unwrap(), expected);
        assert_eq!(digest(Some(&Node::null())).unwrap(), expected);
    }

    #[test]
    fn digest_depends_on_content_and_order() {
        let a = yaml("a: 1\nb: 2\n");
        let b = yaml("b: 2\na: 1\n");
        assert_eq!(digest(Some(&a)).unwrap(), digest(Some(&a.clone())).unwrap());
        assert_ne!(digest(Some(&a)).unwrap(), digest(Some(&b)).unwrap());
        assert_eq!(digest(Some(&a)).unwrap().len(), 64);
    }
}
