//! Kubernetes audit events (`audit.k8s.io/v1`), one JSON object per line.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use khist_node::Node;

use crate::error::{TimelineError, TimelineResult};

/// The stage at which the API server has finished sending the response.
pub const STAGE_RESPONSE_COMPLETE: &str = "ResponseComplete";

/// The subset of an audit event that replay needs. Unknown fields are
/// ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    #[serde(rename = "auditID")]
    pub audit_id: String,
    #[serde(default)]
    pub stage: Option<String>,
    pub verb: String,
    #[serde(default)]
    pub object_ref: Option<ObjectReference>,
    #[serde(default)]
    pub user: Option<UserInfo>,
    #[serde(default)]
    pub response_status: Option<ResponseStatus>,
    #[serde(default)]
    pub request_object: Option<Node>,
    #[serde(default)]
    pub response_object: Option<Node>,
    #[serde(default)]
    pub request_received_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stage_timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default)]
    pub api_group: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subresource: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStatus {
    #[serde(default)]
    pub code: Option<u16>,
}

impl AuditEvent {
    /// Entries without a stage come from tools that only log final events.
    pub fn is_complete(&self) -> bool {
        self.stage
            .as_deref()
            .map_or(true, |stage| stage == STAGE_RESPONSE_COMPLETE)
    }

    /// Absent status codes are treated as success.
    pub fn succeeded(&self) -> bool {
        match self.response_status.as_ref().and_then(|s| s.code) {
            Some(code) => (200..300).contains(&code),
            None => true,
        }
    }

    pub fn subresource(&self) -> Option<&str> {
        self.object_ref
            .as_ref()
            .and_then(|r| r.subresource.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.username.as_deref())
    }
}

/// Parse a JSON-lines audit log. Blank lines are skipped; `source_name`
/// labels errors.
pub fn parse_audit_lines(text: &str, source_name: &str) -> TimelineResult<Vec<AuditEvent>> {
    let mut events = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event = serde_json::from_str(line).map_err(|e| TimelineError::Decode {
            source_name: source_name.to_string(),
            line: index + 1,
            message: e.to_string(),
        })?;
        events.push(event);
    }
    Ok(events)
}

/// Read audit events from a file, or from every file under a directory in
/// file-name order.
pub fn read_audit_path(path: &Path) -> TimelineResult<Vec<AuditEvent>> {
    let metadata = fs::metadata(path).map_err(|e| TimelineError::io(path, e))?;
    if metadata.is_file() {
        return read_audit_file(path);
    }

    let mut events = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry.map_err(|e| {
            let at = e.path().unwrap_or(path).to_path_buf();
            TimelineError::io(at, std::io::Error::other(e.to_string()))
        })?;
        if entry.file_type().is_file() {
            events.extend(read_audit_file(entry.path())?);
        }
    }
    Ok(events)
}

fn read_audit_file(path: &Path) -> TimelineResult<Vec<AuditEvent>> {
    let text = fs::read_to_string(path).map_err(|e| TimelineError::io(path, e))?;
    let events = parse_audit_lines(&text, &path.display().to_string())?;
    debug!(path = %path.display(), events = events.len(), "read audit log");
    Ok(events)
}
