//! Fixed-size worker pool that replays timelines concurrently.
//!
//! Timelines are independent, so each one runs on a blocking worker; the
//! entries inside a timeline are still applied one after another.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::audit::AuditEvent;
use crate::config::ReplayConfig;
use crate::error::{TimelineError, TimelineResult};
use crate::key::ResourceKey;
use crate::replay::{group_events, replay_timeline, EntryFailure, TimelineReplay};
use crate::store::HistoryStore;

/// Summary of a replay run. Revisions themselves live in the store.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReplayReport {
    /// Replayed resources, in first-seen order.
    pub timelines: Vec<ResourceKey>,
    /// Revisions appended.
    pub applied: usize,
    /// Entries that failed and were skipped.
    pub skipped: usize,
    pub failures: Vec<EntryFailure>,
}

/// Replay an audit log into `store`.
pub async fn replay_log(
    events: Vec<AuditEvent>,
    config: &ReplayConfig,
    store: Arc<dyn HistoryStore>,
) -> TimelineResult<ReplayReport> {
    config.validate()?;
    let merge_config = Arc::new(config.merge_configuration()?);
    let shared_config = Arc::new(config.clone());
    let groups = group_events(events, config.include_subresources);
    let timelines: Vec<ResourceKey> = groups.iter().map(|(key, _)| key.clone()).collect();
    info!(timelines = timelines.len(), workers = config.workers, "starting replay");

    let semaphore = Arc::new(Semaphore::new(config.workers));
    let mut tasks = JoinSet::new();
    for (index, (key, entries)) in groups.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let merge_config = Arc::clone(&merge_config);
        let config = Arc::clone(&shared_config);
        let store = Arc::clone(&store);
        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(permit) => tokio::task::spawn_blocking(move || -> TimelineResult<TimelineReplay> {
                    let _permit = permit;
                    let replay = replay_timeline(&key, &entries, &merge_config, &config)?;
                    for revision in &replay.revisions {
                        store.append(&key, revision.clone())?;
                    }
                    Ok(replay)
                })
                .await
                .unwrap_or_else(|e| Err(TimelineError::Worker(e.to_string()))),
                Err(e) => Err(TimelineError::Worker(e.to_string())),
            };
            (index, result)
        });
    }

    let mut results: Vec<Option<TimelineReplay>> = vec![None; timelines.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| TimelineError::Worker(e.to_string()))?;
        match result {
            Ok(replay) => results[index] = Some(replay),
            Err(err) => {
                warn!(error = %err, "aborting replay");
                tasks.abort_all();
                return Err(err);
            }
        }
    }

    let mut report = ReplayReport {
        timelines,
        ..ReplayReport::default()
    };
    for replay in results.into_iter().flatten() {
        report.applied += replay.revisions.len();
        report.skipped += replay.failures.len();
        report.failures.extend(replay.failures);
    }
    info!(
        timelines = report.timelines.len(),
        applied = report.applied,
        skipped = report.skipped,
        "replay finished"
    );
    Ok(report)
}
