//! Relationship-type resolution: fetches and resolves every edge the BFS
//! left tagged `Resolve`, reusing the batched concurrency machinery
//! [`partition_requests`] provides, with one id per request.

use std::time::{Duration, Instant};

use fstree_control::{ControlPlane, PauseCheckpointer};
use fstree_decode::decode_relationship_result;
use fstree_error::Result;
use fstree_http::Session;
use fstree_store::{Store, UpdateKey};
use fstree_telemetry::{CrawlEvent, TelemetryEmitter, now_iso};
use fstree_types::{FsId, ThrottleConfig};
use futures::future::join_all;
use tracing::{info, warn};

use crate::partition::partition_requests;

const RESOLVE_RELATIONSHIP_PATH: &str = "/platform/tree/child-and-parents-relationships/";

struct ResolveCheckpointer<'a> {
    store: &'a Store,
    iteration: u32,
}

impl PauseCheckpointer for ResolveCheckpointer<'_> {
    fn checkpoint_pause(&self) -> Result<()> {
        self.store.checkpoint(self.iteration, "pause")
    }
}

async fn resolve_one(session: &Session, store: &Store, rel_id: &FsId) -> Result<()> {
    let path = format!("{RESOLVE_RELATIONSHIP_PATH}{}.json", rel_id.as_str());
    let Some(value) = session.get(&path).await? else {
        return Ok(());
    };
    let decoded = decode_relationship_result(&value)?;
    for resolved in decoded.resolved {
        store.update_relationship(
            &UpdateKey::ByEndpoints { child: resolved.child, parent: resolved.parent },
            resolved.rel_type,
        )?;
    }
    Ok(())
}

/// Resolves every relationship the BFS left tagged `Resolve`. A fetch
/// failure skips that one relationship and logs a warning rather than
/// aborting the whole pass, per the original's documented intent ("we can
/// tolerate exceptions during relationship resolution... just continue
/// processing") even though its own control flow returned early on the
/// first failure.
pub async fn resolve_relationships(
    session: &Session,
    store: &Store,
    throttle: &ThrottleConfig,
    control: &ControlPlane,
    telemetry: Option<&TelemetryEmitter>,
    checkpoint_iteration: u32,
) -> Result<()> {
    let start = Instant::now();

    let relationships = store.get_relationships_to_resolve()?;
    let count = relationships.len();

    if count > 0 {
        info!(count, "resolving relationships");
        let partitioned = partition_requests(relationships, count, 1, throttle.max_concurrent_relationship_requests);

        for (batch_index, requests) in partitioned.batches.into_iter().enumerate() {
            control.check_stop()?;
            control.wait_if_paused(&ResolveCheckpointer { store, iteration: checkpoint_iteration }).await?;

            let batch_start = Instant::now();
            let batch_request_count = requests.len();
            let fetches = requests.into_iter().map(|request| {
                let rel_id = request[0].clone();
                async move {
                    if let Err(err) = resolve_one(session, store, &rel_id).await {
                        warn!(rel_id = %rel_id, error = %err, "failed to resolve relationship, skipping");
                    }
                }
            });
            join_all(fetches).await;
            let batch_duration = batch_start.elapsed();

            if throttle.delay_between_relationship_batches > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(throttle.delay_between_relationship_batches)).await;
            }
            control.check_stop()?;
            control.wait_if_paused(&ResolveCheckpointer { store, iteration: checkpoint_iteration }).await?;

            if let Some(telemetry) = telemetry {
                telemetry.emit(&CrawlEvent::RelationshipBatch {
                    ts: now_iso(),
                    batch: batch_index as u32 + 1,
                    batch_duration_secs: batch_duration.as_secs_f64(),
                    batch_requests: batch_request_count as u32,
                    session_counter: session.counter(),
                })?;
            }
        }
    }

    let duration = start.elapsed();
    store.end_relationship_resolution(count as u64, duration.as_secs_f64())?;
    store.checkpoint(checkpoint_iteration, "relationships")?;
    if let Some(telemetry) = telemetry {
        telemetry.emit(&CrawlEvent::Checkpoint {
            ts: now_iso(),
            iteration: checkpoint_iteration,
            phase: "relationships".to_string(),
        })?;
    }

    if let Some(telemetry) = telemetry {
        telemetry.emit(&CrawlEvent::RelationshipsComplete {
            ts: now_iso(),
            count: count as u64,
            duration_secs: duration.as_secs_f64(),
            session_counter: session.counter(),
        })?;
    }
    info!(duration_secs = duration.as_secs_f64(), "finished relationship resolution");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_has_nothing_to_resolve() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_relationships_to_resolve().unwrap().is_empty());
    }
}
