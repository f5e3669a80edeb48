//! The BFS traversal engine: moves the frontier into processing, fetches
//! persons in concurrency-bounded batches, folds decoded results into the
//! store, and checkpoints along the way.

use std::time::{Duration, Instant};

use fstree_control::{ControlPlane, PauseCheckpointer};
use fstree_decode::{PersonsResult, decode_persons_result};
use fstree_error::Result;
use fstree_http::Session;
use fstree_store::Store;
use fstree_telemetry::{CrawlEvent, TelemetryEmitter, now_iso};
use fstree_types::{FsId, Individual, PARTIAL_WRITE_THRESHOLD, ThrottleConfig};
use futures::future::join_all;
use tracing::info;

use crate::partition::partition_requests;

const GET_PERSONS_PATH: &str = "/platform/tree/persons/.json?pids=";

struct IterationCheckpointer<'a> {
    store: &'a Store,
    iteration: u32,
}

impl PauseCheckpointer for IterationCheckpointer<'_> {
    fn checkpoint_pause(&self) -> Result<()> {
        self.store.checkpoint(self.iteration, "pause")
    }
}

async fn fetch_persons(session: &Session, ids: &[FsId]) -> Result<PersonsResult> {
    let id_list = ids.iter().map(FsId::as_str).collect::<Vec<_>>().join(",");
    let path = format!("{GET_PERSONS_PATH}{id_list}");
    match session.get(&path).await? {
        Some(value) => decode_persons_result(&value),
        None => Ok(PersonsResult::default()),
    }
}

fn fold_persons_result(store: &Store, result: &PersonsResult, iteration: u32) -> Result<()> {
    for person in &result.persons {
        let individual = Individual {
            id: person.id.clone(),
            color: person.color,
            surname: person.surname.clone(),
            given_name: person.given_name.clone(),
            iteration,
            lifespan: person.lifespan.clone(),
        };
        store.add_individual(&individual)?;
    }
    for id in &result.couple_endpoints {
        store.add_to_frontier(id)?;
    }
    for link in &result.parent_child_links {
        store.add_parent_child_relationship(&link.child, &link.parent, &link.rel_id)?;
    }
    Ok(())
}

/// Runs one BFS hop: moves the frontier into processing, fetches every
/// pending id in concurrency-bounded batches, and folds the results into
/// the store.
///
/// Enforces the control plane before `start_iteration`: a stop requested
/// before this iteration begins must be observed before the frontier is
/// drained into the processing queue, or a resume would re-run
/// `start_iteration` for the same iteration number and delete whatever
/// was left unprocessed in `PROCESSING_QUEUE`.
pub async fn iterate(
    session: &Session,
    store: &Store,
    throttle: &ThrottleConfig,
    control: &ControlPlane,
    telemetry: Option<&TelemetryEmitter>,
    iteration: u32,
) -> Result<()> {
    control.check_stop()?;
    control.wait_if_paused(&IterationCheckpointer { store, iteration }).await?;
    store.start_iteration(iteration)?;

    let start = Instant::now();
    let start_counter = session.counter();
    let ids = store.get_ids_to_process()?;
    let processing_count = ids.len();
    info!(iteration, processing_count, "starting iteration");

    let partitioned = partition_requests(
        ids,
        processing_count,
        throttle.person_batch_size,
        throttle.max_concurrent_person_requests,
    );

    let mut batches_since_partial_write: u32 = 0;
    for (batch_index, requests) in partitioned.batches.into_iter().enumerate() {
        let batch_start = Instant::now();
        let fetches = requests.iter().map(|request| fetch_persons(session, request));
        let results = join_all(fetches).await;

        let mut batch_request_count = 0usize;
        for (request, result) in requests.iter().zip(results) {
            batch_request_count += request.len();
            fold_persons_result(store, &result?, iteration)?;
        }
        let batch_duration = batch_start.elapsed();

        control.check_stop()?;
        control.wait_if_paused(&IterationCheckpointer { store, iteration }).await?;

        store.checkpoint(iteration, "batch")?;
        if let Some(telemetry) = telemetry {
            telemetry.emit(&CrawlEvent::Checkpoint { ts: now_iso(), iteration, phase: "batch".to_string() })?;
        }
        batches_since_partial_write += 1;
        if batches_since_partial_write > PARTIAL_WRITE_THRESHOLD {
            store.checkpoint(iteration, "partial-write")?;
            if let Some(telemetry) = telemetry {
                telemetry.emit(&CrawlEvent::Checkpoint {
                    ts: now_iso(),
                    iteration,
                    phase: "partial-write".to_string(),
                })?;
            }
            batches_since_partial_write = 0;
        } else if throttle.delay_between_person_batches > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(throttle.delay_between_person_batches)).await;
            control.check_stop()?;
            control.wait_if_paused(&IterationCheckpointer { store, iteration }).await?;
        }

        if let Some(telemetry) = telemetry {
            telemetry.emit(&CrawlEvent::PersonBatch {
                ts: now_iso(),
                iteration,
                batch: batch_index as u32 + 1,
                batch_duration_secs: batch_duration.as_secs_f64(),
                batch_requests: batch_request_count as u32,
                frontier: store.frontier_count()? as u64,
                processing: store.processing_count()? as u64,
                session_counter: session.counter(),
            })?;
        }
    }

    let duration = start.elapsed();
    store.end_iteration(iteration, duration.as_secs_f64())?;
    control.check_stop()?;
    control.wait_if_paused(&IterationCheckpointer { store, iteration }).await?;

    if let Some(telemetry) = telemetry {
        telemetry.emit(&CrawlEvent::IterationComplete {
            ts: now_iso(),
            iteration,
            duration_secs: duration.as_secs_f64(),
            requests: session.counter() - start_counter,
            frontier: store.frontier_count()? as u64,
            processing: store.processing_count()? as u64,
        })?;
    }
    info!(iteration, duration_secs = duration.as_secs_f64(), stats = %store.get_graph_stats()?, "finished iteration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_persons_result_is_idempotent_on_empty_result() {
        let store = Store::open_in_memory().unwrap();
        fold_persons_result(&store, &PersonsResult::default(), 0).unwrap();
        assert_eq!(store.frontier_count().unwrap(), 0);
    }
}
