//! Splits a flat id list into batches of concurrently-issued requests,
//! mirroring `partition_requests`: a two-level split where each inner
//! vector is one request's worth of ids and each outer vector is a row of
//! requests meant to run concurrently.

use fstree_types::FsId;

/// One row of concurrently-issued requests.
pub type Batch = Vec<Vec<FsId>>;

#[derive(Debug, Clone)]
pub struct PartitionedRequest {
    /// `ceil(count / max_concurrent_requests / max_ids_per_request)`,
    /// matching the original's reported partition count (used only for
    /// progress reporting, never for loop bounds).
    pub number_of_partitions: usize,
    pub batches: Vec<Batch>,
}

/// Partitions `ids` into request batches. When `max_ids_per_request == 1`
/// each request carries a single id (the mode the relationship-resolution
/// engine uses); otherwise ids are grouped into chunks of
/// `max_ids_per_request` first.
///
/// `count` is taken as a separate parameter (rather than derived from
/// `ids.len()`) only to preserve the original partition-count formula;
/// callers always pass `ids.len()`.
pub fn partition_requests(
    ids: Vec<FsId>,
    count: usize,
    max_ids_per_request: usize,
    max_concurrent_requests: usize,
) -> PartitionedRequest {
    assert!(max_ids_per_request > 0, "max_ids_per_request must be positive");
    assert!(max_concurrent_requests > 0, "max_concurrent_requests must be positive");

    let requests: Vec<Vec<FsId>> = if max_ids_per_request > 1 {
        ids.chunks(max_ids_per_request).map(<[FsId]>::to_vec).collect()
    } else {
        ids.into_iter().map(|id| vec![id]).collect()
    };

    let batches: Vec<Batch> = requests.chunks(max_concurrent_requests).map(<[Vec<FsId>]>::to_vec).collect();

    let number_of_partitions =
        (count as f64 / max_concurrent_requests as f64 / max_ids_per_request as f64).ceil() as usize;

    PartitionedRequest { number_of_partitions, batches }
}
