//! Request partitioning, BFS traversal, and relationship resolution: the
//! three pieces of the original crawler's `FamilySearchAPI` class, split
//! into focused modules that share the [`partition::partition_requests`]
//! batching primitive.

pub mod bfs;
pub mod partition;
pub mod resolve;

pub use bfs::iterate;
pub use partition::{Batch, PartitionedRequest, partition_requests};
pub use resolve::resolve_relationships;
