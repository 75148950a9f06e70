//! Output pipeline - framing, sharding and the parallel writer
//!
//! Elements arrive as verbatim byte slices and leave as NDJSON lines or
//! JSON-array members, either in one sink or sharded across numbered files.
//! NDJSON sharding can additionally fan out over a pool of writer threads.

pub mod parallel;
pub mod router;

pub use parallel::run_parallel;
pub use router::{shard_path, ShardWriter, SingleWriter};
