//! Library components of the `meds-shard-events` command.

pub mod context;
pub mod logging;
pub mod pipeline;
pub mod types;
