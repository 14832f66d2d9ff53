//! Periodic maintenance against the shared store: the silent-host sweep and
//! the stats reporter. Both run as spawned loops independent of the request
//! path and take the same store lock for each pass.

pub mod stats;
pub mod sweeper;

pub use stats::run_stats;
pub use sweeper::run_sweeper;
