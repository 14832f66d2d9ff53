//! Live inventory of compile hosts and their dispatchable CPUs.
//!
//! [`Host`] carries one worker's declared capacity, latest load averages and
//! lifecycle state; [`Inventory`] is the process-wide store that buckets free
//! CPUs into power tiers and tracks which client connection holds which CPU.

pub mod host;
pub mod store;

pub use host::{calc_tier, heartbeat_expired, Host, HostState};
pub use store::{Assignment, ClientId, Inventory, SharedInventory, Stats};
