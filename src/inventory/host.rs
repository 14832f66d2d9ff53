use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// A host that has not reported load for longer than this is considered silent.
pub const SILENT_AFTER: Duration = Duration::from_secs(60);

/// Lifecycle state of a compile host. The integer values are part of the
/// monitor wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Available,
    Unavailable,
    Overloaded,
    Silent,
}

impl HostState {
    pub fn as_int(self) -> u8 {
        match self {
            HostState::Available => 1,
            HostState::Unavailable => 2,
            HostState::Overloaded => 3,
            HostState::Silent => 4,
        }
    }
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostState::Available => write!(f, "available"),
            HostState::Unavailable => write!(f, "unavailable"),
            HostState::Overloaded => write!(f, "overloaded"),
            HostState::Silent => write!(f, "silent"),
        }
    }
}

/// One compile worker: declared capacity plus the latest normalized
/// (per-CPU) load averages.
#[derive(Debug, Clone)]
pub struct Host {
    pub ip: Ipv4Addr,
    pub num_cpus: u32,
    pub power_index: i32,
    pub ld1: f32,
    pub ld5: f32,
    pub ld10: f32,
    /// Set by the first `load` heartbeat; a host created by `status up`
    /// that never reports counts as silent at the next sweep.
    pub last_update: Option<Instant>,
    pub state: HostState,
}

impl Host {
    pub fn new(ip: Ipv4Addr, num_cpus: u32, power_index: i32) -> Self {
        Self {
            ip,
            num_cpus,
            power_index,
            ld1: 0.0,
            ld5: 0.0,
            ld10: 0.0,
            last_update: None,
            state: HostState::Available,
        }
    }

    /// Tier implied by the stored load averages. `0` means unusable.
    pub fn tier(&self) -> i32 {
        calc_tier(self.ld1, self.ld5, self.ld10, self.power_index)
    }

    /// Store new per-CPU load averages and stamp the heartbeat time.
    pub fn set_load(&mut self, ld1: f32, ld5: f32, ld10: f32) {
        self.ld1 = ld1;
        self.ld5 = ld5;
        self.ld10 = ld10;
        self.last_update = Some(Instant::now());
    }

    pub fn seems_down(&self) -> bool {
        match self.last_update {
            None => true,
            Some(at) => heartbeat_expired(at.elapsed()),
        }
    }
}

/// Classify per-CPU load averages into a power tier.
///
/// The cascade order matters: a short `ld1` burst is excused by medium-term
/// calm, and only sustained load (the `ld10` check) demotes or disqualifies
/// the host. Equality at a threshold falls through to the next clause. A
/// non-positive result is clamped to the sentinel `0`, which callers treat
/// as an overload signal.
pub fn calc_tier(ld1: f32, ld5: f32, ld10: f32, power_index: i32) -> i32 {
    let tier = if ld1 < 0.9 {
        power_index
    } else if ld5 < 0.7 {
        power_index
    } else if ld10 < 0.8 {
        power_index - 1
    } else {
        0
    };
    tier.max(0)
}

/// True once strictly more than [`SILENT_AFTER`] has passed since the last
/// heartbeat; a heartbeat exactly that old is not yet silent.
pub fn heartbeat_expired(elapsed: Duration) -> bool {
    elapsed > SILENT_AFTER
}
