use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use crate::error::{DispatchError, Result};
use crate::inventory::host::{calc_tier, Host, HostState};

/// Stable handle for a client control connection; CPUs are released when the
/// connection carrying this id closes.
pub type ClientId = u64;

/// The store shared between the dispatcher and the periodic tasks. All
/// mutations are serialized through this single lock.
pub type SharedInventory = Arc<Mutex<Inventory>>;

/// One CPU currently held by a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub cpu: Ipv4Addr,
    pub client: ClientId,
}

/// Counters for one collection period, reset by [`Inventory::take_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// CPUs handed out during the period.
    pub served: u64,
    /// Peak number of concurrently held CPUs during the period.
    pub peak: usize,
    /// Free plus assigned CPUs at snapshot time.
    pub total_cpus: usize,
}

/// In-memory inventory of compile hosts and their CPUs.
///
/// Every known host lives in the universe map and in exactly one of the four
/// state-indexed sets. A host in `Available` contributes `num_cpus` entries
/// (its IP, repeated) to the tier multiset its load averages place it in;
/// hosts in any other state contribute none. Assigning a CPU moves one entry
/// from its tier to the assignment list; release puts it back if the host is
/// still available.
#[derive(Debug)]
pub struct Inventory {
    hosts: BTreeMap<Ipv4Addr, Host>,
    avail_hosts: BTreeSet<Ipv4Addr>,
    unavail_hosts: BTreeSet<Ipv4Addr>,
    overloaded_hosts: BTreeSet<Ipv4Addr>,
    silent_hosts: BTreeSet<Ipv4Addr>,
    /// Tier -> multiset of host IPs with a free CPU, one entry per CPU.
    avail_cpus: BTreeMap<i32, Vec<Ipv4Addr>>,
    assigned: Vec<Assignment>,
    served: u64,
    peak: usize,
    rng: SmallRng,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }

    /// Deterministic construction for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            hosts: BTreeMap::new(),
            avail_hosts: BTreeSet::new(),
            unavail_hosts: BTreeSet::new(),
            overloaded_hosts: BTreeSet::new(),
            silent_hosts: BTreeSet::new(),
            avail_cpus: BTreeMap::new(),
            assigned: Vec::new(),
            served: 0,
            peak: 0,
            rng,
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.hosts.contains_key(&ip)
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<&Host> {
        self.hosts.get(&ip)
    }

    pub fn host(&self, ip: Ipv4Addr) -> Result<&Host> {
        self.hosts.get(&ip).ok_or(DispatchError::HostNotFound(ip))
    }

    /// Register a newly observed host as `Available` with zero load averages,
    /// publishing its declared capacity at its power-index tier.
    pub fn add_host(&mut self, ip: Ipv4Addr, num_cpus: u32, power_index: i32) {
        if self.hosts.contains_key(&ip) {
            tracing::warn!(host = %ip, "Host already known, ignoring add");
            return;
        }
        let host = Host::new(ip, num_cpus, power_index);
        let tier = host.tier();
        self.hosts.insert(ip, host);
        self.avail_hosts.insert(ip);
        if tier > 0 {
            self.add_cpus(tier, ip, num_cpus);
        }
        tracing::info!(host = %ip, num_cpus, power_index, "Host added");
    }

    /// Pick a uniformly random CPU from the highest non-empty tier and remove
    /// it from the pool. `None` when every tier is empty.
    pub fn best_avail_cpu(&mut self) -> Option<Ipv4Addr> {
        let tier = self
            .avail_cpus
            .iter()
            .rev()
            .find(|(_, cpus)| !cpus.is_empty())
            .map(|(tier, _)| *tier)?;
        let cpus = self.avail_cpus.get_mut(&tier)?;
        let n = self.rng.gen_range(0..cpus.len());
        let ip = cpus.swap_remove(n);
        if cpus.is_empty() {
            self.avail_cpus.remove(&tier);
        }
        Some(ip)
    }

    /// Record a CPU as held by a client connection.
    pub fn assign(&mut self, cpu: Ipv4Addr, client: ClientId) {
        self.assigned.push(Assignment { cpu, client });
        self.served += 1;
        self.peak = self.peak.max(self.assigned.len());
        tracing::debug!(cpu = %cpu, client, held = self.assigned.len(), "CPU assigned");
    }

    /// Release every CPU held by a client connection, re-publishing each one
    /// whose host is still `Available`. Returns the number released; unknown
    /// clients release nothing.
    pub fn release_client(&mut self, client: ClientId) -> usize {
        let mut released = Vec::new();
        self.assigned.retain(|a| {
            if a.client == client {
                released.push(a.cpu);
                false
            } else {
                true
            }
        });
        for cpu in &released {
            let republish_tier = match self.hosts.get(cpu) {
                Some(host) if host.state == HostState::Available => Some(host.tier()),
                Some(host) => {
                    // Host left the pool while the CPU was out; its full
                    // capacity is republished when it becomes available again.
                    tracing::debug!(cpu = %cpu, state = %host.state, "Released CPU not re-published");
                    None
                }
                None => {
                    tracing::debug!(cpu = %cpu, "Released CPU for unknown host");
                    None
                }
            };
            if let Some(tier) = republish_tier {
                if tier > 0 {
                    self.add_cpus(tier, *cpu, 1);
                }
            }
        }
        released.len()
    }

    pub fn set_available(&mut self, ip: Ipv4Addr) {
        self.transition(ip, HostState::Available);
    }

    pub fn set_unavailable(&mut self, ip: Ipv4Addr) {
        self.transition(ip, HostState::Unavailable);
    }

    pub fn set_overloaded(&mut self, ip: Ipv4Addr) {
        self.transition(ip, HostState::Overloaded);
    }

    pub fn set_silent(&mut self, ip: Ipv4Addr) {
        self.transition(ip, HostState::Silent);
    }

    /// Apply one lifecycle transition. Entering `Available` publishes the
    /// host's declared capacity at its current tier; leaving it withdraws
    /// every free entry. All other moves only switch state sets. Self
    /// transitions are no-ops.
    fn transition(&mut self, ip: Ipv4Addr, to: HostState) {
        let (from, tier, num_cpus) = match self.hosts.get_mut(&ip) {
            Some(host) => {
                if host.state == to {
                    return;
                }
                let from = host.state;
                host.state = to;
                (from, host.tier(), host.num_cpus)
            }
            None => {
                tracing::warn!(host = %ip, state = %to, "State change for unknown host");
                return;
            }
        };
        self.state_set(from).remove(&ip);
        self.state_set(to).insert(ip);
        match (from, to) {
            (_, HostState::Available) if tier > 0 => self.add_cpus(tier, ip, num_cpus),
            (HostState::Available, _) if tier > 0 => {
                self.del_cpus(tier, ip);
            }
            _ => {}
        }
        tracing::debug!(host = %ip, from = %from, to = %to, tier, "Host state change");
    }

    /// Apply a raw load-average report: normalize per CPU, reclassify, and
    /// move or withdraw the host's free CPUs accordingly.
    ///
    /// A sentinel new tier forces `Overloaded` from any state. Recovery from
    /// the sentinel republishes at the new tier, except for hosts an operator
    /// marked down: a good load report never cancels `Unavailable`.
    pub fn update_load(&mut self, ip: Ipv4Addr, raw1: f32, raw5: f32, raw10: f32) {
        let (old_tier, new_tier, state, num_cpus, ld1, ld5, ld10) = match self.hosts.get(&ip) {
            Some(host) => {
                let per_cpu = host.num_cpus.max(1) as f32;
                let (ld1, ld5, ld10) = (raw1 / per_cpu, raw5 / per_cpu, raw10 / per_cpu);
                (
                    host.tier(),
                    calc_tier(ld1, ld5, ld10, host.power_index),
                    host.state,
                    host.num_cpus,
                    ld1,
                    ld5,
                    ld10,
                )
            }
            None => {
                tracing::warn!(host = %ip, "Load report for unknown host");
                return;
            }
        };

        if new_tier == 0 {
            // Withdraw happens at the old tier, so transition before storing.
            if state != HostState::Overloaded {
                self.set_overloaded(ip);
            }
            self.store_load(ip, ld1, ld5, ld10);
        } else if old_tier == 0 {
            // Store first so the republish lands at the new tier.
            self.store_load(ip, ld1, ld5, ld10);
            match state {
                HostState::Available => self.add_cpus(new_tier, ip, num_cpus),
                HostState::Unavailable => {}
                HostState::Overloaded | HostState::Silent => self.set_available(ip),
            }
        } else {
            if new_tier != old_tier && state == HostState::Available {
                self.move_cpus(ip, old_tier, new_tier);
            }
            self.store_load(ip, ld1, ld5, ld10);
        }
    }

    /// Move every free CPU entry of a host between tiers.
    pub fn move_cpus(&mut self, ip: Ipv4Addr, old_tier: i32, new_tier: i32) {
        let moved = self.del_cpus(old_tier, ip);
        if moved > 0 {
            self.add_cpus(new_tier, ip, moved as u32);
            tracing::debug!(host = %ip, old_tier, new_tier, moved, "Moved CPUs between tiers");
        }
    }

    /// Demote every host that has gone quiet. Returns the number demoted.
    pub fn sweep_silent(&mut self) -> usize {
        let down: Vec<Ipv4Addr> = self
            .hosts
            .values()
            .filter(|host| host.state != HostState::Silent && host.seems_down())
            .map(|host| host.ip)
            .collect();
        for ip in &down {
            tracing::info!(host = %ip, "Host went silent");
            self.set_silent(*ip);
        }
        down.len()
    }

    /// Snapshot and reset the period counters.
    pub fn take_stats(&mut self) -> Stats {
        let stats = Stats {
            served: self.served,
            peak: self.peak,
            total_cpus: self.total_free() + self.assigned.len(),
        };
        self.served = 0;
        self.peak = 0;
        stats
    }

    /// Render the monitor snapshot: one `H:` line per known host in ascending
    /// IP order, then one `C <tier>:` line per non-empty tier in ascending
    /// tier order, free CPUs coalesced per host IP.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for host in self.hosts.values() {
            let _ = writeln!(out, "H: {} {}", host.ip, host.state.as_int());
        }
        for (tier, cpus) in &self.avail_cpus {
            if cpus.is_empty() {
                continue;
            }
            let mut sorted = cpus.clone();
            sorted.sort();
            let _ = write!(out, "C {}: ", tier);
            let mut runs: Vec<(Ipv4Addr, usize)> = Vec::new();
            for ip in sorted {
                match runs.last_mut() {
                    Some((current, count)) if *current == ip => *count += 1,
                    _ => runs.push((ip, 1)),
                }
            }
            for (ip, count) in runs {
                let _ = write!(out, "{}/{} ", ip, count);
            }
            out.push('\n');
        }
        out
    }

    /// Log the whole store at debug level.
    pub fn dump(&self) {
        tracing::debug!(
            hosts = self.hosts.len(),
            free = self.total_free(),
            assigned = self.assigned.len(),
            "Inventory"
        );
        for host in self.hosts.values() {
            tracing::debug!(
                host = %host.ip,
                state = %host.state,
                tier = host.tier(),
                num_cpus = host.num_cpus,
                power_index = host.power_index,
                "Known host"
            );
        }
        for (tier, cpus) in self.avail_cpus.iter().rev() {
            tracing::debug!(tier, free = cpus.len(), "Tier");
        }
    }

    /// Free CPU entries a host currently has in a tier.
    pub fn free_count(&self, tier: i32, ip: Ipv4Addr) -> usize {
        self.avail_cpus
            .get(&tier)
            .map(|cpus| cpus.iter().filter(|cpu| **cpu == ip).count())
            .unwrap_or(0)
    }

    /// Free CPU entries in a tier across all hosts.
    pub fn tier_free(&self, tier: i32) -> usize {
        self.avail_cpus.get(&tier).map(Vec::len).unwrap_or(0)
    }

    /// Free CPU entries across all tiers.
    pub fn total_free(&self) -> usize {
        self.avail_cpus.values().map(Vec::len).sum()
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assigned
    }

    /// Whether a host is a member of the given state-indexed set.
    pub fn in_state_set(&self, state: HostState, ip: Ipv4Addr) -> bool {
        match state {
            HostState::Available => self.avail_hosts.contains(&ip),
            HostState::Unavailable => self.unavail_hosts.contains(&ip),
            HostState::Overloaded => self.overloaded_hosts.contains(&ip),
            HostState::Silent => self.silent_hosts.contains(&ip),
        }
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    fn store_load(&mut self, ip: Ipv4Addr, ld1: f32, ld5: f32, ld10: f32) {
        if let Some(host) = self.hosts.get_mut(&ip) {
            host.set_load(ld1, ld5, ld10);
        }
    }

    fn state_set(&mut self, state: HostState) -> &mut BTreeSet<Ipv4Addr> {
        match state {
            HostState::Available => &mut self.avail_hosts,
            HostState::Unavailable => &mut self.unavail_hosts,
            HostState::Overloaded => &mut self.overloaded_hosts,
            HostState::Silent => &mut self.silent_hosts,
        }
    }

    fn add_cpus(&mut self, tier: i32, ip: Ipv4Addr, count: u32) {
        let cpus = self.avail_cpus.entry(tier).or_default();
        cpus.extend(std::iter::repeat(ip).take(count as usize));
    }

    fn del_cpus(&mut self, tier: i32, ip: Ipv4Addr) -> usize {
        let Some(cpus) = self.avail_cpus.get_mut(&tier) else {
            return 0;
        };
        let before = cpus.len();
        cpus.retain(|cpu| *cpu != ip);
        let removed = before - cpus.len();
        if cpus.is_empty() {
            self.avail_cpus.remove(&tier);
        }
        removed
    }
}
