//! # Controller Module
//!
//! The single owning structure of the whole system and the per-tick
//! orchestration. Everything mutable lives here — disks, the object
//! table, the group plan, the seeded RNG, the per-tag rate windows —
//! and every subsystem works on the pieces it is handed, so there is no
//! module-level state anywhere in the crate.
//!
//! ## Tick order
//!
//! Fixed, per the driver contract:
//!
//! 1. timestamp align (echo);
//! 2. deletes → cancelled-request list;
//! 3. writes → placement blocks;
//! 4. reads (admission filter) → head planning + execution → per-head
//!    action strings and the completion list;
//! 5. timeout oracle → busy list (rejected + reaped);
//! 6. per-disk window advance;
//! 7. on every 1800th tick, the GC exchange.
//!
//! Only the current tick's handlers mutate state; planning reads see
//! this tick's deletions and placements already applied.
//!
//! ## Timeout oracle
//!
//! A request is reaped when it hits the hard 105-tick lifetime, when the
//! estimated time-to-serve of its object says the deadline is already
//! lost, or when its tag's recent abandonment rate is past the
//! configured threshold. Reaped and admission-rejected requests share
//! the busy list.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::io::{BufRead, Write};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use crate::disk::{Disk, HEADS_PER_DISK, MAX_OBJECT_SIZE};
use crate::gain::{GainCurve, RateWindow};
use crate::gc;
use crate::lifecycle;
use crate::object::{ObjectRecord, ObjectTable, Replica};
use crate::placement::{self, GroupPlan, Placement, PlacementError};
use crate::protocol::{
    EventReader, EventWriter, FrequencyTables, InitParams, ProtocolError, ReadEvent, WriteRequest,
};
use crate::scheduler::{self, HeadPlan};

pub use crate::gc::GC_PERIOD;

/// Ticks a read request may live before it counts as lost.
pub const REQUEST_LIFETIME: u32 = 105;

/// Event-free tail appended to the run so late requests can drain.
pub const EXTRA_TICKS: u32 = 105;

/// Cost of reading all blocks of an object from a fresh chain, by size.
const FINISH_COST: [u32; MAX_OBJECT_SIZE + 1] = [0, 64, 116, 158, 192, 220];

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors that end the run.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Fatal framing violation on the driver stream.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The write strategy ran out of room.
    #[error("placement error: {0}")]
    Placement(#[from] PlacementError),

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal invariant violation; should be unreachable.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Controller configuration: the driver's init parameters plus the
/// tunables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Event-bearing ticks (T); the run lasts `tick_count + 105`.
    pub tick_count: u32,
    /// Number of object tags (M).
    pub tag_count: u32,
    /// Number of disks (N); at least three.
    pub disk_count: u32,
    /// Cells per disk (V).
    pub disk_capacity: u32,
    /// Token budget per head per tick (G).
    pub token_budget: u32,
    /// Maximum GC swaps per disk per collection (K).
    pub gc_swap_limit: u32,
    /// Slice partition override; derived from V and M when `None`.
    pub slice_size: Option<u32>,
    /// Seed of the one RNG in the system.
    pub seed: u64,
    /// Tag abandonment rate past which the oracle reaps outright (τ).
    pub abandon_rate_threshold: f64,
    /// Tag abandonment rate past which admission turns probabilistic.
    pub admission_rate_threshold: f64,
    /// Per-time-block budget bonus g[·]; missing entries read as zero.
    pub token_bonus: Vec<u32>,
}

impl ControllerConfig {
    /// Configuration for the driver's init parameters with default
    /// tunables.
    pub fn from_init(params: InitParams) -> Self {
        Self {
            tick_count: params.tick_count,
            tag_count: params.tag_count,
            disk_count: params.disk_count,
            disk_capacity: params.disk_capacity,
            token_budget: params.token_budget,
            gc_swap_limit: params.gc_swap_limit,
            slice_size: None,
            seed: 0x7361_6c74,
            abandon_rate_threshold: 0.015,
            admission_rate_threshold: 0.02,
            token_bonus: Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), ControllerError> {
        let fail = |message: String| Err(ControllerError::Config(message));
        if self.disk_count < 3 {
            return fail(format!("need at least 3 disks, got {}", self.disk_count));
        }
        if !(1..=63).contains(&self.tag_count) {
            return fail(format!("tag count {} outside 1..=63", self.tag_count));
        }
        if self.disk_capacity == 0 {
            return fail("disk capacity must be positive".into());
        }
        if self.token_budget == 0 {
            return fail("token budget must be positive".into());
        }
        if let Some(size) = self.slice_size {
            if !(1..=self.disk_capacity).contains(&size) {
                return fail(format!("slice size {size} outside 1..=V"));
            }
        }
        for (name, value) in [
            ("abandon rate threshold", self.abandon_rate_threshold),
            ("admission rate threshold", self.admission_rate_threshold),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return fail(format!("{name} {value} outside (0, 1)"));
            }
        }
        Ok(())
    }

    /// The slice partition: one slice per tag where capacity allows,
    /// never smaller than the largest object, never larger than a disk.
    fn resolved_slice_size(&self) -> u32 {
        self.slice_size.unwrap_or_else(|| {
            self.disk_capacity
                .div_ceil(self.tag_count)
                .max(MAX_OBJECT_SIZE as u32)
                .min(self.disk_capacity)
        })
    }

    /// Number of per-tag time blocks (F).
    pub fn time_blocks(&self) -> usize {
        self.tick_count.div_ceil(GC_PERIOD).max(1) as usize
    }
}

// ------------------------------------------------------------------------------------------------
// Controller
// ------------------------------------------------------------------------------------------------

/// The replicated block-storage controller.
pub struct Controller {
    config: ControllerConfig,
    freq: FrequencyTables,
    disks: Vec<Disk>,
    objects: ObjectTable,
    groups: GroupPlan,
    curve: GainCurve,
    rng: StdRng,
    tag_rates: Vec<RateWindow>,
    tick: u32,
}

impl Controller {
    /// Builds a controller from a validated configuration.
    pub fn new(
        config: ControllerConfig,
        freq: FrequencyTables,
    ) -> Result<Self, ControllerError> {
        config.validate()?;

        let slice_size = config.resolved_slice_size();
        let disks: Vec<Disk> = (1..=config.disk_count)
            .map(|id| Disk::new(id, config.disk_capacity, slice_size, config.tag_count as usize))
            .collect();
        let slice_count = disks[0].slices.len() as u32;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let groups = placement::plan_groups(config.disk_count, slice_count, &mut rng);
        let tag_rates = (0..=config.tag_count).map(|_| RateWindow::new()).collect();

        info!(
            disks = config.disk_count,
            capacity = config.disk_capacity,
            slice_size,
            slice_count,
            groups = groups.len(),
            "controller ready"
        );
        Ok(Self {
            config,
            freq,
            disks,
            objects: ObjectTable::new(),
            groups,
            curve: GainCurve::new(),
            rng,
            tag_rates,
            tick: 0,
        })
    }

    /// Reads the init exchange from the driver and builds the
    /// controller. The caller still owes the driver the `OK`.
    pub fn bootstrap<R: BufRead>(
        reader: &mut EventReader<R>,
    ) -> Result<Self, ControllerError> {
        let (params, freq) = reader.read_init()?;
        Self::new(ControllerConfig::from_init(params), freq)
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    /// Current per-tag time block, 1-based.
    fn time_block(&self) -> usize {
        ((self.tick.max(1) - 1) / GC_PERIOD) as usize + 1
    }

    /// This tick's per-head token budget: G plus the block bonus.
    pub fn head_budget(&self) -> u32 {
        let bonus = self
            .config
            .token_bonus
            .get(self.time_block() - 1)
            .copied()
            .unwrap_or(0);
        self.config.token_budget + bonus
    }

    // --------------------------------------------------------------------------------------------
    // Tick phases
    // --------------------------------------------------------------------------------------------

    /// Advances to the next tick, cross-checking the driver's counter.
    pub fn begin_tick(&mut self, driver_tick: u32) -> Result<(), ControllerError> {
        self.tick += 1;
        if driver_tick != self.tick {
            return Err(ProtocolError::TimestampMismatch {
                expected: self.tick,
                received: driver_tick,
            }
            .into());
        }
        Ok(())
    }

    /// Applies a delete batch; returns the cancelled request ids.
    pub fn apply_deletes(&mut self, object_ids: &[u32]) -> Vec<u32> {
        let mut cancelled = Vec::new();
        for &object_id in object_ids {
            cancelled.extend(lifecycle::delete_object(
                &mut self.disks,
                &mut self.objects,
                object_id,
            ));
        }
        cancelled
    }

    /// Places and commits a write batch.
    pub fn place_writes(
        &mut self,
        batch: &[WriteRequest],
    ) -> Result<Vec<Placement>, ControllerError> {
        for request in batch {
            if request.id == 0 {
                return Err(ProtocolError::OutOfRange("object id 0".into()).into());
            }
            if !(1..=self.config.tag_count).contains(&u32::from(request.tag)) {
                return Err(ProtocolError::OutOfRange(format!(
                    "object {} has tag {}",
                    request.id, request.tag
                ))
                .into());
            }
        }
        let block = self.time_block();
        let placements = placement::place_batch(
            batch,
            &mut self.disks,
            &mut self.objects,
            &self.groups,
            &self.freq,
            block,
        )?;
        Ok(placements)
    }

    /// Runs the pre-admission filter and registers the survivors.
    ///
    /// Returns the rejected request ids — they go straight to this
    /// tick's busy list without ever being registered.
    pub fn admit_reads(&mut self, events: &[ReadEvent]) -> Vec<u32> {
        let now = self.tick;
        let threshold = self.config.admission_rate_threshold;
        let hot: Vec<[Option<u32>; 2]> = self
            .disks
            .iter()
            .map(|disk| hottest_slices(disk, now, &self.curve))
            .collect();

        let mut rejected = Vec::new();
        for event in events {
            let Some((tag, replicas)) = self
                .objects
                .get(event.object_id)
                .map(|record| (record.tag as usize, record.replicas))
            else {
                // Object already gone (deleted earlier this tick);
                // tolerated, the request is just busy.
                rejected.push(event.request_id);
                continue;
            };

            self.tag_rates[tag].note_arrival(now);
            let rate = self.tag_rates[tag].rate(now);
            if rate > threshold && !any_replica_hot(&replicas, &hot) {
                let admit_probability = (1.0 / (100.0 * rate)).min(1.0);
                if self.rng.random::<f64>() >= admit_probability {
                    self.tag_rates[tag].note_abandoned(now);
                    rejected.push(event.request_id);
                    continue;
                }
            }

            lifecycle::register_read(
                &mut self.disks,
                &mut self.objects,
                event.request_id,
                event.object_id,
                now,
            );
        }
        rejected
    }

    /// Plans and executes all heads; returns the emitted plans and the
    /// completed request ids.
    pub fn run_heads(&mut self) -> (Vec<[HeadPlan; HEADS_PER_DISK]>, Vec<u32>) {
        let budget = self.head_budget();
        let (plans, mut completed) = scheduler::plan_tick(
            &mut self.disks,
            &mut self.objects,
            &self.curve,
            self.tick,
            budget,
        );
        completed.sort_unstable();
        (plans, completed)
    }

    /// The timeout oracle: reaps expired, doomed, and rate-abandoned
    /// requests. Returns them ascending.
    pub fn reap_expired(&mut self) -> Vec<u32> {
        let now = self.tick;
        let budget = self.head_budget();
        let lifetime = i64::from(REQUEST_LIFETIME);
        let tau = self.config.abandon_rate_threshold;

        let mut busy = Vec::new();
        let active: Vec<u32> = self.objects.active_objects().collect();
        for object_id in active {
            let Some(record) = self.objects.get(object_id) else {
                continue;
            };
            let tag = record.tag as usize;
            let ets = i64::from(estimate_time_to_serve(record, &self.disks, budget));
            let hopeless = self.tag_rates[tag].rate(now) > tau;

            let doomed: Vec<u32> = record
                .reads
                .iter()
                .filter(|read| {
                    let age = i64::from(now) - i64::from(read.arrival);
                    age >= lifetime || lifetime - ets < age || hopeless
                })
                .map(|read| read.id)
                .collect();

            for request in doomed {
                if lifecycle::retire_read(&mut self.disks, &mut self.objects, request) {
                    self.tag_rates[tag].note_abandoned(now);
                    busy.push(request);
                }
            }
        }
        if !busy.is_empty() {
            debug!(tick = now, reaped = busy.len(), "requests reaped");
        }
        busy.sort_unstable();
        busy
    }

    /// End-of-tick window advance: prunes gain and rate buckets.
    pub fn advance_window(&mut self) {
        let now = self.tick;
        for disk in &mut self.disks {
            disk.advance_window(now);
        }
        for window in &mut self.tag_rates {
            window.prune(now);
        }
    }

    pub fn is_gc_tick(&self) -> bool {
        self.tick % GC_PERIOD == 0
    }

    /// Runs one garbage collection over every disk.
    pub fn collect_garbage(&mut self) -> Vec<Vec<(u32, u32)>> {
        gc::collect(
            &mut self.disks,
            &mut self.objects,
            self.config.gc_swap_limit as usize,
            self.tick,
            &self.curve,
        )
    }

    // --------------------------------------------------------------------------------------------
    // Protocol loop
    // --------------------------------------------------------------------------------------------

    /// Drives the full `T + 105` tick exchange.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        reader: &mut EventReader<R>,
        writer: &mut EventWriter<W>,
    ) -> Result<(), ControllerError> {
        let total = self.config.tick_count + EXTRA_TICKS;
        for _ in 0..total {
            let driver_tick = reader.read_timestamp()?;
            self.begin_tick(driver_tick)?;
            writer.echo_timestamp(self.tick)?;

            let deletes = reader.read_delete_ids()?;
            let cancelled = self.apply_deletes(&deletes);
            writer.id_list(&cancelled)?;

            let writes = reader.read_write_requests()?;
            let placements = self.place_writes(&writes)?;
            writer.placements(&placements)?;

            let reads = reader.read_read_events()?;
            let rejected = self.admit_reads(&reads);
            let (plans, completed) = self.run_heads();
            writer.head_plans(&plans)?;
            writer.id_list(&completed)?;

            let mut busy = self.reap_expired();
            busy.extend(rejected);
            writer.id_list(&busy)?;

            self.advance_window();

            if self.is_gc_tick() {
                reader.read_gc_request()?;
                let swaps = self.collect_garbage();
                writer.gc_block(&swaps)?;
            }
        }
        info!(ticks = total, "run complete");
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Diagnostics
    // --------------------------------------------------------------------------------------------

    /// Re-derives every quantified invariant; used by tests at tick
    /// boundaries.
    pub fn check_invariants(&self) -> Result<(), String> {
        for disk in &self.disks {
            disk.check_consistency()?;
        }
        for record in self.objects.iter() {
            check_object(record, &self.disks)?;
            for read in &record.reads {
                if self.objects.owner_of(read.id) != Some(record.id) {
                    return Err(format!(
                        "request {} not indexed to object {}",
                        read.id, record.id
                    ));
                }
            }
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Free helpers
// ------------------------------------------------------------------------------------------------

/// Indices of the two highest-gain slices of a disk; zero-gain slices
/// never count as hot.
fn hottest_slices(disk: &Disk, now: u32, curve: &GainCurve) -> [Option<u32>; 2] {
    let mut best: [Option<(f64, u32)>; 2] = [None, None];
    for (index, slice) in disk.slices.iter().enumerate() {
        let gain = slice.gain.value(now, curve);
        if gain <= 0.0 {
            continue;
        }
        let candidate = (gain, index as u32);
        if best[0].is_none_or(|top| candidate.0 > top.0) {
            best[1] = best[0];
            best[0] = Some(candidate);
        } else if best[1].is_none_or(|second| candidate.0 > second.0) {
            best[1] = Some(candidate);
        }
    }
    [best[0].map(|(_, i)| i), best[1].map(|(_, i)| i)]
}

/// True when any replica sits in a top-2 slice of its disk.
fn any_replica_hot(replicas: &[Replica], hot: &[[Option<u32>; 2]]) -> bool {
    replicas.iter().any(|replica| {
        hot[(replica.disk - 1) as usize]
            .iter()
            .any(|slot| *slot == Some(replica.slice))
    })
}

/// Estimated ticks before some head reaches and finishes this object:
/// zero when a head is already inside a replica's slice, otherwise one
/// tick to jump plus the budget-paced walk to the replica's far block.
fn estimate_time_to_serve(record: &ObjectRecord, disks: &[Disk], budget: u32) -> u32 {
    record
        .replicas
        .iter()
        .map(|replica| {
            let disk = &disks[(replica.disk - 1) as usize];
            let slice = &disk.slices[replica.slice as usize];
            if disk.heads.iter().any(|head| slice.contains(head.position)) {
                return 0;
            }
            let finish = FINISH_COST[record.size as usize];
            let distance = replica.max_position - slice.start;
            1 + (finish + distance).div_ceil(budget)
        })
        .min()
        .unwrap_or(u32::MAX)
}

fn check_object(record: &ObjectRecord, disks: &[Disk]) -> Result<(), String> {
    let mut seen_disks = vec![false; disks.len()];
    for replica in &record.replicas {
        let index = (replica.disk - 1) as usize;
        if index >= disks.len() {
            return Err(format!("object {}: replica on unknown disk", record.id));
        }
        if std::mem::replace(&mut seen_disks[index], true) {
            return Err(format!("object {}: replicas share disk {}", record.id, replica.disk));
        }
        let disk = &disks[index];
        let slice = &disk.slices[replica.slice as usize];
        for block in 1..=record.size {
            let position = replica.position_of(block);
            if !slice.contains(position) {
                return Err(format!(
                    "object {}: block {block} outside its slice",
                    record.id
                ));
            }
            let cell = &disk.cells[position as usize];
            if cell.object_id != record.id || cell.block_index != block {
                return Err(format!(
                    "object {}: cell {position} back-reference broken",
                    record.id
                ));
            }
            let waiting = record
                .reads
                .iter()
                .filter(|read| !read.has_read(block))
                .count() as u32;
            if waiting != record.pending[block as usize] || cell.pending != waiting {
                return Err(format!(
                    "object {}: block {block} pending count diverged",
                    record.id
                ));
            }
        }
    }
    Ok(())
}
