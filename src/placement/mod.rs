//! # Placement Module
//!
//! Decides where objects live. Two halves:
//!
//! 1. **Group planning** (init time): pick triples of distinct disks so
//!    that per-disk appearances are equal up to the slice budget and
//!    pairwise co-occurrences stay flat, then hand every triple one
//!    fresh slice per member disk (round-robin) and shuffle the result
//!    with the seeded RNG. Each `(disk, slice)` pair belongs to at most
//!    one group, so the three slices of a group always carry identical
//!    object multisets — which is what lets eligibility be checked on
//!    the first member alone.
//! 2. **Write strategy** (per batch): order requests by
//!    `(size, read frequency of the tag in the current time block, tag)`,
//!    rank the eligible groups by tag affinity and fill, and assign the
//!    per-block cells with a best-fit forward window inside each slice.
//!
//! Three distinct disks per object is a structural consequence of group
//! construction and is never re-checked per write.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, info};

use crate::disk::{Disk, MAX_OBJECT_SIZE};
use crate::object::{ObjectRecord, ObjectTable, REPLICA_COUNT, Replica};
use crate::protocol::{FrequencyTables, WriteRequest};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised by the write strategy.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// No group can hold the object — the driver overcommitted the
    /// store, which the protocol contract rules out.
    #[error("capacity exhausted: no group can hold object {id} of size {size}")]
    CapacityExhausted { id: u32, size: u8 },
}

// ------------------------------------------------------------------------------------------------
// Groups
// ------------------------------------------------------------------------------------------------

/// A pre-chosen placement destination: one slice on each of three
/// distinct disks.
#[derive(Debug, Clone, Copy)]
pub struct Group {
    /// `(disk id, slice index)` per member; disks are pairwise distinct.
    pub members: [(u32, u32); REPLICA_COUNT],
}

/// The immutable group list computed at init.
#[derive(Debug, Clone, Default)]
pub struct GroupPlan {
    pub groups: Vec<Group>,
}

impl GroupPlan {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Plans the group list for `disk_count` disks with `slice_count` slices
/// each.
///
/// Greedy selection: among the triples whose members are all under the
/// appearance cap, take the one with the lowest pairwise co-occurrence
/// sum, breaking ties by the lowest appearance sum and then by
/// enumeration order. The final shuffle removes the enumeration bias
/// from later placement decisions.
pub fn plan_groups(disk_count: u32, slice_count: u32, rng: &mut StdRng) -> GroupPlan {
    debug_assert!(disk_count >= REPLICA_COUNT as u32);

    let mut triples: Vec<[u32; 3]> = Vec::new();
    for a in 1..=disk_count {
        for b in a + 1..=disk_count {
            for c in b + 1..=disk_count {
                triples.push([a, b, c]);
            }
        }
    }

    let target = disk_count as usize * slice_count as usize / 3;
    let cap = slice_count;
    let n = disk_count as usize;
    let mut appearances = vec![0u32; n + 1];
    let mut co = vec![vec![0u32; n + 1]; n + 1];
    let mut chosen: Vec<[u32; 3]> = Vec::with_capacity(target);

    for _ in 0..target {
        let mut best: Option<(u64, u64, usize)> = None;
        for (index, triple) in triples.iter().enumerate() {
            let [a, b, c] = *triple;
            if triple.iter().any(|&d| appearances[d as usize] >= cap) {
                continue;
            }
            let co_sum = u64::from(co[a as usize][b as usize])
                + u64::from(co[a as usize][c as usize])
                + u64::from(co[b as usize][c as usize]);
            let app_sum: u64 = triple.iter().map(|&d| u64::from(appearances[d as usize])).sum();
            let key = (co_sum, app_sum, index);
            if best.is_none_or(|b| key < b) {
                best = Some(key);
            }
        }
        let Some((_, _, index)) = best else { break };
        let [a, b, c] = triples[index];
        for d in [a, b, c] {
            appearances[d as usize] += 1;
        }
        for (x, y) in [(a, b), (a, c), (b, c)] {
            co[x as usize][y as usize] += 1;
            co[y as usize][x as usize] += 1;
        }
        chosen.push([a, b, c]);
    }

    let mut next_slice = vec![0u32; n + 1];
    let mut groups: Vec<Group> = chosen
        .iter()
        .map(|triple| {
            let mut members = [(0u32, 0u32); REPLICA_COUNT];
            for (slot, &disk) in triple.iter().enumerate() {
                members[slot] = (disk, next_slice[disk as usize]);
                next_slice[disk as usize] += 1;
            }
            Group { members }
        })
        .collect();
    groups.shuffle(rng);

    info!(
        disk_count,
        slice_count,
        group_count = groups.len(),
        "group plan ready"
    );
    GroupPlan { groups }
}

// ------------------------------------------------------------------------------------------------
// Write strategy
// ------------------------------------------------------------------------------------------------

/// Committed placement of one object, in wire order.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub object_id: u32,
    pub size: u8,
    pub replicas: [Replica; REPLICA_COUNT],
}

/// Places a batch of write requests and commits them.
///
/// The returned placements are in **input order** regardless of the
/// internal processing order.
pub fn place_batch(
    batch: &[WriteRequest],
    disks: &mut [Disk],
    objects: &mut ObjectTable,
    plan: &GroupPlan,
    freq: &FrequencyTables,
    time_block: usize,
) -> Result<Vec<Placement>, PlacementError> {
    let mut order: Vec<usize> = (0..batch.len()).collect();
    order.sort_by_key(|&i| {
        let request = &batch[i];
        (
            request.size,
            freq.read_frequency(request.tag, time_block),
            request.tag,
        )
    });

    let mut placements: Vec<Option<Placement>> = vec![None; batch.len()];
    for i in order {
        let request = &batch[i];
        let placement = place_one(request, disks, objects, plan)?;
        placements[i] = Some(placement);
    }
    Ok(placements.into_iter().flatten().collect())
}

fn place_one(
    request: &WriteRequest,
    disks: &mut [Disk],
    objects: &mut ObjectTable,
    plan: &GroupPlan,
) -> Result<Placement, PlacementError> {
    let exhausted = || PlacementError::CapacityExhausted {
        id: request.id,
        size: request.size,
    };

    let group = plan
        .groups
        .iter()
        .enumerate()
        .filter(|(_, group)| {
            let (disk, slice) = group.members[0];
            disks[(disk - 1) as usize].slices[slice as usize].empty_cells >= u32::from(request.size)
        })
        .min_by_key(|&(index, group)| rank_key(disks, group, index, request.tag))
        .map(|(_, group)| *group)
        .ok_or_else(exhausted)?;

    let mut replicas = [Replica::new(1, 0, [0; MAX_OBJECT_SIZE + 1], 1); REPLICA_COUNT];
    for (slot, &(disk_id, slice)) in group.members.iter().enumerate() {
        let disk = &mut disks[(disk_id - 1) as usize];
        let positions =
            best_fit(disk, slice as usize, request.size).ok_or_else(exhausted)?;
        for block in 1..=request.size {
            disk.write_cell(
                positions[block as usize],
                request.id,
                request.size,
                request.tag,
                block,
            );
        }
        replicas[slot] = Replica::new(disk_id, slice, positions, request.size);
    }

    objects.insert(ObjectRecord::new(
        request.id,
        request.size,
        request.tag,
        replicas,
    ));
    debug!(
        object_id = request.id,
        size = request.size,
        tag = request.tag,
        disks = ?[replicas[0].disk, replicas[1].disk, replicas[2].disk],
        "object placed"
    );

    Ok(Placement {
        object_id: request.id,
        size: request.size,
        replicas,
    })
}

/// Layered ranking key over the eligible groups; smaller is better.
///
/// Tag already present in the reference slice: fewer distinct tags
/// first, then dominant slices packed dense (fewer empty cells) and
/// non-dominant ones kept roomy (more empty cells). Tag absent: unused
/// slices first, then the three disks carrying the tag on fewer slices,
/// then the group whose disks have more unused slices overall. Final tie
/// falls back to the (shuffled) group order.
fn rank_key(disks: &[Disk], group: &Group, index: usize, tag: u8) -> (u8, u64, u64, u64, usize) {
    let (ref_disk, ref_slice) = group.members[0];
    let slice = &disks[(ref_disk - 1) as usize].slices[ref_slice as usize];

    if slice.has_tag(tag) {
        let distinct = u64::from(slice.distinct_tags());
        if slice.is_dominant(tag) {
            (0, distinct, 0, u64::from(slice.empty_cells), index)
        } else {
            (0, distinct, 1, u64::from(u32::MAX - slice.empty_cells), index)
        }
    } else {
        let occupied = u64::from(!slice.is_unused());
        let tag_spread: u64 = group
            .members
            .iter()
            .map(|&(disk, _)| u64::from(disks[(disk - 1) as usize].tag_slices[tag as usize]))
            .sum();
        let unused: u64 = group
            .members
            .iter()
            .map(|&(disk, _)| {
                disks[(disk - 1) as usize]
                    .slices
                    .iter()
                    .filter(|s| s.is_unused())
                    .count() as u64
            })
            .sum();
        (1, occupied, tag_spread, u64::MAX - unused, index)
    }
}

/// Best-fit forward: the shortest window of the slice holding at least
/// `size` empty cells, filled from its start, skipping occupied cells.
fn best_fit(disk: &Disk, slice_index: usize, size: u8) -> Option<[u32; MAX_OBJECT_SIZE + 1]> {
    let slice = &disk.slices[slice_index];
    let needed = u32::from(size);

    let mut best: Option<(u32, u32)> = None;
    let mut left = slice.start;
    let mut empties = 0u32;
    for right in slice.start..=slice.end {
        if disk.cells[right as usize].is_empty() {
            empties += 1;
        }
        while empties >= needed {
            let length = right - left + 1;
            if best.is_none_or(|(b, _)| length < b) {
                best = Some((length, left));
            }
            if disk.cells[left as usize].is_empty() {
                empties -= 1;
            }
            left += 1;
        }
    }

    let (_, start) = best?;
    let mut positions = [0u32; MAX_OBJECT_SIZE + 1];
    let mut block = 1usize;
    let mut position = start;
    while block <= size as usize {
        debug_assert!(position <= slice.end);
        if disk.cells[position as usize].is_empty() {
            positions[block] = position;
            block += 1;
        }
        position += 1;
    }
    Some(positions)
}
