//! # GC Module
//!
//! Periodic intra-slice compaction. Every collection window the
//! controller walks each disk, skips slices that are empty or currently
//! under a head, and pairs the *i*-th empty cell from the slice start
//! with the *i*-th occupied cell from the slice end — a pair is a
//! candidate swap only while the empty cell sits in front of the
//! occupied one. Candidates are ranked by their slice's gain (hotter
//! slices compact first, ties by position) and applied up to the
//! per-disk swap limit.
//!
//! A swap moves the occupied cell's content into the empty cell of the
//! same slice, so slice aggregates are untouched; only the owning
//! object's replica positions (and their `max_position`) change.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;

use tracing::debug;

use crate::disk::Disk;
use crate::gain::GainCurve;
use crate::object::ObjectTable;

/// Ticks between collections.
pub const GC_PERIOD: u32 = 1800;

/// One planned swap: occupied source, empty destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Swap {
    from: u32,
    to: u32,
}

/// Runs one collection over every disk.
///
/// Returns, per disk, the applied `(from, to)` swaps in application
/// order — the shape the wire block wants.
pub fn collect(
    disks: &mut [Disk],
    objects: &mut ObjectTable,
    swap_limit: usize,
    now: u32,
    curve: &GainCurve,
) -> Vec<Vec<(u32, u32)>> {
    let mut all_swaps = Vec::with_capacity(disks.len());
    for disk in disks.iter_mut() {
        let applied = collect_disk(disk, objects, swap_limit, now, curve);
        debug!(disk = disk.id, swaps = applied.len(), "gc pass");
        all_swaps.push(applied);
    }
    all_swaps
}

fn collect_disk(
    disk: &mut Disk,
    objects: &mut ObjectTable,
    swap_limit: usize,
    now: u32,
    curve: &GainCurve,
) -> Vec<(u32, u32)> {
    if swap_limit == 0 {
        return Vec::new();
    }

    // Candidate pass over a static snapshot of the slices.
    let mut candidates: Vec<(f64, Swap)> = Vec::new();
    for index in 0..disk.slices.len() {
        let slice = &disk.slices[index];
        let occupied_count = slice.cell_count() - slice.empty_cells;
        if occupied_count == 0 || disk.head_in_slice(index) {
            continue;
        }

        let empties: Vec<u32> = (slice.start..=slice.end)
            .filter(|&p| disk.cells[p as usize].is_empty())
            .collect();
        let occupied: Vec<u32> = (slice.start..=slice.end)
            .rev()
            .filter(|&p| !disk.cells[p as usize].is_empty())
            .collect();

        let gain = disk.slice_gain(index, now, curve);
        for (&to, &from) in empties.iter().zip(occupied.iter()) {
            if to >= from {
                break;
            }
            candidates.push((gain, Swap { from, to }));
        }
    }

    candidates.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.from.cmp(&b.1.from))
    });
    candidates.truncate(swap_limit);

    let mut touched: Vec<u32> = Vec::new();
    let mut applied = Vec::with_capacity(candidates.len());
    for (_, swap) in candidates {
        let cell = disk.cells[swap.from as usize];
        disk.move_cell(swap.from, swap.to);

        if let Some(record) = objects.get_mut(cell.object_id) {
            if let Some(replica) = record
                .replicas
                .iter_mut()
                .find(|r| r.disk == disk.id && r.positions[cell.block_index as usize] == swap.from)
            {
                replica.positions[cell.block_index as usize] = swap.to;
            }
            touched.push(cell.object_id);
        }
        applied.push((swap.from, swap.to));
    }

    // Replica extents are only refreshed once the dust settles.
    touched.sort_unstable();
    touched.dedup();
    for object_id in touched {
        if let Some(record) = objects.get_mut(object_id) {
            let size = record.size;
            for replica in &mut record.replicas {
                if replica.disk == disk.id {
                    replica.recompute_max(size);
                }
            }
        }
    }

    applied
}
