//! # Lifecycle Module
//!
//! The four cross-cutting request life events. Each one keeps the object
//! table, the per-cell / per-slice pending counters of all three replica
//! disks, and the three slice gain logs in lockstep:
//!
//! - [`register_read`] — a read request enters the system;
//! - [`serve_block`] — a head read one block, propagate across replicas
//!   and collect completions;
//! - [`retire_read`] — a request is abandoned or timed out;
//! - [`delete_object`] — the object and all its requests leave.
//!
//! A request leaves through exactly one of completion, retirement, or
//! parent deletion, so each id appears in exactly one of the driver's
//! output streams.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use crate::disk::Disk;
use crate::object::ObjectTable;
use tracing::{debug, trace};

fn disk_mut(disks: &mut [Disk], id: u32) -> &mut Disk {
    &mut disks[(id - 1) as usize]
}

/// Registers a read request against its object.
///
/// Every block of all three replicas becomes pending for it, and the
/// request is recorded in the gain bucket of each replica's slice.
pub fn register_read(
    disks: &mut [Disk],
    objects: &mut ObjectTable,
    request: u32,
    object_id: u32,
    now: u32,
) {
    let Some(record) = objects.get_mut(object_id) else {
        debug!(request, object_id, "read for an unknown object ignored");
        return;
    };
    record.add_read(request, now);
    let (size, replicas) = (record.size, record.replicas);

    for replica in &replicas {
        let disk = disk_mut(disks, replica.disk);
        for block in 1..=size {
            disk.add_pending(replica.position_of(block), 1);
        }
        disk.slices[replica.slice as usize]
            .gain
            .record(now, u32::from(size));
    }

    objects.set_owner(request, object_id);
    objects.mark_active(object_id);
    trace!(request, object_id, "read registered");
}

/// Applies one block read to an object, mirroring the served requests
/// onto the matching cells of all three replicas.
///
/// Returns the ids of the requests this read completed. Reading a block
/// nobody waits for is a tolerated no-op.
pub fn serve_block(
    disks: &mut [Disk],
    objects: &mut ObjectTable,
    object_id: u32,
    block: u8,
) -> Vec<u32> {
    let Some(record) = objects.get_mut(object_id) else {
        // Raced with a deletion this tick; tolerated silently.
        return Vec::new();
    };
    let size = record.size;
    let replicas = record.replicas;
    let (served, completed) = record.serve_block(block);
    let drained = !record.has_reads();

    if served > 0 {
        for replica in &replicas {
            disk_mut(disks, replica.disk).sub_pending(replica.position_of(block), served);
        }
    }

    let mut completed_ids = Vec::with_capacity(completed.len());
    for read in &completed {
        for replica in &replicas {
            disk_mut(disks, replica.disk).slices[replica.slice as usize]
                .gain
                .remove(read.arrival, u32::from(size));
        }
        objects.clear_owner(read.id);
        completed_ids.push(read.id);
    }
    if drained {
        objects.mark_idle(object_id);
    }

    completed_ids
}

/// Abandons or times out one request, releasing its unread blocks.
///
/// Returns false when the request is no longer live (already completed,
/// retired, or deleted) — tolerated per the error-handling design.
pub fn retire_read(disks: &mut [Disk], objects: &mut ObjectTable, request: u32) -> bool {
    let Some(object_id) = objects.owner_of(request) else {
        return false;
    };
    let Some(record) = objects.get_mut(object_id) else {
        return false;
    };
    let size = record.size;
    let replicas = record.replicas;
    let Some(read) = record.remove_read(request) else {
        return false;
    };
    let drained = !record.has_reads();

    for replica in &replicas {
        let disk = disk_mut(disks, replica.disk);
        for block in 1..=size {
            if !read.has_read(block) {
                disk.sub_pending(replica.position_of(block), 1);
            }
        }
        disk.slices[replica.slice as usize]
            .gain
            .remove(read.arrival, u32::from(size));
    }

    objects.clear_owner(request);
    if drained {
        objects.mark_idle(object_id);
    }
    trace!(request, object_id, "read retired");
    true
}

/// Deletes an object: frees its cells on all three replicas and cancels
/// its outstanding requests.
///
/// Returns the cancelled request ids.
pub fn delete_object(
    disks: &mut [Disk],
    objects: &mut ObjectTable,
    object_id: u32,
) -> Vec<u32> {
    let Some(record) = objects.remove(object_id) else {
        return Vec::new();
    };

    let mut cancelled = Vec::with_capacity(record.reads.len());
    for read in &record.reads {
        for replica in &record.replicas {
            disk_mut(disks, replica.disk).slices[replica.slice as usize]
                .gain
                .remove(read.arrival, u32::from(record.size));
        }
        objects.clear_owner(read.id);
        cancelled.push(read.id);
    }

    for replica in &record.replicas {
        let disk = disk_mut(disks, replica.disk);
        for block in 1..=record.size {
            disk.erase_cell(replica.position_of(block));
        }
    }

    debug!(
        object_id,
        cancelled = cancelled.len(),
        "object deleted"
    );
    cancelled
}
