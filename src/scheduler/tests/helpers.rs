//! Local fixture: three disks with hand-placed objects and registered
//! reads.

use crate::disk::{Disk, MAX_OBJECT_SIZE};
use crate::lifecycle;
use crate::object::{ObjectRecord, ObjectTable, Replica};

/// Three disks of `capacity` cells with one slice per `slice_size`.
pub fn disks(capacity: u32, slice_size: u32) -> Vec<Disk> {
    (1..=3)
        .map(|id| Disk::new(id, capacity, slice_size, 3))
        .collect()
}

/// Places object `id` at the same `start..start+size` range on all
/// three disks and inserts its record.
pub fn place(
    disks: &mut [Disk],
    objects: &mut ObjectTable,
    id: u32,
    size: u8,
    tag: u8,
    start: u32,
) {
    let mut positions = [0u32; MAX_OBJECT_SIZE + 1];
    for block in 1..=size {
        positions[block as usize] = start + u32::from(block) - 1;
    }
    let mut replicas = [Replica::new(1, 0, positions, size); 3];
    for (index, disk) in disks.iter_mut().enumerate() {
        replicas[index] = Replica::new(disk.id, disk.slice_index(start) as u32, positions, size);
        for block in 1..=size {
            disk.write_cell(positions[block as usize], id, size, tag, block);
        }
    }
    objects.insert(ObjectRecord::new(id, size, tag, replicas));
}

/// Places and immediately registers a read against the object.
pub fn place_and_read(
    disks: &mut [Disk],
    objects: &mut ObjectTable,
    id: u32,
    size: u8,
    start: u32,
    request: u32,
    now: u32,
) {
    place(disks, objects, id, size, 1, start);
    lifecycle::register_read(disks, objects, request, id, now);
}
