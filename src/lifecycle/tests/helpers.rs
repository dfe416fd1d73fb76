//! Shared fixture: three small disks and hand-placed objects.

use crate::disk::{Disk, MAX_OBJECT_SIZE};
use crate::object::{ObjectRecord, ObjectTable, Replica};

/// Three disks of 20 cells, slices of 10, three tags.
pub fn disks() -> Vec<Disk> {
    (1..=3).map(|id| Disk::new(id, 20, 10, 3)).collect()
}

/// Places `size` blocks of object `id` at `start..start+size` on every
/// disk and inserts the record.
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

pub fn check_all(disks: &[Disk]) {
    for disk in disks {
        disk.check_consistency().unwrap();
    }
}
