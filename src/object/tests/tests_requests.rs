#[cfg(test)]
mod tests {
    use crate::disk::MAX_OBJECT_SIZE;
    use crate::object::{ObjectRecord, Replica};

    fn positions(values: &[u32]) -> [u32; MAX_OBJECT_SIZE + 1] {
        let mut out = [0; MAX_OBJECT_SIZE + 1];
        out[1..=values.len()].copy_from_slice(values);
        out
    }

    fn record(size: u8) -> ObjectRecord {
        let replicas = [
            Replica::new(1, 0, positions(&[1, 2, 3, 4, 5][..size as usize]), size),
            Replica::new(2, 0, positions(&[5, 4, 3, 2, 1][..size as usize]), size),
            Replica::new(3, 0, positions(&[2, 1, 4, 3, 5][..size as usize]), size),
        ];
        ObjectRecord::new(9, size, 1, replicas)
    }

    #[test]
    fn replica_tracks_its_max_position() {
        let r = Replica::new(1, 0, positions(&[7, 3, 9]), 3);
        assert_eq!(r.max_position, 9);
        assert_eq!(r.position_of(2), 3);

        let mut moved = r;
        moved.positions[3] = 2;
        moved.recompute_max(3);
        assert_eq!(moved.max_position, 7);
    }

    #[test]
    fn single_block_object_completes_on_first_serve() {
        let mut o = record(1);
        o.add_read(100, 1);
        assert_eq!(o.pending_on(1), 1);

        let (served, completed) = o.serve_block(1);
        assert_eq!(served, 1);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, 100);
        assert_eq!(o.pending_on(1), 0);
        assert!(!o.has_reads());
    }

    #[test]
    fn completion_needs_every_block() {
        let mut o = record(3);
        o.add_read(100, 1);

        let (_, completed) = o.serve_block(2);
        assert!(completed.is_empty());
        let (_, completed) = o.serve_block(1);
        assert!(completed.is_empty());
        let (served, completed) = o.serve_block(3);
        assert_eq!(served, 1);
        assert_eq!(completed.len(), 1);
        assert!(completed[0].is_complete(3));
    }

    #[test]
    fn serving_a_block_twice_serves_nothing_new() {
        let mut o = record(2);
        o.add_read(100, 1);
        let (served, _) = o.serve_block(1);
        assert_eq!(served, 1);
        // Second read of the same block: all requests already covered.
        let (served, completed) = o.serve_block(1);
        assert_eq!(served, 0);
        assert!(completed.is_empty());
        assert_eq!(o.pending_on(1), 0);
        assert_eq!(o.pending_on(2), 1);
    }

    #[test]
    fn requests_progress_independently() {
        let mut o = record(2);
        o.add_read(100, 1);
        o.serve_block(1);
        o.add_read(101, 2);
        assert_eq!(o.pending_on(1), 1);
        assert_eq!(o.pending_on(2), 2);

        // Block 2 completes the old request but not the new one.
        let (served, completed) = o.serve_block(2);
        assert_eq!(served, 2);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, 100);
        assert_eq!(o.reads.len(), 1);
    }

    #[test]
    fn remove_read_rolls_back_unread_blocks_only() {
        let mut o = record(3);
        o.add_read(100, 1);
        o.add_read(101, 1);
        o.serve_block(2);

        let removed = o.remove_read(100).unwrap();
        assert!(removed.has_read(2));
        assert_eq!(o.pending_on(1), 1);
        assert_eq!(o.pending_on(2), 1);
        assert_eq!(o.pending_on(3), 1);

        assert!(o.remove_read(100).is_none());
    }
}
