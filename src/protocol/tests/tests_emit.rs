#[cfg(test)]
mod tests {
    use crate::disk::MAX_OBJECT_SIZE;
    use crate::object::Replica;
    use crate::placement::Placement;
    use crate::protocol::EventWriter;
    use crate::scheduler::{Action, HeadPlan};

    fn capture(emit: impl FnOnce(&mut EventWriter<&mut Vec<u8>>)) -> String {
        let mut buffer = Vec::new();
        {
            let mut writer = EventWriter::new(&mut buffer);
            emit(&mut writer);
        }
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn ack_and_timestamp_echo() {
        let out = capture(|w| {
            w.ack_init().unwrap();
            w.echo_timestamp(17).unwrap();
        });
        assert_eq!(out, "OK\nTIMESTAMP 17\n");
    }

    #[test]
    fn id_lists_are_sorted_with_a_count() {
        let out = capture(|w| w.id_list(&[30, 10, 20]).unwrap());
        assert_eq!(out, "3\n10\n20\n30\n");

        let out = capture(|w| w.id_list(&[]).unwrap());
        assert_eq!(out, "0\n");
    }

    #[test]
    fn placement_blocks_follow_the_wire_shape() {
        let mut positions = [0u32; MAX_OBJECT_SIZE + 1];
        positions[1] = 4;
        positions[2] = 6;
        let placement = Placement {
            object_id: 9,
            size: 2,
            replicas: [
                Replica::new(1, 0, positions, 2),
                Replica::new(2, 0, positions, 2),
                Replica::new(3, 0, positions, 2),
            ],
        };
        let out = capture(|w| w.placements(&[placement]).unwrap());
        assert_eq!(out, "9\n1 4 6\n2 4 6\n3 4 6\n");
    }

    #[test]
    fn head_plans_are_disk_major() {
        let plans = vec![
            [
                HeadPlan {
                    actions: vec![Action::Read, Action::Pass, Action::Read],
                },
                HeadPlan::default(),
            ],
            [HeadPlan::jump(5), HeadPlan::default()],
        ];
        let out = capture(|w| w.head_plans(&plans).unwrap());
        assert_eq!(out, "rpr#\n#\nj 5\n#\n");
    }

    #[test]
    fn gc_block_lists_swaps_per_disk() {
        let swaps = vec![vec![(7, 2), (5, 3)], vec![]];
        let out = capture(|w| w.gc_block(&swaps).unwrap());
        assert_eq!(out, "GARBAGE COLLECTION\n2\n7 2\n5 3\n0\n");
    }
}
