#[cfg(test)]
mod tests {
    use super::super::helpers::{disks, place_and_read};
    use crate::object::ObjectTable;
    use crate::scheduler::{Action, plan_head};

    #[test]
    fn reads_the_cell_under_the_head_with_exact_budget() {
        let mut d = disks(10, 10);
        let mut objects = ObjectTable::new();
        place_and_read(&mut d, &mut objects, 1, 1, 1, 100, 1);

        let plan = plan_head(&d[0], 0, 64);
        assert_eq!(plan.actions, vec![Action::Read]);
    }

    #[test]
    fn unaffordable_read_yields_an_empty_plan() {
        let mut d = disks(10, 10);
        let mut objects = ObjectTable::new();
        place_and_read(&mut d, &mut objects, 1, 1, 1, 100, 1);

        let plan = plan_head(&d[0], 0, 63);
        assert!(plan.is_empty());
    }

    #[test]
    fn passes_bridge_to_a_distant_cell() {
        let mut d = disks(10, 10);
        let mut objects = ObjectTable::new();
        place_and_read(&mut d, &mut objects, 1, 1, 3, 100, 1);

        // Two passes then a read: 1 + 1 + 64 = 66.
        let plan = plan_head(&d[0], 0, 66);
        assert_eq!(plan.actions, vec![Action::Pass, Action::Pass, Action::Read]);

        let plan = plan_head(&d[0], 0, 65);
        assert!(plan.is_empty());
    }

    #[test]
    fn trailing_passes_are_trimmed() {
        let mut d = disks(10, 10);
        let mut objects = ObjectTable::new();
        place_and_read(&mut d, &mut objects, 1, 1, 1, 100, 1);

        // Plenty of budget to wander past the read; the wandering is cut.
        let plan = plan_head(&d[0], 0, 100);
        assert_eq!(plan.actions, vec![Action::Read]);
    }

    #[test]
    fn outstanding_cells_cannot_be_passed() {
        let mut d = disks(10, 10);
        let mut objects = ObjectTable::new();
        place_and_read(&mut d, &mut objects, 1, 2, 1, 100, 1);

        // 64 + 52 covers both blocks.
        let plan = plan_head(&d[0], 0, 116);
        assert_eq!(plan.actions, vec![Action::Read, Action::Read]);

        // One token short: the second block is out of reach and cannot
        // be passed over, so the plan stops after one read.
        let plan = plan_head(&d[0], 0, 115);
        assert_eq!(plan.actions, vec![Action::Read]);
    }

    #[test]
    fn carried_chain_makes_reads_cheap() {
        let mut d = disks(10, 10);
        let mut objects = ObjectTable::new();
        place_and_read(&mut d, &mut objects, 1, 2, 1, 100, 1);

        d[0].heads[0].read_chain = Some(16);
        let plan = plan_head(&d[0], 0, 32);
        assert_eq!(plan.actions, vec![Action::Read, Action::Read]);
    }

    #[test]
    fn planning_wraps_around_the_disk() {
        let mut d = disks(10, 10);
        let mut objects = ObjectTable::new();
        place_and_read(&mut d, &mut objects, 1, 1, 2, 100, 1);

        // Head at the last cell: pass over cell 10 and cell 1, read 2.
        d[0].heads[0].position = 10;
        let plan = plan_head(&d[0], 0, 80);
        assert_eq!(plan.actions, vec![Action::Pass, Action::Pass, Action::Read]);
    }

    #[test]
    fn idle_disk_plans_nothing() {
        let d = disks(10, 10);
        let plan = plan_head(&d[0], 0, 1000);
        assert!(plan.is_empty());
    }
}
