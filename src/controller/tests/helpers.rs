//! Controller fixtures driving the tick phases directly, without the
//! wire.

use crate::controller::{Controller, ControllerConfig};
use crate::protocol::{FrequencyTables, InitParams, ReadEvent, WriteRequest};
use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn params(token_budget: u32) -> InitParams {
    InitParams {
        tick_count: 1,
        tag_count: 1,
        disk_count: 3,
        disk_capacity: 10,
        token_budget,
        gc_swap_limit: 0,
    }
}

pub fn controller(token_budget: u32) -> Controller {
    init_tracing();
    let init = params(token_budget);
    let config = ControllerConfig::from_init(init);
    let freq = FrequencyTables::zeroed(1, 1);
    Controller::new(config, freq).unwrap()
}

pub fn controller_with(config: ControllerConfig) -> Controller {
    init_tracing();
    let freq = FrequencyTables::zeroed(config.tag_count as usize, config.time_blocks());
    Controller::new(config, freq).unwrap()
}

/// One full event-free tick; returns (completed, busy).
pub fn idle_tick(c: &mut Controller) -> (Vec<u32>, Vec<u32>) {
    tick(c, &[], &[], &[])
}

/// One full tick with the given events; returns (completed, busy).
pub fn tick(
    c: &mut Controller,
    deletes: &[u32],
    writes: &[WriteRequest],
    reads: &[ReadEvent],
) -> (Vec<u32>, Vec<u32>) {
    let next = c.tick() + 1;
    c.begin_tick(next).unwrap();
    c.apply_deletes(deletes);
    c.place_writes(writes).unwrap();
    let rejected = c.admit_reads(reads);
    let (_, completed) = c.run_heads();
    let mut busy = c.reap_expired();
    busy.extend(rejected);
    busy.sort_unstable();
    c.advance_window();
    (completed, busy)
}
