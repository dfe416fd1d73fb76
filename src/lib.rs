//! # tristripe
//!
//! A **replicated block-storage controller**. The controller participates
//! in a turn-based, line-oriented protocol with a driver: every timestep
//! it consumes delete / write / read events for objects striped across
//! three disks and emits placement decisions, per-head action sequences
//! under a token budget, completed and abandoned request ids, and
//! periodic garbage-collection swap plans.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      Controller                           │
//! │  ┌───────────┐  ┌────────────┐  ┌──────────────────────┐  │
//! │  │ Placement │  │ Scheduler  │  │ Lifecycle + Timeout  │  │
//! │  │ (groups,  │  │ (per-head  │  │ (register, serve,    │  │
//! │  │  best-fit)│  │  DP plans) │  │  retire, delete)     │  │
//! │  └─────┬─────┘  └─────┬──────┘  └──────────┬───────────┘  │
//! │        │              │                    │              │
//! │  ┌─────▼──────────────▼────────────────────▼───────────┐  │
//! │  │   Disks (cells, slices, heads)  +  Object table     │  │
//! │  │        per-slice gain logs · per-tag rate windows   │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │                                                           │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │        GC (periodic intra-slice compaction)         │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`controller`] | Owning state structure, configuration, per-tick orchestration |
//! | [`disk`] | Block store per disk — cells, slices, two heads |
//! | [`object`] | Object table, replicas, read-request index |
//! | [`placement`] | Group planning at init and the per-batch write strategy |
//! | [`scheduler`] | Token-budgeted head action planning and execution |
//! | [`gain`] | Time-bucketed slice gain and per-tag abandonment-rate windows |
//! | [`lifecycle`] | Cross-cutting request life events |
//! | [`gc`] | Periodic intra-slice block compaction |
//! | [`protocol`] | Line-oriented wire framing over stdin/stdout |
//!
//! ## Key properties
//!
//! - **Strictly single-threaded and tick-driven** — head "concurrency"
//!   is simulated sequentially inside one tick; the only suspension
//!   point is the blocking read at the tick boundary.
//! - **Deterministic** — one seeded RNG lives in the controller state;
//!   every id list emitted to the driver is sorted first.
//! - **Three distinct disks per object** — protected structurally by the
//!   group plan, never re-checked per write.
//! - **Budget-safe plans** — the planner and the executor share one
//!   READ-cost decay rule, so an emitted plan can never overrun the
//!   per-head token budget.

pub mod controller;
pub mod disk;
pub mod gain;
pub mod gc;
pub mod lifecycle;
pub mod object;
pub mod placement;
pub mod protocol;
pub mod scheduler;
