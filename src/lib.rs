//! Cycle-accurate simulator of Tomasulo's algorithm with speculative
//! execution and a 1-bit branch predictor. The crate exposes a pure state
//! object plus a `tick()` operation; a viewer reads snapshots between ticks.

pub mod assembler;
pub mod branch_prediction;
pub mod checkpoint;
pub mod instructions;
pub mod load_store_buffer;
pub mod memory;
pub mod register_alias_table;
pub mod registers;
pub mod reorder_buffer;
pub mod reservation_station;
pub mod simulator;
pub mod snapshot;
pub mod stats;

pub use simulator::{BranchTargetMode, SimConfig, SimState, Simulator};
pub use snapshot::Snapshot;

pub const ROB_CAPACITY: usize = 16;
pub const RS_CAPACITY: usize = 8;
pub const LSB_CAPACITY: usize = 8;
pub const REGISTER_COUNT: usize = 32;
pub const DEFAULT_MEMORY_WORDS: usize = 1024;
