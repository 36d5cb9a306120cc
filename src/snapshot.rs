use core::fmt::{self, Display};

use serde::Serialize;

use crate::load_store_buffer::LsbEntry;
use crate::reorder_buffer::RobEntry;
use crate::reservation_station::RsEntry;
use crate::simulator::SimState;
use crate::stats::Stats;

/// Per-instruction display stage, for the viewer only. Pipeline decisions
/// never read these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisplayStage {
    Idle,
    Fetch,
    Decode,
    Execute,
    Memory,
    Writeback,
    Commit,
    Flushed,
}
impl Display for DisplayStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            DisplayStage::Idle => "-",
            DisplayStage::Fetch => "IF",
            DisplayStage::Decode => "ID",
            DisplayStage::Execute => "EX",
            DisplayStage::Memory => "MEM",
            DisplayStage::Writeback => "WB",
            DisplayStage::Commit => "COMMIT",
            DisplayStage::Flushed => "FLUSHED",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionView {
    pub index: usize,
    pub text: String,
    pub stage: DisplayStage,
    pub rob_id: Option<usize>,
    pub issue_cycle: Option<u64>,
    pub exec_end_cycle: Option<u64>,
    pub wb_cycle: Option<u64>,
    pub commit_cycle: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointView {
    pub branch_rob_id: usize,
    pub branch_index: usize,
    pub predicted_taken: bool,
    pub speculated_pc: usize,
}

/// Read-only copy of the machine state between ticks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub state: SimState,
    pub error: Option<String>,
    pub cycle: u64,
    pub fetch_pc: usize,
    pub registers: Vec<i32>,
    pub memory: Vec<i32>,
    pub rat: Vec<Option<usize>>,
    pub rob: Vec<Option<RobEntry>>,
    pub rs: Vec<Option<RsEntry>>,
    pub lsb: Vec<Option<LsbEntry>>,
    pub checkpoints: Vec<CheckpointView>,
    pub instructions: Vec<InstructionView>,
    pub stats: Stats,
    pub events: Vec<String>,
}
