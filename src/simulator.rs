use std::collections::HashSet;

use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;

use crate::assembler::{parse_program, ParseError};
use crate::branch_prediction::BranchPredictor;
use crate::checkpoint::Checkpoint;
use crate::instructions::{Instruction, Op};
use crate::load_store_buffer::{LoadStoreBuffer, LsbEntry};
use crate::memory::{Memory, MemoryFault};
use crate::register_alias_table::RegisterAliasTable;
use crate::registers::RegisterFile;
use crate::reorder_buffer::{Destination, ReorderBuffer, RobEntry, RobKind};
use crate::reservation_station::{Operand, ReservationStations, RsEntry};
use crate::snapshot::{CheckpointView, DisplayStage, InstructionView, Snapshot};
use crate::stats::Stats;
use crate::{DEFAULT_MEMORY_WORDS, LSB_CAPACITY, ROB_CAPACITY, RS_CAPACITY};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error(transparent)]
    Memory(#[from] MemoryFault),
}

/// How an encoded BEQ target maps to an instruction index.
///
/// `WordAligned` treats a multiple of 4 as a byte address and divides it by
/// 4 (`BEQ R1, R2, 12` jumps to instruction 3), anything else as an index
/// directly. `Direct` always takes the value as an instruction index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
pub enum BranchTargetMode {
    WordAligned,
    Direct,
}

#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    pub memory_words: usize,
    pub branch_target_mode: BranchTargetMode,
}
impl Default for SimConfig {
    fn default() -> Self {
        Self {
            memory_words: DEFAULT_MEMORY_WORDS,
            branch_target_mode: BranchTargetMode::WordAligned,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimState {
    Running,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstrState {
    NotFetched,
    Issued,
    Executing,
    WroteBack,
    Committed,
    Flushed,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrInfo {
    pub state: InstrState,
    pub rob_id: Option<usize>,
    pub issue_cycle: Option<u64>,
    pub exec_end_cycle: Option<u64>,
    pub wb_cycle: Option<u64>,
    pub commit_cycle: Option<u64>,
}
impl InstrInfo {
    fn fresh() -> Self {
        Self {
            state: InstrState::NotFetched,
            rob_id: None,
            issue_cycle: None,
            exec_end_cycle: None,
            wb_cycle: None,
            commit_cycle: None,
        }
    }
}

/// The whole pipeline. `tick()` advances exactly one cycle; a viewer reads
/// `snapshot()` between ticks and never mutates.
pub struct Simulator {
    config: SimConfig,
    program: Vec<Instruction>,
    info: Vec<InstrInfo>,
    fetch_pc: usize,
    registers: RegisterFile,
    memory: Memory,
    rat: RegisterAliasTable,
    rob: ReorderBuffer,
    rs: ReservationStations,
    lsb: LoadStoreBuffer,
    predictor: BranchPredictor,
    checkpoints: Vec<Checkpoint>,
    issue_seq: u64,
    stats: Stats,
    events: Vec<String>,
    halted: bool,
    error: Option<SimError>,
}
impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            program: Vec::new(),
            info: Vec::new(),
            fetch_pc: 0,
            registers: RegisterFile::new(),
            memory: Memory::new(config.memory_words),
            rat: RegisterAliasTable::new(),
            rob: ReorderBuffer::new(ROB_CAPACITY),
            rs: ReservationStations::new(RS_CAPACITY),
            lsb: LoadStoreBuffer::new(LSB_CAPACITY),
            predictor: BranchPredictor::new(),
            checkpoints: Vec::new(),
            issue_seq: 0,
            stats: Stats::new(0),
            events: Vec::new(),
            halted: true,
            error: None,
        }
    }

    /// Replaces the loaded program. A parse failure leaves the previous
    /// program intact.
    pub fn load_program(&mut self, text: &str) -> Result<(), ParseError> {
        let program = parse_program(text)?;
        self.program = program;
        self.predictor.clear();
        self.reset();
        Ok(())
    }

    /// Zeros every pipeline structure and the metrics, keeping the loaded
    /// program. The branch predictor keeps its trained directions so a
    /// rerun exercises what the previous run learned.
    pub fn reset(&mut self) {
        self.info = vec![InstrInfo::fresh(); self.program.len()];
        self.fetch_pc = 0;
        self.registers = RegisterFile::new();
        self.memory = Memory::new(self.config.memory_words);
        self.rat = RegisterAliasTable::new();
        self.rob = ReorderBuffer::new(ROB_CAPACITY);
        self.rs = ReservationStations::new(RS_CAPACITY);
        self.lsb = LoadStoreBuffer::new(LSB_CAPACITY);
        self.checkpoints.clear();
        self.issue_seq = 0;
        self.stats = Stats::new(self.program.len());
        self.events.clear();
        self.halted = self.program.is_empty();
        self.error = None;
    }

    pub fn state(&self) -> SimState {
        if self.halted || self.error.is_some() {
            SimState::Halted
        } else {
            SimState::Running
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Log messages produced by the most recent tick.
    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn write_memory_word(&mut self, addr: i32, value: i32) -> Result<(), SimError> {
        self.memory.write_word(addr, value).map_err(Into::into)
    }

    pub fn read_memory_word(&self, addr: i32) -> Result<i32, SimError> {
        self.memory.read_word(addr).map_err(Into::into)
    }

    /// Advances one cycle. A no-op once halted or faulted.
    pub fn tick(&mut self) -> SimState {
        if self.state() == SimState::Halted {
            return SimState::Halted;
        }

        self.events.clear();
        self.stats.cycle += 1;
        self.stats.sample_occupancy(
            self.rob.len(),
            self.rs.busy_count(),
            self.lsb.busy_count(),
        );

        self.commit_stage();
        if self.error.is_none() {
            self.execute_stage();
            self.write_result_stage();
        }
        if self.error.is_none() {
            self.issue_stage();
            self.resolve_branches();
        }

        if self.fetch_pc >= self.program.len() && self.rob.is_empty() {
            self.halted = true;
        }
        self.state()
    }

    /// Ticks until halt or until `max_cycles` is reached.
    pub fn run(&mut self, max_cycles: u64) -> SimState {
        while self.state() == SimState::Running && self.stats.cycle < max_cycles {
            self.tick();
        }
        self.state()
    }

    fn commit_stage(&mut self) {
        let Some((rob_id, entry)) = self.rob.commit_head() else {
            return;
        };

        match entry.kind {
            RobKind::Register => {
                if let Destination::Reg(reg) = entry.destination {
                    self.registers.set(reg, entry.value);
                    self.rat.clear_if_points_to(reg, rob_id);
                }
            }
            RobKind::Store => {
                if let Destination::Memory(addr) = entry.destination {
                    if let Err(fault) = self.memory.write_word(addr, entry.value) {
                        self.fail(fault);
                        return;
                    }
                }
                self.lsb.release_store(rob_id);
            }
            RobKind::Branch => {
                // resolution already happened; retiring has no side effect
            }
        }

        let text = self.program[entry.instr_index].text.clone();
        let info = &mut self.info[entry.instr_index];
        info.state = InstrState::Committed;
        info.commit_cycle = Some(self.stats.cycle);
        self.stats.committed += 1;
        self.events
            .push(format!("committed i_{}: {}", entry.instr_index, text));
    }

    fn execute_stage(&mut self) {
        self.rs.advance_executing();
        self.lsb.advance_executing();
        self.lsb.resolve_addresses();
        self.rs.dispatch_ready();
        self.lsb.dispatch_ready();

        let executing: Vec<usize> = self
            .rs
            .slots()
            .iter()
            .flatten()
            .filter(|entry| entry.exec_remaining.is_some())
            .map(|entry| entry.instr_index)
            .chain(
                self.lsb
                    .slots()
                    .iter()
                    .flatten()
                    .filter(|entry| entry.exec_remaining.is_some() && !entry.staged)
                    .map(|entry| entry.instr_index),
            )
            .collect();
        for index in executing {
            if self.info[index].state == InstrState::Issued {
                self.info[index].state = InstrState::Executing;
            }
        }
    }

    fn write_result_stage(&mut self) {
        let mut cdb: Vec<(usize, i32)> = Vec::new();

        for station in self.rs.drain_writable() {
            let left = station.left.value_or_zero();
            let right = station.right.value_or_zero();
            if station.op == Op::BranchEqual {
                self.rob.mark_branch_outcome(station.rob_id, left == right);
            } else {
                cdb.push((station.rob_id, station.op.evaluate(left, right)));
            }
            self.note_writeback(station.instr_index);
        }

        for load in self.lsb.drain_finished_loads() {
            let addr = load.address.unwrap_or(0);
            match self.memory.read_word(addr) {
                Ok(value) => {
                    cdb.push((load.rob_id, value));
                    self.note_writeback(load.instr_index);
                }
                Err(fault) => {
                    self.fail(fault);
                    return;
                }
            }
        }

        for (rob_id, addr, value, instr_index) in self.lsb.stage_ready_stores() {
            self.rob.mark_store_ready(rob_id, addr, value);
            self.note_writeback(instr_index);
        }

        cdb.sort_by_key(|&(rob_id, _)| rob_id);
        for (rob_id, value) in cdb {
            self.rob.mark_ready(rob_id, value);
            self.rs.snoop(rob_id, value);
            self.lsb.snoop(rob_id, value);
        }
    }

    fn issue_stage(&mut self) {
        if self.fetch_pc >= self.program.len() {
            return;
        }
        if self.info[self.fetch_pc].state != InstrState::NotFetched {
            // walk past instructions that already ran or were flushed
            self.fetch_pc += 1;
            return;
        }

        let instr = self.program[self.fetch_pc].clone();
        if self.rob.is_full() {
            self.stats.stalls += 1;
            return;
        }
        if instr.op.is_memory() {
            if self.lsb.is_full() {
                self.stats.stalls += 1;
                return;
            }
        } else if self.rs.is_full() {
            self.stats.stalls += 1;
            return;
        }

        let destination = match (instr.op.rob_kind(), instr.dest) {
            (RobKind::Register, Some(reg)) => Destination::Reg(reg),
            _ => Destination::None,
        };
        let Some(rob_id) = self.rob.allocate(RobEntry {
            kind: instr.op.rob_kind(),
            destination,
            value: 0,
            ready: false,
            speculative: !self.checkpoints.is_empty(),
            instr_index: instr.index,
            branch_taken: None,
        }) else {
            self.stats.stalls += 1;
            return;
        };

        if instr.op.is_memory() {
            let base = self.read_operand(instr.src1.unwrap_or(0));
            let data = match instr.op {
                Op::StoreMemory => self.read_operand(instr.src2.unwrap_or(0)),
                _ => Operand::Ready(0),
            };
            let slot = self.lsb.insert(LsbEntry {
                op: instr.op,
                base,
                offset: instr.immediate.unwrap_or(0),
                address: None,
                data,
                rob_id,
                instr_index: instr.index,
                seq: self.issue_seq,
                exec_remaining: None,
                staged: false,
            });
            if instr.op.updates_rat() {
                if let Some(reg) = instr.dest {
                    self.rat.rename(reg, rob_id);
                }
            }
            // an unblocked access starts counting this cycle
            self.lsb.resolve_addresses();
            if let Some(slot) = slot {
                self.lsb.try_dispatch(slot);
            }
        } else {
            let left = self.read_operand(instr.src1.unwrap_or(0));
            let right = self.read_operand(instr.src2.unwrap_or(0));
            let slot = self.rs.insert(RsEntry {
                op: instr.op,
                left,
                right,
                rob_id,
                instr_index: instr.index,
                exec_remaining: None,
            });
            if instr.op.updates_rat() {
                if let Some(reg) = instr.dest {
                    self.rat.rename(reg, rob_id);
                }
            }
            if let Some(slot) = slot {
                self.rs.try_dispatch(slot);
            }
        }

        self.issue_seq += 1;
        let info = &mut self.info[instr.index];
        info.state = InstrState::Issued;
        info.rob_id = Some(rob_id);
        info.issue_cycle = Some(self.stats.cycle);

        if instr.op == Op::BranchEqual {
            let predicted = self.predictor.predict(instr.index);
            let target = self.resolve_target(instr.immediate.unwrap_or(0));
            let fallthrough = instr.index + 1;
            let speculated_pc = if predicted { target } else { fallthrough };
            self.checkpoints.push(Checkpoint {
                branch_rob_id: rob_id,
                branch_index: instr.index,
                predicted_taken: predicted,
                speculated_pc,
                fallthrough_pc: fallthrough,
                rat: self.rat.snapshot(),
            });
            self.events.push(format!(
                "[pred] i_{}: {} predicted {}, fetch continues at i_{}",
                instr.index,
                instr.text,
                direction(predicted),
                speculated_pc
            ));
            self.fetch_pc = speculated_pc;
        } else {
            self.fetch_pc += 1;
        }
    }

    fn resolve_branches(&mut self) {
        loop {
            // oldest unresolved branch whose outcome arrived this cycle
            let Some(pos) = self.checkpoints.iter().position(|cp| {
                self.rob
                    .get(cp.branch_rob_id)
                    .map_or(false, |entry| entry.ready)
            }) else {
                break;
            };

            let cp = self.checkpoints[pos].clone();
            let actual = self
                .rob
                .get(cp.branch_rob_id)
                .and_then(|entry| entry.branch_taken)
                .unwrap_or(false);
            self.predictor.update(cp.branch_index, actual);

            if actual == cp.predicted_taken {
                self.checkpoints.remove(pos);
                let live: Vec<usize> = self
                    .checkpoints
                    .iter()
                    .map(|c| c.branch_rob_id)
                    .collect();
                self.rob.recompute_speculative(&live);
                self.events.push(format!(
                    "[resolve] i_{}: predicted {}, actual {}: correct",
                    cp.branch_index,
                    direction(cp.predicted_taken),
                    direction(actual)
                ));
            } else {
                self.stats.mispredictions += 1;

                let removed = self.rob.flush_after(cp.branch_rob_id);
                let dropped: HashSet<usize> = removed.iter().map(|(id, _)| *id).collect();
                for (_, entry) in &removed {
                    let info = &mut self.info[entry.instr_index];
                    info.state = InstrState::Flushed;
                    info.rob_id = None;
                }
                self.rs.remove_matching(&dropped);
                self.lsb.remove_matching(&dropped);
                self.rat.restore(&cp.rat);

                // the mispredicted branch's own checkpoint and every nested
                // one go away together
                self.checkpoints.truncate(pos);
                let live: Vec<usize> = self
                    .checkpoints
                    .iter()
                    .map(|c| c.branch_rob_id)
                    .collect();
                self.rob.recompute_speculative(&live);

                let target = if actual {
                    let immediate = self.program[cp.branch_index].immediate.unwrap_or(0);
                    self.resolve_target(immediate)
                } else {
                    cp.fallthrough_pc
                };
                self.fetch_pc = target;
                self.events.push(format!(
                    "[resolve] i_{}: predicted {}, actual {}: mispredict, flushed {} entries, fetch restarts at i_{}",
                    cp.branch_index,
                    direction(cp.predicted_taken),
                    direction(actual),
                    removed.len(),
                    target
                ));
            }
        }
    }

    /// Operand capture at issue: architectural value, an already-finished
    /// producer's value, or a tag to wait on.
    fn read_operand(&self, reg: usize) -> Operand {
        match self.rat.read(reg) {
            None => Operand::Ready(self.registers.get(reg)),
            Some(rob_id) => match self.rob.get(rob_id) {
                Some(entry) if entry.ready => Operand::Ready(entry.value),
                _ => Operand::Waiting(rob_id),
            },
        }
    }

    fn resolve_target(&self, immediate: i32) -> usize {
        let encoded = immediate.max(0) as usize;
        match self.config.branch_target_mode {
            BranchTargetMode::WordAligned => {
                if encoded % 4 == 0 {
                    encoded / 4
                } else {
                    encoded
                }
            }
            BranchTargetMode::Direct => encoded,
        }
    }

    fn note_writeback(&mut self, instr_index: usize) {
        let info = &mut self.info[instr_index];
        info.state = InstrState::WroteBack;
        info.exec_end_cycle = Some(self.stats.cycle);
        info.wb_cycle = Some(self.stats.cycle);
    }

    fn fail(&mut self, fault: MemoryFault) {
        self.events.push(format!("fatal: {fault}"));
        self.error = Some(fault.into());
    }

    fn display_stage(&self, index: usize) -> DisplayStage {
        match self.info[index].state {
            InstrState::Committed => DisplayStage::Commit,
            InstrState::Flushed => DisplayStage::Flushed,
            InstrState::WroteBack => DisplayStage::Writeback,
            InstrState::Executing => {
                if self.program[index].op.is_memory() {
                    DisplayStage::Memory
                } else {
                    DisplayStage::Execute
                }
            }
            InstrState::Issued => DisplayStage::Decode,
            InstrState::NotFetched => {
                if index == self.fetch_pc && self.state() == SimState::Running {
                    DisplayStage::Fetch
                } else {
                    DisplayStage::Idle
                }
            }
        }
    }

    /// Read-only view of the whole machine for the viewer and for tests.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state(),
            error: self.error.as_ref().map(|e| e.to_string()),
            cycle: self.stats.cycle,
            fetch_pc: self.fetch_pc,
            registers: self.registers.to_vec(),
            memory: self.memory.to_words(),
            rat: self.rat.snapshot().to_vec(),
            rob: self.rob.slots().to_vec(),
            rs: self.rs.slots().to_vec(),
            lsb: self.lsb.slots().to_vec(),
            checkpoints: self
                .checkpoints
                .iter()
                .map(|cp| CheckpointView {
                    branch_rob_id: cp.branch_rob_id,
                    branch_index: cp.branch_index,
                    predicted_taken: cp.predicted_taken,
                    speculated_pc: cp.speculated_pc,
                })
                .collect(),
            instructions: self
                .program
                .iter()
                .map(|instr| {
                    let info = &self.info[instr.index];
                    InstructionView {
                        index: instr.index,
                        text: instr.text.clone(),
                        stage: self.display_stage(instr.index),
                        rob_id: info.rob_id,
                        issue_cycle: info.issue_cycle,
                        exec_end_cycle: info.exec_end_cycle,
                        wb_cycle: info.wb_cycle,
                        commit_cycle: info.commit_cycle,
                    }
                })
                .collect(),
            stats: self.stats,
            events: self.events.clone(),
        }
    }
}
impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

fn direction(taken: bool) -> &'static str {
    if taken {
        "taken"
    } else {
        "not-taken"
    }
}
