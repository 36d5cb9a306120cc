use std::collections::HashSet;

use serde::Serialize;

use crate::instructions::Op;

/// A station operand either carries its value or waits on the rob id that
/// will produce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operand {
    Ready(i32),
    Waiting(usize),
}
impl Operand {
    pub fn is_ready(&self) -> bool {
        match self {
            Operand::Ready(_) => true,
            Operand::Waiting(_) => false,
        }
    }

    /// Operands that were never written read as 0.
    pub fn value_or_zero(&self) -> i32 {
        match self {
            Operand::Ready(value) => *value,
            Operand::Waiting(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RsEntry {
    pub op: Op,
    pub left: Operand,
    pub right: Operand,
    pub rob_id: usize,
    pub instr_index: usize,
    /// `None` until dispatched, then cycles of latency left.
    pub exec_remaining: Option<usize>,
}

/// Fixed set of stations for arithmetic and branch ops awaiting operands.
#[derive(Debug, Clone)]
pub struct ReservationStations {
    stations: Vec<Option<RsEntry>>,
}
impl ReservationStations {
    pub fn new(capacity: usize) -> Self {
        Self {
            stations: vec![None; capacity],
        }
    }

    pub fn slots(&self) -> &[Option<RsEntry>] {
        &self.stations
    }

    pub fn is_full(&self) -> bool {
        self.stations.iter().all(|slot| slot.is_some())
    }

    pub fn busy_count(&self) -> usize {
        self.stations.iter().filter(|slot| slot.is_some()).count()
    }

    /// Fills the lowest free station.
    pub fn insert(&mut self, entry: RsEntry) -> Option<usize> {
        for (id, slot) in self.stations.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(entry);
                return Some(id);
            }
        }
        None
    }

    /// CDB broadcast: resolves every operand waiting on `rob_id`.
    pub fn snoop(&mut self, rob_id: usize, value: i32) {
        for entry in self.stations.iter_mut().flatten() {
            if entry.left == Operand::Waiting(rob_id) {
                entry.left = Operand::Ready(value);
            }
            if entry.right == Operand::Waiting(rob_id) {
                entry.right = Operand::Ready(value);
            }
        }
    }

    fn can_start(entry: &RsEntry) -> bool {
        entry.exec_remaining.is_none() && entry.left.is_ready() && entry.right.is_ready()
    }

    /// Starts the station at `id` if its operands are ready; used at issue
    /// so an unblocked instruction begins executing the next cycle.
    pub fn try_dispatch(&mut self, id: usize) -> bool {
        if let Some(entry) = self.stations[id].as_mut() {
            if Self::can_start(entry) {
                entry.exec_remaining = Some(entry.op.latency());
                return true;
            }
        }
        false
    }

    /// Dispatches one waiting station whose operands are ready, lowest
    /// station id first.
    pub fn dispatch_ready(&mut self) -> Option<usize> {
        for id in 0..self.stations.len() {
            if self.try_dispatch(id) {
                return Some(id);
            }
        }
        None
    }

    pub fn advance_executing(&mut self) {
        for entry in self.stations.iter_mut().flatten() {
            if let Some(remaining) = entry.exec_remaining {
                if remaining > 0 {
                    entry.exec_remaining = Some(remaining - 1);
                }
            }
        }
    }

    /// Removes and returns every station that finished executing, in
    /// station id order.
    pub fn drain_writable(&mut self) -> Vec<RsEntry> {
        let mut finished = Vec::new();
        for slot in self.stations.iter_mut() {
            if matches!(slot, Some(entry) if entry.exec_remaining == Some(0)) {
                if let Some(entry) = slot.take() {
                    finished.push(entry);
                }
            }
        }
        finished
    }

    /// Misprediction cleanup: drops every station feeding a flushed rob id.
    pub fn remove_matching(&mut self, rob_ids: &HashSet<usize>) {
        for slot in self.stations.iter_mut() {
            if matches!(slot, Some(entry) if rob_ids.contains(&entry.rob_id)) {
                *slot = None;
            }
        }
    }
}
