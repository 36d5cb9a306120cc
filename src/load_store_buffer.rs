use std::collections::HashSet;

use serde::Serialize;

use crate::instructions::Op;
use crate::reservation_station::Operand;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LsbEntry {
    pub op: Op,
    pub base: Operand,
    pub offset: i32,
    /// Computed lazily once the base register value is known.
    pub address: Option<i32>,
    /// Store data; loads keep this at `Ready(0)`.
    pub data: Operand,
    pub rob_id: usize,
    pub instr_index: usize,
    /// Issue order, used for the program-order memory rules.
    pub seq: u64,
    pub exec_remaining: Option<usize>,
    /// A store that has reported its (address, value) to the reorder buffer
    /// and now waits for commit.
    pub staged: bool,
}

/// Buffer for loads and stores. Memory is kept hazard-free by serializing
/// in program order: a load may not start while an older store has an
/// unresolved address or addresses the same word, and stores only reach
/// memory at commit.
#[derive(Debug, Clone)]
pub struct LoadStoreBuffer {
    slots: Vec<Option<LsbEntry>>,
}
impl LoadStoreBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn slots(&self) -> &[Option<LsbEntry>] {
        &self.slots
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_some())
    }

    pub fn busy_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn insert(&mut self, entry: LsbEntry) -> Option<usize> {
        for (id, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(entry);
                return Some(id);
            }
        }
        None
    }

    pub fn snoop(&mut self, rob_id: usize, value: i32) {
        for entry in self.slots.iter_mut().flatten() {
            if entry.base == Operand::Waiting(rob_id) {
                entry.base = Operand::Ready(value);
            }
            if entry.data == Operand::Waiting(rob_id) {
                entry.data = Operand::Ready(value);
            }
        }
    }

    /// Address computation waits only for the base register.
    pub fn resolve_addresses(&mut self) {
        for entry in self.slots.iter_mut().flatten() {
            if entry.address.is_none() {
                if let Operand::Ready(base) = entry.base {
                    entry.address = Some(base.wrapping_add(entry.offset));
                }
            }
        }
    }

    fn older_store_blocks(&self, seq: u64, addr: i32) -> bool {
        self.slots.iter().flatten().any(|entry| {
            entry.op == Op::StoreMemory
                && entry.seq < seq
                && match entry.address {
                    None => true,
                    Some(store_addr) => store_addr / 4 == addr / 4,
                }
        })
    }

    fn can_start(&self, id: usize) -> bool {
        let Some(entry) = self.slots[id].as_ref() else {
            return false;
        };
        if entry.exec_remaining.is_some() || entry.staged {
            return false;
        }
        let Some(addr) = entry.address else {
            return false;
        };
        match entry.op {
            Op::LoadMemory => !self.older_store_blocks(entry.seq, addr),
            Op::StoreMemory => entry.data.is_ready(),
            _ => false,
        }
    }

    pub fn try_dispatch(&mut self, id: usize) -> bool {
        if !self.can_start(id) {
            return false;
        }
        if let Some(entry) = self.slots[id].as_mut() {
            entry.exec_remaining = Some(entry.op.latency());
            return true;
        }
        false
    }

    /// Dispatches one eligible entry per cycle, lowest slot id first.
    pub fn dispatch_ready(&mut self) -> Option<usize> {
        for id in 0..self.slots.len() {
            if self.try_dispatch(id) {
                return Some(id);
            }
        }
        None
    }

    pub fn advance_executing(&mut self) {
        for entry in self.slots.iter_mut().flatten() {
            if let Some(remaining) = entry.exec_remaining {
                if remaining > 0 {
                    entry.exec_remaining = Some(remaining - 1);
                }
            }
        }
    }

    /// Loads that finished their memory cycles leave the buffer and
    /// broadcast their value.
    pub fn drain_finished_loads(&mut self) -> Vec<LsbEntry> {
        let mut finished = Vec::new();
        for slot in self.slots.iter_mut() {
            if matches!(
                slot,
                Some(entry) if entry.op == Op::LoadMemory && entry.exec_remaining == Some(0)
            ) {
                if let Some(entry) = slot.take() {
                    finished.push(entry);
                }
            }
        }
        finished
    }

    /// Stores that finished staging report `(rob_id, address, value,
    /// instr_index)` for the reorder buffer and stay resident until commit.
    pub fn stage_ready_stores(&mut self) -> Vec<(usize, i32, i32, usize)> {
        let mut staged = Vec::new();
        for entry in self.slots.iter_mut().flatten() {
            if entry.op == Op::StoreMemory && entry.exec_remaining == Some(0) && !entry.staged {
                entry.staged = true;
                staged.push((
                    entry.rob_id,
                    entry.address.unwrap_or(0),
                    entry.data.value_or_zero(),
                    entry.instr_index,
                ));
            }
        }
        staged
    }

    /// Frees a store's slot once its reorder buffer entry commits.
    pub fn release_store(&mut self, rob_id: usize) {
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(entry) if entry.rob_id == rob_id) {
                *slot = None;
                return;
            }
        }
    }

    pub fn remove_matching(&mut self, rob_ids: &HashSet<usize>) {
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(entry) if rob_ids.contains(&entry.rob_id)) {
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(rob_id: usize, seq: u64, base: Operand, offset: i32) -> LsbEntry {
        LsbEntry {
            op: Op::LoadMemory,
            base,
            offset,
            address: None,
            data: Operand::Ready(0),
            rob_id,
            instr_index: rob_id,
            seq,
            exec_remaining: None,
            staged: false,
        }
    }

    fn store(rob_id: usize, seq: u64, base: Operand, offset: i32, data: Operand) -> LsbEntry {
        LsbEntry {
            op: Op::StoreMemory,
            base,
            offset,
            address: None,
            data,
            rob_id,
            instr_index: rob_id,
            seq,
            exec_remaining: None,
            staged: false,
        }
    }

    #[test]
    fn address_waits_for_the_base_register() {
        let mut lsb = LoadStoreBuffer::new(2);
        lsb.insert(load(0, 0, Operand::Waiting(5), 8));
        lsb.resolve_addresses();
        assert_eq!(lsb.slots()[0].as_ref().unwrap().address, None);

        lsb.snoop(5, 100);
        lsb.resolve_addresses();
        assert_eq!(lsb.slots()[0].as_ref().unwrap().address, Some(108));
    }

    #[test]
    fn load_blocked_by_older_store_with_unresolved_address() {
        let mut lsb = LoadStoreBuffer::new(4);
        lsb.insert(store(0, 0, Operand::Waiting(9), 0, Operand::Ready(1)));
        lsb.insert(load(1, 1, Operand::Ready(0), 16));
        lsb.resolve_addresses();

        assert_eq!(lsb.dispatch_ready(), None);

        // once the store's address resolves to a different word, the load
        // may pass it
        lsb.snoop(9, 0);
        lsb.resolve_addresses();
        assert_eq!(lsb.dispatch_ready(), Some(1));
    }

    #[test]
    fn load_blocked_by_older_store_to_the_same_word() {
        let mut lsb = LoadStoreBuffer::new(4);
        lsb.insert(store(0, 0, Operand::Ready(0), 8, Operand::Waiting(3)));
        lsb.insert(load(1, 1, Operand::Ready(0), 8));
        lsb.resolve_addresses();

        // the store itself cannot start either: its data is missing
        assert_eq!(lsb.dispatch_ready(), None);

        lsb.snoop(3, 42);
        assert_eq!(lsb.dispatch_ready(), Some(0));
    }

    #[test]
    fn store_stages_then_waits_for_commit() {
        let mut lsb = LoadStoreBuffer::new(2);
        lsb.insert(store(4, 0, Operand::Ready(0), 12, Operand::Ready(7)));
        lsb.resolve_addresses();
        assert_eq!(lsb.dispatch_ready(), Some(0));

        lsb.advance_executing();
        lsb.advance_executing();
        let staged = lsb.stage_ready_stores();
        assert_eq!(staged, vec![(4, 12, 7, 4)]);
        // stays busy until released, and stages only once
        assert_eq!(lsb.busy_count(), 1);
        assert!(lsb.stage_ready_stores().is_empty());

        lsb.release_store(4);
        assert_eq!(lsb.busy_count(), 0);
    }

    #[test]
    fn finished_loads_drain() {
        let mut lsb = LoadStoreBuffer::new(2);
        lsb.insert(load(2, 0, Operand::Ready(4), 0));
        lsb.resolve_addresses();
        lsb.dispatch_ready();
        for _ in 0..3 {
            lsb.advance_executing();
        }

        let drained = lsb.drain_finished_loads();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].rob_id, 2);
        assert_eq!(drained[0].address, Some(4));
        assert_eq!(lsb.busy_count(), 0);
    }

    #[test]
    fn remove_matching_drops_flushed_entries() {
        let mut lsb = LoadStoreBuffer::new(2);
        lsb.insert(load(1, 0, Operand::Ready(0), 0));
        lsb.insert(store(2, 1, Operand::Ready(0), 4, Operand::Ready(0)));

        lsb.remove_matching(&HashSet::from([2]));
        assert_eq!(lsb.busy_count(), 1);
        assert_eq!(lsb.slots()[0].as_ref().unwrap().rob_id, 1);
    }
}
