use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RobKind {
    Register,
    Store,
    Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Destination {
    Reg(usize),
    Memory(i32),
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobEntry {
    pub kind: RobKind,
    pub destination: Destination,
    pub value: i32,
    pub ready: bool,
    pub speculative: bool,
    pub instr_index: usize,
    pub branch_taken: Option<bool>,
}

/// In-order retirement queue. A fixed-size ring of slots; the slot index of
/// an entry is its rob id, head advances on commit and tail on issue.
#[derive(Debug, Clone)]
pub struct ReorderBuffer {
    entries: Vec<Option<RobEntry>>,
    head: usize,
    tail: usize,
    count: usize,
}
impl ReorderBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.entries.len()
    }

    pub fn slots(&self) -> &[Option<RobEntry>] {
        &self.entries
    }

    pub fn get(&self, rob_id: usize) -> Option<&RobEntry> {
        self.entries.get(rob_id).and_then(|slot| slot.as_ref())
    }

    /// Places the entry at the tail and returns its rob id, or `None` when
    /// the buffer is full.
    pub fn allocate(&mut self, entry: RobEntry) -> Option<usize> {
        if self.is_full() {
            return None;
        }

        let rob_id = self.tail;
        self.entries[rob_id] = Some(entry);
        self.tail = (self.tail + 1) % self.entries.len();
        self.count += 1;
        Some(rob_id)
    }

    pub fn mark_ready(&mut self, rob_id: usize, value: i32) {
        if let Some(entry) = self.entries[rob_id].as_mut() {
            entry.value = value;
            entry.ready = true;
        }
    }

    pub fn mark_branch_outcome(&mut self, rob_id: usize, taken: bool) {
        if let Some(entry) = self.entries[rob_id].as_mut() {
            entry.branch_taken = Some(taken);
            entry.ready = true;
        }
    }

    pub fn mark_store_ready(&mut self, rob_id: usize, addr: i32, value: i32) {
        if let Some(entry) = self.entries[rob_id].as_mut() {
            entry.destination = Destination::Memory(addr);
            entry.value = value;
            entry.ready = true;
        }
    }

    pub fn head_ready(&self) -> Option<usize> {
        if self.count == 0 {
            return None;
        }
        match &self.entries[self.head] {
            Some(entry) if entry.ready => Some(self.head),
            _ => None,
        }
    }

    /// Pops the head entry. Returns `None` while the head is still
    /// executing; the caller applies the architectural side effect.
    pub fn commit_head(&mut self) -> Option<(usize, RobEntry)> {
        let rob_id = self.head_ready()?;
        let entry = self.entries[rob_id].take()?;
        self.head = (self.head + 1) % self.entries.len();
        self.count -= 1;
        Some((rob_id, entry))
    }

    /// Ring distance from the head; orders live entries by program order.
    fn age(&self, rob_id: usize) -> usize {
        (rob_id + self.entries.len() - self.head) % self.entries.len()
    }

    pub fn is_younger(&self, rob_id: usize, than: usize) -> bool {
        self.age(rob_id) > self.age(than)
    }

    /// Drops every entry strictly younger than the branch and resets the
    /// tail to one past it. Returns the dropped entries in program order so
    /// the caller can clean up stations and display state.
    pub fn flush_after(&mut self, branch_rob_id: usize) -> Vec<(usize, RobEntry)> {
        let capacity = self.entries.len();
        let mut removed = Vec::new();
        let mut idx = (branch_rob_id + 1) % capacity;
        while idx != self.tail {
            if let Some(entry) = self.entries[idx].take() {
                removed.push((idx, entry));
                self.count -= 1;
            }
            idx = (idx + 1) % capacity;
        }
        self.tail = (branch_rob_id + 1) % capacity;
        removed
    }

    /// An entry is speculative iff some live checkpointed branch is older
    /// than it.
    pub fn recompute_speculative(&mut self, live_branches: &[usize]) {
        let capacity = self.entries.len();
        let head = self.head;
        let branch_ages: Vec<usize> = live_branches
            .iter()
            .map(|id| (id + capacity - head) % capacity)
            .collect();
        for rob_id in 0..capacity {
            let age = (rob_id + capacity - head) % capacity;
            if let Some(entry) = self.entries[rob_id].as_mut() {
                entry.speculative = branch_ages.iter().any(|&branch| age > branch);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(instr_index: usize) -> RobEntry {
        RobEntry {
            kind: RobKind::Register,
            destination: Destination::Reg(1),
            value: 0,
            ready: false,
            speculative: false,
            instr_index,
            branch_taken: None,
        }
    }

    #[test]
    fn allocate_and_commit_in_order() {
        let mut rob = ReorderBuffer::new(4);
        let a = rob.allocate(entry(0)).unwrap();
        let b = rob.allocate(entry(1)).unwrap();

        // out-of-order completion, in-order commit
        rob.mark_ready(b, 20);
        assert!(rob.commit_head().is_none());

        rob.mark_ready(a, 10);
        let (id, committed) = rob.commit_head().unwrap();
        assert_eq!(id, a);
        assert_eq!(committed.value, 10);
        let (_, committed) = rob.commit_head().unwrap();
        assert_eq!(committed.value, 20);
        assert!(rob.is_empty());
    }

    #[test]
    fn refuses_allocation_when_full() {
        let mut rob = ReorderBuffer::new(2);
        rob.allocate(entry(0)).unwrap();
        rob.allocate(entry(1)).unwrap();
        assert!(rob.is_full());
        assert!(rob.allocate(entry(2)).is_none());
    }

    #[test]
    fn wraps_around() {
        let mut rob = ReorderBuffer::new(2);
        for i in 0..10 {
            let id = rob.allocate(entry(i)).unwrap();
            rob.mark_ready(id, i as i32);
            let (_, committed) = rob.commit_head().unwrap();
            assert_eq!(committed.value, i as i32);
        }
    }

    #[test]
    fn flush_after_resets_the_tail() {
        let mut rob = ReorderBuffer::new(8);
        let branch = rob.allocate(entry(0)).unwrap();
        rob.allocate(entry(1)).unwrap();
        rob.allocate(entry(2)).unwrap();

        let removed = rob.flush_after(branch);
        assert_eq!(removed.len(), 2);
        assert_eq!(rob.len(), 1);

        // the freed slots are reusable right after the branch
        let next = rob.allocate(entry(3)).unwrap();
        assert_eq!(next, (branch + 1) % rob.capacity());
    }

    #[test]
    fn age_ordering_follows_the_ring() {
        let mut rob = ReorderBuffer::new(4);
        // push the head forward so ids wrap
        for i in 0..3 {
            let id = rob.allocate(entry(i)).unwrap();
            rob.mark_ready(id, 0);
            rob.commit_head().unwrap();
        }
        let old = rob.allocate(entry(3)).unwrap();
        let young = rob.allocate(entry(4)).unwrap();
        assert!(young < old); // slot index wrapped
        assert!(rob.is_younger(young, old));
        assert!(!rob.is_younger(old, young));
    }

    #[test]
    fn speculative_flags_follow_live_branches() {
        let mut rob = ReorderBuffer::new(8);
        let branch = rob.allocate(entry(0)).unwrap();
        let after = rob.allocate(entry(1)).unwrap();

        rob.recompute_speculative(&[branch]);
        assert!(!rob.get(branch).unwrap().speculative);
        assert!(rob.get(after).unwrap().speculative);

        rob.recompute_speculative(&[]);
        assert!(!rob.get(after).unwrap().speculative);
    }
}
