use serde::Serialize;

use crate::REGISTER_COUNT;

/// O(32) copy taken at branch issue and restored on misprediction.
pub type RatSnapshot = [Option<usize>; REGISTER_COUNT];

/// Maps each architectural register to the rob id of its most recent
/// in-flight producer; `None` means the register file is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterAliasTable {
    table: RatSnapshot,
}
impl RegisterAliasTable {
    pub fn new() -> Self {
        Self {
            table: [None; REGISTER_COUNT],
        }
    }

    pub fn read(&self, reg: usize) -> Option<usize> {
        if reg == 0 {
            None
        } else {
            self.table[reg]
        }
    }

    pub fn rename(&mut self, reg: usize, rob_id: usize) {
        if reg != 0 {
            self.table[reg] = Some(rob_id);
        }
    }

    /// Commit-time cleanup: the register file becomes authoritative again
    /// unless a younger producer has renamed the register since.
    pub fn clear_if_points_to(&mut self, reg: usize, rob_id: usize) {
        if self.table[reg] == Some(rob_id) {
            self.table[reg] = None;
        }
    }

    pub fn snapshot(&self) -> RatSnapshot {
        self.table
    }

    pub fn restore(&mut self, snapshot: &RatSnapshot) {
        self.table = *snapshot;
    }
}
impl Default for RegisterAliasTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_and_read() {
        let mut rat = RegisterAliasTable::new();
        assert_eq!(rat.read(3), None);
        rat.rename(3, 7);
        assert_eq!(rat.read(3), Some(7));
    }

    #[test]
    fn zero_register_is_never_renamed() {
        let mut rat = RegisterAliasTable::new();
        rat.rename(0, 5);
        assert_eq!(rat.read(0), None);
    }

    #[test]
    fn clear_only_when_still_pointing() {
        let mut rat = RegisterAliasTable::new();
        rat.rename(2, 4);
        rat.clear_if_points_to(2, 9);
        assert_eq!(rat.read(2), Some(4));
        rat.clear_if_points_to(2, 4);
        assert_eq!(rat.read(2), None);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut rat = RegisterAliasTable::new();
        rat.rename(1, 10);
        let snapshot = rat.snapshot();

        rat.rename(1, 11);
        rat.rename(2, 12);
        rat.restore(&snapshot);
        assert_eq!(rat.read(1), Some(10));
        assert_eq!(rat.read(2), None);
    }
}
