use core::fmt::{self, Display};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub cycle: u64,
    pub committed: u64,
    pub total_instructions: usize,
    pub stalls: u64,
    pub mispredictions: u64,
    pub rob_occupancy_acc: u64,
    pub rs_occupancy_acc: u64,
    pub lsb_occupancy_acc: u64,
}
impl Stats {
    pub fn new(total_instructions: usize) -> Self {
        Self {
            cycle: 0,
            committed: 0,
            total_instructions,
            stalls: 0,
            mispredictions: 0,
            rob_occupancy_acc: 0,
            rs_occupancy_acc: 0,
            lsb_occupancy_acc: 0,
        }
    }

    pub fn sample_occupancy(&mut self, rob: usize, rs: usize, lsb: usize) {
        self.rob_occupancy_acc += rob as u64;
        self.rs_occupancy_acc += rs as u64;
        self.lsb_occupancy_acc += lsb as u64;
    }

    pub fn ipc(&self) -> f64 {
        if self.cycle == 0 {
            0.0
        } else {
            self.committed as f64 / self.cycle as f64
        }
    }

    fn average(acc: u64, cycles: u64) -> f64 {
        if cycles == 0 {
            0.0
        } else {
            acc as f64 / cycles as f64
        }
    }

    pub fn avg_rob_occupancy(&self) -> f64 {
        Self::average(self.rob_occupancy_acc, self.cycle)
    }

    pub fn avg_rs_occupancy(&self) -> f64 {
        Self::average(self.rs_occupancy_acc, self.cycle)
    }

    pub fn avg_lsb_occupancy(&self) -> f64 {
        Self::average(self.lsb_occupancy_acc, self.cycle)
    }
}
impl Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Program stats:")?;
        writeln!(f, " - Cycles: {}", self.cycle)?;
        writeln!(f, " - Instructions: {}", self.total_instructions)?;
        writeln!(f, " - Committed: {}", self.committed)?;
        writeln!(f, " - IPC: {:.2}", self.ipc())?;
        writeln!(f, " - Stalls: {}", self.stalls)?;
        writeln!(f, " - Mispredictions: {}", self.mispredictions)?;
        writeln!(f, " - Avg ROB occupancy: {:.2}", self.avg_rob_occupancy())?;
        writeln!(f, " - Avg RS occupancy: {:.2}", self.avg_rs_occupancy())?;
        write!(f, " - Avg LSB occupancy: {:.2}", self.avg_lsb_occupancy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_is_zero_before_the_first_cycle() {
        let stats = Stats::new(4);
        assert_eq!(stats.ipc(), 0.0);
    }

    #[test]
    fn averages_follow_the_samples() {
        let mut stats = Stats::new(2);
        stats.cycle = 2;
        stats.committed = 1;
        stats.sample_occupancy(4, 2, 1);
        stats.sample_occupancy(8, 2, 1);
        assert_eq!(stats.ipc(), 0.5);
        assert_eq!(stats.avg_rob_occupancy(), 6.0);
        assert_eq!(stats.avg_rs_occupancy(), 2.0);
        assert_eq!(stats.avg_lsb_occupancy(), 1.0);
    }
}
