use crate::register_alias_table::RatSnapshot;

/// Rollback state captured when a branch issues. Held in program order; a
/// misprediction discards the checkpoint and every younger one.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub branch_rob_id: usize,
    pub branch_index: usize,
    pub predicted_taken: bool,
    pub speculated_pc: usize,
    pub fallthrough_pc: usize,
    pub rat: RatSnapshot,
}
