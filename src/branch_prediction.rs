use std::collections::HashMap;

/// One-bit direction predictor keyed by instruction index. Unseen branches
/// predict not-taken; every resolution overwrites the stored direction.
#[derive(Debug, Clone, Default)]
pub struct BranchPredictor {
    history: HashMap<usize, bool>,
}
impl BranchPredictor {
    pub fn new() -> Self {
        Self {
            history: HashMap::new(),
        }
    }

    pub fn predict(&self, pc: usize) -> bool {
        self.history.get(&pc).copied().unwrap_or(false)
    }

    pub fn update(&mut self, pc: usize, taken: bool) {
        self.history.insert(pc, taken);
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
