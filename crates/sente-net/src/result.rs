//! Network output for one position.

use sente_core::{NUM_INTERSECTIONS, Symmetry, SymmetryTable};

/// Move probabilities and evaluation for one position, in canonical
/// (un-transformed) board orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct NetResult {
    /// Probability of each intersection, indexed by vertex.
    pub policy: [f32; NUM_INTERSECTIONS],
    /// Probability of passing.
    pub policy_pass: f32,
    /// Expected score in `[0, 1]` for the side to move.
    pub winrate: f32,
}

impl Default for NetResult {
    fn default() -> Self {
        NetResult {
            policy: [0.0; NUM_INTERSECTIONS],
            policy_pass: 0.0,
            winrate: 0.0,
        }
    }
}

impl NetResult {
    /// Result for the position seen through `symmetry`, given the result of the
    /// stored (canonical) position: `out[i] = self[table[symmetry][i]]`.
    pub fn permuted(&self, symmetry: Symmetry) -> NetResult {
        let table = SymmetryTable::get();
        let mut out = self.clone();
        for (index, p) in out.policy.iter_mut().enumerate() {
            *p = self.policy[table.map_index(symmetry, index)];
        }
        out
    }

    /// Sum of all move probabilities, pass included.
    pub fn policy_sum(&self) -> f32 {
        self.policy.iter().sum::<f32>() + self.policy_pass
    }
}
