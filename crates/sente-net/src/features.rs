//! Input feature planes built from a [`GameState`] in a chosen symmetry.
//!
//! ## Plane layout
//!
//! ```text
//!   0..8    stones of the side to move, most recent ply first
//!   8..16   opponent stones, most recent ply first
//!  16       illegal move for the side to move (empty points only)
//!  17..21   own strings with 1, 2, 3 and >= 4 liberties
//!  21..25   opponent strings with 1, 2, 3 and >= 4 liberties
//!  25       ladder capture
//!  26       ladder escape
//!  27       komi plane for Black (normalized komi if Black moves, else its complement)
//!  28       komi plane for White (normalized komi if White moves, else its complement)
//! ```

use sente_core::{BOARD_SIZE, Color, GameState, NUM_INTERSECTIONS, Symmetry, SymmetryTable, Vertex};

/// History plies encoded per color.
pub const INPUT_MOVES: usize = 8;
/// Liberty-count planes per color; the last one means "at least this many".
pub const LIBERTY_PLANES: usize = 4;
/// Komi that maps to a plane value of 1.0 for the side receiving it.
pub const REFERENCE_KOMI: f32 = 7.5;

pub const OWN_STONES: usize = 0;
pub const OPPONENT_STONES: usize = OWN_STONES + INPUT_MOVES;
pub const ILLEGAL: usize = OPPONENT_STONES + INPUT_MOVES;
pub const OWN_LIBERTIES: usize = ILLEGAL + 1;
pub const OPPONENT_LIBERTIES: usize = OWN_LIBERTIES + LIBERTY_PLANES;
pub const LADDER_CAPTURE: usize = OPPONENT_LIBERTIES + LIBERTY_PLANES;
pub const LADDER_ESCAPE: usize = LADDER_CAPTURE + 1;
pub const KOMI_BLACK: usize = LADDER_ESCAPE + 1;
pub const KOMI_WHITE: usize = KOMI_BLACK + 1;

/// Planes fed to the input convolution.
pub const INPUT_CHANNELS: usize = KOMI_WHITE + 1;

/// Channel-major input tensor: `INPUT_CHANNELS` planes of `NUM_INTERSECTIONS`.
#[derive(Clone, PartialEq)]
pub struct FeatureTensor {
    data: Box<[f32]>,
}

impl FeatureTensor {
    /// All-zero tensor.
    pub fn zeroed() -> FeatureTensor {
        FeatureTensor {
            data: vec![0.0; INPUT_CHANNELS * NUM_INTERSECTIONS].into_boxed_slice(),
        }
    }

    /// Flat view, plane after plane.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// One plane.
    #[inline]
    pub fn plane(&self, plane: usize) -> &[f32] {
        &self.data[plane * NUM_INTERSECTIONS..][..NUM_INTERSECTIONS]
    }

    #[inline]
    fn set(&mut self, plane: usize, index: usize, value: f32) {
        self.data[plane * NUM_INTERSECTIONS + index] = value;
    }

    fn fill(&mut self, plane: usize, value: f32) {
        self.data[plane * NUM_INTERSECTIONS..][..NUM_INTERSECTIONS].fill(value);
    }
}

impl std::fmt::Debug for FeatureTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let occupied = (0..INPUT_CHANNELS)
            .filter(|&p| self.plane(p).iter().any(|&v| v != 0.0))
            .count();
        write!(f, "FeatureTensor({INPUT_CHANNELS} planes, {occupied} non-zero)")
    }
}

/// Komi plane value for `color`: `0.5 + komi / (2 * 7.5)` when `color` is to
/// move, the complement otherwise.
pub fn normalized_komi(komi: f32, color: Color, to_move: Color) -> f32 {
    let for_mover = 0.5 + komi / (2.0 * REFERENCE_KOMI);
    if color == to_move { for_mover } else { 1.0 - for_mover }
}

/// Plane holding the komi value of `color`.
const fn komi_plane(color: Color) -> usize {
    match color {
        Color::Black => KOMI_BLACK,
        Color::White => KOMI_WHITE,
    }
}

/// Build the input planes for `state` as seen through `symmetry`.
///
/// Cell `i` of every plane holds the board's value at
/// `SymmetryTable[symmetry][i]`.
///
/// # Panics
///
/// Panics if the state's board is not `BOARD_SIZE` wide.
pub fn gather_features(state: &impl GameState, symmetry: Symmetry) -> FeatureTensor {
    assert_eq!(state.board_size(), BOARD_SIZE, "board size mismatch");
    let table = SymmetryTable::get();
    let mut tensor = FeatureTensor::zeroed();

    let to_move = state.to_move();
    let plies = (state.move_number() + 1).min(INPUT_MOVES);

    for index in 0..NUM_INTERSECTIONS {
        let vertex = Vertex::from_index(table.map_index(symmetry, index))
            .unwrap_or_else(|| unreachable!("symmetry table maps onto the board"));

        for ply in 0..plies {
            match state.stone_at(ply, vertex) {
                Some(c) if c == to_move => tensor.set(OWN_STONES + ply, index, 1.0),
                Some(_) => tensor.set(OPPONENT_STONES + ply, index, 1.0),
                None => {}
            }
        }

        match state.stone_at(0, vertex) {
            None => {
                if !state.is_legal(to_move, vertex) {
                    tensor.set(ILLEGAL, index, 1.0);
                }
                if state.ladder_capture(vertex) {
                    tensor.set(LADDER_CAPTURE, index, 1.0);
                }
                if state.ladder_escape(vertex) {
                    tensor.set(LADDER_ESCAPE, index, 1.0);
                }
            }
            Some(color) => {
                let liberties = state.liberties(vertex).clamp(1, LIBERTY_PLANES);
                let base = if color == to_move { OWN_LIBERTIES } else { OPPONENT_LIBERTIES };
                tensor.set(base + liberties - 1, index, 1.0);
            }
        }
    }

    let komi = state.komi();
    for color in Color::ALL {
        tensor.fill(komi_plane(color), normalized_komi(komi, color, to_move));
    }
    tensor
}
