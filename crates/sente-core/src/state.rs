//! The interface a rules engine exposes to the evaluator.

use crate::color::Color;
use crate::symmetry::Symmetry;
use crate::vertex::{BOARD_SIZE, NUM_INTERSECTIONS, Vertex};

/// Read-only view of a game in progress, as seen by the network.
///
/// The evaluator never mutates the game; it only asks for stones, liberties,
/// legality and tactical hints of the current position and for stones of a
/// bounded number of earlier positions.
pub trait GameState {
    /// Side length of the board. Must equal [`BOARD_SIZE`] to be evaluated.
    fn board_size(&self) -> usize {
        BOARD_SIZE
    }

    /// Color to play next.
    fn to_move(&self) -> Color;

    /// Komi in points.
    fn komi(&self) -> f32;

    /// Number of moves played so far (0 in the initial position).
    fn move_number(&self) -> usize;

    /// Moves considered "opening" by the time-control policy.
    fn opening_moves(&self) -> usize {
        NUM_INTERSECTIONS / 6
    }

    /// Hash identifying the current position (stones, side to move, ko).
    fn hash(&self) -> u64;

    /// Hash of the current position after relocating every stone through `symmetry`.
    fn symmetry_hash(&self, symmetry: Symmetry) -> u64;

    /// Stone at `vertex`, `ply` positions ago (0 = current position).
    ///
    /// Plies older than the recorded history report an empty point.
    fn stone_at(&self, ply: usize, vertex: Vertex) -> Option<Color>;

    /// Liberties of the string occupying `vertex` in the current position.
    fn liberties(&self, vertex: Vertex) -> usize;

    /// Whether `color` may legally play at `vertex`.
    fn is_legal(&self, color: Color, vertex: Vertex) -> bool;

    /// Whether playing at `vertex` captures a string in a ladder.
    fn ladder_capture(&self, vertex: Vertex) -> bool;

    /// Whether playing at `vertex` escapes a ladder.
    fn ladder_escape(&self, vertex: Vertex) -> bool;
}
