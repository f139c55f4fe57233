//! Core Go types: colors, vertices, board symmetries and the game-state
//! interface consumed by the evaluator.

mod color;
mod diagram;
mod error;
mod position;
mod state;
mod symmetry;
mod vertex;
mod zobrist;

pub use color::Color;
pub use error::{DiagramError, MoveError};
pub use position::{DEFAULT_KOMI, HISTORY_LIMIT, Position, Stones};
pub use state::GameState;
pub use symmetry::{NUM_SYMMETRIES, Symmetry, SymmetryTable};
pub use vertex::{BOARD_SIZE, NUM_INTERSECTIONS, Vertex};
