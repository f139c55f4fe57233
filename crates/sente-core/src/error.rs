//! Error types for board diagrams and move application.

use crate::vertex::Vertex;

/// Errors that occur when parsing a text board diagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagramError {
    /// The diagram does not have one row per board line.
    #[error("expected {expected} rows, found {found}")]
    WrongRowCount {
        /// Rows required.
        expected: usize,
        /// Rows found.
        found: usize,
    },
    /// A row describes more or fewer points than the board width.
    #[error("row {row} describes {length} points, expected {expected}")]
    BadRowLength {
        /// Zero-based row index from the top of the diagram.
        row: usize,
        /// Number of points described.
        length: usize,
        /// Board width.
        expected: usize,
    },
    /// An unrecognized character appeared in a row.
    #[error("invalid point character: '{character}'")]
    InvalidPointChar {
        /// The invalid character.
        character: char,
    },
}

/// Errors from playing a stone on a [`Position`](crate::position::Position).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// The intersection already holds a stone.
    #[error("{vertex} is occupied")]
    Occupied {
        /// Target intersection.
        vertex: Vertex,
    },
    /// The stone would have no liberties and captures nothing.
    #[error("{vertex} is suicide")]
    Suicide {
        /// Target intersection.
        vertex: Vertex,
    },
}
