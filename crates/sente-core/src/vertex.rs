//! Board intersections on the fixed-size board.
//!
//! Vertices are row-major: index = y * BOARD_SIZE + x, with (0, 0) at the
//! lower-left corner ("A1").

use std::fmt;

/// Side length of the board. The network is trained for exactly this size.
pub const BOARD_SIZE: usize = 19;

/// Number of intersections on the board.
pub const NUM_INTERSECTIONS: usize = BOARD_SIZE * BOARD_SIZE;

/// Column letters used in coordinates. `I` is skipped by convention.
const COLUMNS: &[u8; 25] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

/// A single intersection, encoded as its row-major index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vertex(u16);

impl Vertex {
    /// Create a vertex from column `x` and row `y`.
    ///
    /// # Panics
    ///
    /// Debug-asserts that both coordinates are on the board.
    #[inline]
    pub const fn new(x: usize, y: usize) -> Vertex {
        debug_assert!(x < BOARD_SIZE && y < BOARD_SIZE);
        Vertex((y * BOARD_SIZE + x) as u16)
    }

    /// Create a vertex from its index, returning `None` if out of range.
    #[inline]
    pub const fn from_index(index: usize) -> Option<Vertex> {
        if index < NUM_INTERSECTIONS {
            Some(Vertex(index as u16))
        } else {
            None
        }
    }

    /// Create a vertex from an index known to be on the board.
    #[inline]
    pub(crate) const fn from_index_unchecked(index: usize) -> Vertex {
        debug_assert!(index < NUM_INTERSECTIONS);
        Vertex(index as u16)
    }

    /// Return the row-major index (0..NUM_INTERSECTIONS).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Column, 0 = leftmost.
    #[inline]
    pub const fn x(self) -> usize {
        self.index() % BOARD_SIZE
    }

    /// Row, 0 = bottom.
    #[inline]
    pub const fn y(self) -> usize {
        self.index() / BOARD_SIZE
    }

    /// Iterate over all vertices in index order.
    pub fn all() -> impl Iterator<Item = Vertex> {
        (0..NUM_INTERSECTIONS).map(Vertex::from_index_unchecked)
    }

    /// Orthogonally adjacent vertices that lie on the board.
    pub fn neighbors(self) -> impl Iterator<Item = Vertex> {
        let (x, y) = (self.x() as isize, self.y() as isize);
        [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
            .into_iter()
            .filter(|&(nx, ny)| {
                (0..BOARD_SIZE as isize).contains(&nx) && (0..BOARD_SIZE as isize).contains(&ny)
            })
            .map(|(nx, ny)| Vertex::new(nx as usize, ny as usize))
    }

    /// Parse a coordinate such as `"D4"` or `"q16"`.
    pub fn from_coordinate(s: &str) -> Option<Vertex> {
        let mut chars = s.chars();
        let column = chars.next()?.to_ascii_uppercase();
        let x = COLUMNS[..BOARD_SIZE]
            .iter()
            .position(|&c| c as char == column)?;
        let row: usize = chars.as_str().parse().ok()?;
        if !(1..=BOARD_SIZE).contains(&row) {
            return None;
        }
        Some(Vertex::new(x, row - 1))
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", COLUMNS[self.x()] as char, self.y() + 1)
    }
}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vertex({self})")
    }
}
