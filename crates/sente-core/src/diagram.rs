//! Text diagram parsing for [`Position`].
//!
//! A diagram has one row per board line, top row first. Points are `X`
//! (Black), `O` (White) or `.`/`+` (empty); whitespace is ignored.

use std::str::FromStr;

use crate::color::Color;
use crate::error::DiagramError;
use crate::position::{DEFAULT_KOMI, Position};
use crate::vertex::{BOARD_SIZE, NUM_INTERSECTIONS, Vertex};

impl FromStr for Position {
    type Err = DiagramError;

    /// Parse a diagram into a position with Black to move and the default komi.
    ///
    /// The move number is taken to be the number of stones on the board.
    fn from_str(diagram: &str) -> Result<Position, DiagramError> {
        let rows: Vec<&str> = diagram
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if rows.len() != BOARD_SIZE {
            return Err(DiagramError::WrongRowCount {
                expected: BOARD_SIZE,
                found: rows.len(),
            });
        }

        let mut stones = [None; NUM_INTERSECTIONS];
        for (row, line) in rows.iter().enumerate() {
            let y = BOARD_SIZE - 1 - row;
            let mut length = 0;
            for c in line.chars().filter(|c| !c.is_whitespace()) {
                let stone = match c {
                    '.' | '+' => None,
                    'X' | 'x' => Some(Color::Black),
                    'O' | 'o' => Some(Color::White),
                    other => return Err(DiagramError::InvalidPointChar { character: other }),
                };
                if length < BOARD_SIZE {
                    stones[Vertex::new(length, y).index()] = stone;
                }
                length += 1;
            }
            if length != BOARD_SIZE {
                return Err(DiagramError::BadRowLength {
                    row,
                    length,
                    expected: BOARD_SIZE,
                });
            }
        }

        let placed = stones.iter().flatten().count();
        Ok(Position::from_stones(stones, Color::Black, DEFAULT_KOMI, placed))
    }
}
