//! A self-contained board snapshot with recent history.
//!
//! [`Position`] knows captures, suicide and liberties but no ko or ladder
//! reading; it serves as a lightweight [`GameState`] for benchmarks and
//! for driving the evaluator without a full rules engine.

use std::fmt;

use crate::color::Color;
use crate::error::MoveError;
use crate::state::GameState;
use crate::symmetry::{Symmetry, SymmetryTable};
use crate::vertex::{BOARD_SIZE, NUM_INTERSECTIONS, Vertex};
use crate::zobrist;

/// Stone layout of one board, indexed by [`Vertex::index()`].
pub type Stones = [Option<Color>; NUM_INTERSECTIONS];

/// Number of boards retained, current position included.
pub const HISTORY_LIMIT: usize = 8;

/// Komi used when none is given.
pub const DEFAULT_KOMI: f32 = 7.5;

/// Board state plus the boards that preceded it.
#[derive(Clone, PartialEq)]
pub struct Position {
    /// Most recent first; `history[0]` is the current board.
    history: Vec<Stones>,
    to_move: Color,
    komi: f32,
    move_number: usize,
    /// Zobrist hash of the current board and side to move.
    hash: u64,
}

impl Position {
    /// Return an empty board with Black to move.
    pub fn new(komi: f32) -> Position {
        Position::from_stones([None; NUM_INTERSECTIONS], Color::Black, komi, 0)
    }

    /// Construct a position with no history from a stone layout.
    pub(crate) fn from_stones(stones: Stones, to_move: Color, komi: f32, move_number: usize) -> Position {
        Position {
            history: vec![stones],
            to_move,
            komi,
            move_number,
            hash: zobrist::hash_stones(&stones, to_move, Symmetry::IDENTITY),
        }
    }

    /// Return the stone on `vertex`, if any.
    #[inline]
    pub fn stone(&self, vertex: Vertex) -> Option<Color> {
        self.history[0][vertex.index()]
    }

    /// Number of boards available for history, current included.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Change the side to move without playing a move.
    pub fn set_to_move(&mut self, color: Color) {
        if self.to_move != color {
            self.to_move = color;
            self.hash ^= zobrist::white_to_move_key();
        }
    }

    /// Change the komi.
    pub fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    /// Play a stone for the side to move, removing captured strings.
    pub fn play(&mut self, vertex: Vertex) -> Result<(), MoveError> {
        let current = &self.history[0];
        if current[vertex.index()].is_some() {
            return Err(MoveError::Occupied { vertex });
        }
        let next = place(current, self.to_move, vertex).ok_or(MoveError::Suicide { vertex })?;
        self.advance(next);
        Ok(())
    }

    /// Pass: the board repeats and the turn changes.
    pub fn pass(&mut self) {
        let current = self.history[0];
        self.advance(current);
    }

    /// Return this position with every board relocated through `symmetry`.
    ///
    /// The stone on `v` moves to `symmetry.apply(v)`, so the result hashes to
    /// `self.symmetry_hash(symmetry)`.
    pub fn transformed(&self, symmetry: Symmetry) -> Position {
        let table = SymmetryTable::get();
        let history: Vec<Stones> = self
            .history
            .iter()
            .map(|board| {
                let mut moved = [None; NUM_INTERSECTIONS];
                for (index, stone) in board.iter().enumerate() {
                    moved[table.map_index(symmetry, index)] = *stone;
                }
                moved
            })
            .collect();
        let hash = zobrist::hash_stones(&history[0], self.to_move, Symmetry::IDENTITY);
        Position {
            history,
            to_move: self.to_move,
            komi: self.komi,
            move_number: self.move_number,
            hash,
        }
    }

    fn advance(&mut self, next: Stones) {
        self.history.insert(0, next);
        self.history.truncate(HISTORY_LIMIT);
        self.to_move = !self.to_move;
        self.move_number += 1;
        self.hash = zobrist::hash_stones(&self.history[0], self.to_move, Symmetry::IDENTITY);
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::new(DEFAULT_KOMI)
    }
}

impl GameState for Position {
    fn to_move(&self) -> Color {
        self.to_move
    }

    fn komi(&self) -> f32 {
        self.komi
    }

    fn move_number(&self) -> usize {
        self.move_number
    }

    fn hash(&self) -> u64 {
        self.hash
    }

    fn symmetry_hash(&self, symmetry: Symmetry) -> u64 {
        zobrist::hash_stones(&self.history[0], self.to_move, symmetry)
    }

    fn stone_at(&self, ply: usize, vertex: Vertex) -> Option<Color> {
        self.history.get(ply).and_then(|board| board[vertex.index()])
    }

    fn liberties(&self, vertex: Vertex) -> usize {
        if self.stone(vertex).is_some() {
            string_liberties(&self.history[0], vertex)
        } else {
            0
        }
    }

    fn is_legal(&self, color: Color, vertex: Vertex) -> bool {
        let current = &self.history[0];
        current[vertex.index()].is_none() && place(current, color, vertex).is_some()
    }

    fn ladder_capture(&self, _vertex: Vertex) -> bool {
        false
    }

    fn ladder_escape(&self, _vertex: Vertex) -> bool {
        false
    }
}

/// Put a `color` stone on the empty `vertex` and resolve captures.
///
/// Returns `None` when the move would be suicide.
fn place(stones: &Stones, color: Color, vertex: Vertex) -> Option<Stones> {
    let mut next = *stones;
    next[vertex.index()] = Some(color);
    for neighbor in vertex.neighbors() {
        if next[neighbor.index()] == Some(!color) && string_liberties(&next, neighbor) == 0 {
            for member in string_members(&next, neighbor) {
                next[member.index()] = None;
            }
        }
    }
    if string_liberties(&next, vertex) == 0 {
        return None;
    }
    Some(next)
}

/// All stones connected to the stone on `vertex`.
fn string_members(stones: &Stones, vertex: Vertex) -> Vec<Vertex> {
    let color = stones[vertex.index()];
    let mut seen = [false; NUM_INTERSECTIONS];
    let mut stack = vec![vertex];
    let mut members = Vec::new();
    seen[vertex.index()] = true;
    while let Some(v) = stack.pop() {
        members.push(v);
        for n in v.neighbors() {
            if !seen[n.index()] && stones[n.index()] == color {
                seen[n.index()] = true;
                stack.push(n);
            }
        }
    }
    members
}

/// Distinct empty points adjacent to the string on `vertex`.
fn string_liberties(stones: &Stones, vertex: Vertex) -> usize {
    let mut counted = [false; NUM_INTERSECTIONS];
    let mut liberties = 0;
    for member in string_members(stones, vertex) {
        for n in member.neighbors() {
            if stones[n.index()].is_none() && !counted[n.index()] {
                counted[n.index()] = true;
                liberties += 1;
            }
        }
    }
    liberties
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in (0..BOARD_SIZE).rev() {
            let row: Vec<&str> = (0..BOARD_SIZE)
                .map(|x| match self.stone(Vertex::new(x, y)) {
                    Some(Color::Black) => "X",
                    Some(Color::White) => "O",
                    None => ".",
                })
                .collect();
            writeln!(f, "{}", row.join(" "))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Position")
            .field("to_move", &self.to_move)
            .field("komi", &self.komi)
            .field("move_number", &self.move_number)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .finish()
    }
}
