//! Text rendering of a policy for diagnostics.

use std::fmt::Write;

use sente_core::{BOARD_SIZE, GameState, Vertex};

use crate::result::NetResult;

/// Cumulative probability at which the move list stops.
const TOP_MOVES_MASS: f32 = 0.85;
/// Moves less likely than this are never listed.
const TOP_MOVES_FLOOR: f32 = 0.01;

/// A candidate move: a vertex or pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    Play(Vertex),
    Pass,
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Candidate::Play(v) => write!(f, "{v}"),
            Candidate::Pass => write!(f, "pass"),
        }
    }
}

/// Render the policy as a grid of permille values (top row first, occupied
/// points shown as 0), followed by pass permille and winrate. With
/// `top_moves`, also list the most likely moves.
pub fn render(state: &impl GameState, result: &NetResult, top_moves: bool) -> String {
    let mut out = String::new();
    for y in (0..BOARD_SIZE).rev() {
        for x in 0..BOARD_SIZE {
            let vertex = Vertex::new(x, y);
            let permille = if state.stone_at(0, vertex).is_none() {
                (result.policy[vertex.index()] * 1000.0) as i32
            } else {
                0
            };
            let _ = write!(out, "{permille:3} ");
        }
        out.push('\n');
    }
    let _ = writeln!(out, "pass: {}", (result.policy_pass * 1000.0) as i32);
    let _ = writeln!(out, "winrate: {:.6}", result.winrate);

    if top_moves {
        for (probability, candidate) in ranked_moves(state, result) {
            let _ = writeln!(out, "{probability:1.3} ({candidate})");
        }
    }
    out
}

/// Most likely moves in descending order, stopping once 85 % of the
/// probability is covered or the next move is below 1 %.
pub fn ranked_moves(state: &impl GameState, result: &NetResult) -> Vec<(f32, Candidate)> {
    let mut moves: Vec<(f32, Candidate)> = Vertex::all()
        .filter(|&v| state.stone_at(0, v).is_none())
        .map(|v| (result.policy[v.index()], Candidate::Play(v)))
        .collect();
    moves.push((result.policy_pass, Candidate::Pass));
    moves.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut cumulative = 0.0;
    moves
        .into_iter()
        .take_while(|&(p, _)| {
            let keep = cumulative < TOP_MOVES_MASS && p >= TOP_MOVES_FLOOR;
            cumulative += p;
            keep
        })
        .collect()
}
