//! Zobrist hashing keys for position identity and symmetry-aware cache lookups.

use crate::color::Color;
use crate::symmetry::{Symmetry, SymmetryTable};
use crate::vertex::NUM_INTERSECTIONS;

/// Total number of keys: one per (color, vertex) pair plus the side-to-move key.
const KEY_COUNT: usize = Color::COUNT * NUM_INTERSECTIONS + 1;

/// All keys generated from a single xorshift stream.
/// Layout: `[color * NUM_INTERSECTIONS + vertex]`, then the White-to-move key.
static KEYS: [u64; KEY_COUNT] = {
    let mut table = [0u64; KEY_COUNT];
    let mut state = SEED;
    let mut i = 0;
    while i < KEY_COUNT {
        let (val, next) = xorshift64(state);
        table[i] = val;
        state = next;
        i += 1;
    }
    table
};

const SEED: u64 = 0x5a4f_4252_4953_5421; // "ZOBRIST!"

/// Xorshift64 PRNG. Returns (value, next_state).
const fn xorshift64(mut state: u64) -> (u64, u64) {
    state ^= state << 13;
    state ^= state >> 7;
    state ^= state << 17;
    (state, state)
}

/// Key for a stone of `color` on the vertex with index `vertex`.
#[inline]
pub(crate) fn stone_key(color: Color, vertex: usize) -> u64 {
    KEYS[color.index() * NUM_INTERSECTIONS + vertex]
}

/// Key XORed in when White is to move.
#[inline]
pub(crate) fn white_to_move_key() -> u64 {
    KEYS[KEY_COUNT - 1]
}

/// Hash a stone layout as it would look after applying `symmetry`.
///
/// With [`Symmetry::IDENTITY`] this is the ordinary position hash.
pub(crate) fn hash_stones(
    stones: &[Option<Color>; NUM_INTERSECTIONS],
    to_move: Color,
    symmetry: Symmetry,
) -> u64 {
    let table = SymmetryTable::get();
    let mut hash = 0u64;
    for (index, stone) in stones.iter().enumerate() {
        if let Some(color) = stone {
            hash ^= stone_key(*color, table.map_index(symmetry, index));
        }
    }
    if to_move == Color::White {
        hash ^= white_to_move_key();
    }
    hash
}
