//! The eight board symmetries and their precomputed vertex permutations.
//!
//! A symmetry index packs three flags applied in a fixed order:
//! bit 2 transposes (swap x and y), then bit 1 mirrors x, then bit 0 mirrors y.
//! Index 0 is the identity.

use crate::vertex::{BOARD_SIZE, NUM_INTERSECTIONS, Vertex};

/// Number of board symmetries (dihedral group of the square).
pub const NUM_SYMMETRIES: usize = 8;

/// One of the eight board symmetries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symmetry(u8);

impl Symmetry {
    /// The identity transformation.
    pub const IDENTITY: Symmetry = Symmetry(0);

    /// All symmetries in index order, identity first.
    pub const ALL: [Symmetry; NUM_SYMMETRIES] = [
        Symmetry(0),
        Symmetry(1),
        Symmetry(2),
        Symmetry(3),
        Symmetry(4),
        Symmetry(5),
        Symmetry(6),
        Symmetry(7),
    ];

    /// Create a symmetry from its index, returning `None` if out of range.
    #[inline]
    pub const fn new(index: usize) -> Option<Symmetry> {
        if index < NUM_SYMMETRIES {
            Some(Symmetry(index as u8))
        } else {
            None
        }
    }

    /// Return the index (0..8).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Map board coordinates through this symmetry.
    pub const fn transform(self, x: usize, y: usize) -> (usize, usize) {
        let (mut x, mut y) = if self.0 & 4 != 0 { (y, x) } else { (x, y) };
        if self.0 & 2 != 0 {
            x = BOARD_SIZE - x - 1;
        }
        if self.0 & 1 != 0 {
            y = BOARD_SIZE - y - 1;
        }
        (x, y)
    }

    /// Map a vertex through this symmetry using the shared table.
    #[inline]
    pub fn apply(self, vertex: Vertex) -> Vertex {
        SymmetryTable::get().map(self, vertex)
    }
}

/// Vertex permutation for every symmetry, indexed `[symmetry][vertex]`.
pub struct SymmetryTable {
    map: [[u16; NUM_INTERSECTIONS]; NUM_SYMMETRIES],
}

static TABLE: SymmetryTable = SymmetryTable::build();

impl SymmetryTable {
    const fn build() -> SymmetryTable {
        let mut map = [[0u16; NUM_INTERSECTIONS]; NUM_SYMMETRIES];
        let mut s = 0;
        while s < NUM_SYMMETRIES {
            let mut v = 0;
            while v < NUM_INTERSECTIONS {
                let (x, y) = Symmetry(s as u8).transform(v % BOARD_SIZE, v / BOARD_SIZE);
                let mapped = y * BOARD_SIZE + x;
                assert!(mapped < NUM_INTERSECTIONS);
                assert!(s != 0 || mapped == v, "identity symmetry must fix every vertex");
                map[s][v] = mapped as u16;
                v += 1;
            }
            s += 1;
        }
        SymmetryTable { map }
    }

    /// Return the process-wide table.
    #[inline]
    pub fn get() -> &'static SymmetryTable {
        &TABLE
    }

    /// Image of `vertex` under `symmetry`.
    #[inline]
    pub fn map(&self, symmetry: Symmetry, vertex: Vertex) -> Vertex {
        Vertex::from_index_unchecked(self.map_index(symmetry, vertex.index()))
    }

    /// Image of a raw vertex index under `symmetry`.
    #[inline]
    pub fn map_index(&self, symmetry: Symmetry, index: usize) -> usize {
        self.map[symmetry.index()][index] as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_fixes_every_vertex() {
        let table = SymmetryTable::get();
        for v in Vertex::all() {
            assert_eq!(table.map(Symmetry::IDENTITY, v), v);
        }
    }

    #[test]
    fn every_symmetry_is_a_bijection() {
        let table = SymmetryTable::get();
        for sym in Symmetry::ALL {
            let mut seen = [false; NUM_INTERSECTIONS];
            for v in Vertex::all() {
                let image = table.map(sym, v).index();
                assert!(!seen[image], "symmetry {sym:?} maps two vertices onto {image}");
                seen[image] = true;
            }
        }
    }

    #[test]
    fn symmetries_are_distinct() {
        let probe = Vertex::new(2, 5);
        let mut images: Vec<Vertex> = Symmetry::ALL.iter().map(|s| s.apply(probe)).collect();
        images.sort();
        images.dedup();
        assert_eq!(images.len(), NUM_SYMMETRIES);
    }

    #[test]
    fn transform_order_is_transpose_then_mirrors() {
        // transpose + mirror x: (x, y) -> (y, x) -> (18 - y, x)
        let sym = Symmetry::new(6).unwrap();
        assert_eq!(sym.transform(2, 5), (BOARD_SIZE - 1 - 5, 2));
        // mirror y only
        let sym = Symmetry::new(1).unwrap();
        assert_eq!(sym.transform(2, 5), (2, BOARD_SIZE - 1 - 5));
    }

    #[test]
    fn out_of_range_index_rejected() {
        assert!(Symmetry::new(8).is_none());
        assert_eq!(Symmetry::new(7).map(Symmetry::index), Some(7));
    }
}
