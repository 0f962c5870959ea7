//! Axial hex coordinates for galaxy layout.

use serde::{Deserialize, Serialize};

/// A cell on the galaxy grid in axial form. Cube `s` is derived as `-q - r`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hex {
    pub q: i32,
    pub r: i32,
}

impl Hex {
    /// Unit offsets to the six adjacent cells, clockwise from east.
    pub const DIRECTIONS: [Hex; 6] = [
        Hex::new(1, 0),
        Hex::new(0, 1),
        Hex::new(-1, 1),
        Hex::new(-1, 0),
        Hex::new(0, -1),
        Hex::new(1, -1),
    ];

    #[inline]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    #[inline]
    pub const fn s(self) -> i32 {
        -self.q - self.r
    }

    pub fn neighbors(self) -> impl Iterator<Item = Hex> {
        Self::DIRECTIONS.into_iter().map(move |d| self + d)
    }

    /// Step count between two cells.
    pub fn distance(self, other: Hex) -> i32 {
        let d = self - other;
        d.q.abs().max(d.r.abs()).max(d.s().abs())
    }

    /// Whether this cell lies in the `width` x `height` axial rectangle anchored at the origin.
    #[inline]
    pub fn in_rect(self, width: u32, height: u32) -> bool {
        u32::try_from(self.q).is_ok_and(|q| q < width)
            && u32::try_from(self.r).is_ok_and(|r| r < height)
    }
}

impl std::ops::Add for Hex {
    type Output = Hex;

    fn add(self, rhs: Hex) -> Hex {
        Hex::new(self.q + rhs.q, self.r + rhs.r)
    }
}

impl std::ops::Sub for Hex {
    type Output = Hex;

    fn sub(self, rhs: Hex) -> Hex {
        Hex::new(self.q - rhs.q, self.r - rhs.r)
    }
}

/// Every coordinate of the axial rectangle, row-major.
pub fn rect(width: u32, height: u32) -> Vec<Hex> {
    (0..height as i32)
        .flat_map(|r| (0..width as i32).map(move |q| Hex::new(q, r)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_max_cube_delta() {
        assert_eq!(Hex::new(0, 0).distance(Hex::new(3, -1)), 3);
        assert_eq!(Hex::new(2, 2).distance(Hex::new(-1, 4)), 3);
        assert_eq!(Hex::new(5, 1).distance(Hex::new(5, 1)), 0);
    }

    #[test]
    fn every_neighbor_is_one_step_away() {
        let center = Hex::new(4, 4);
        let around: Vec<_> = center.neighbors().collect();
        assert_eq!(around.len(), 6);
        assert!(around.iter().all(|n| center.distance(*n) == 1));
    }

    #[test]
    fn rect_covers_every_cell_once() {
        let cells = rect(5, 3);
        assert_eq!(cells.len(), 15);
        assert_eq!(cells[5], Hex::new(0, 1));
        assert!(cells.iter().all(|h| h.in_rect(5, 3)));
        assert!(!Hex::new(5, 0).in_rect(5, 3));
        assert!(!Hex::new(0, -1).in_rect(5, 3));
    }
}
