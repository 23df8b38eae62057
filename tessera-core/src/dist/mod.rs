//! Distributed matrices over a process grid.
//!
//! A distributed matrix is labeled by a pair of [`Dist`] tags, one per
//! axis, selecting which grid dimension cycles through that axis. The
//! element-cycling arithmetic shared by every layout lives here as free
//! functions ([`shift`], [`local_length`], ...), since it is invoked from
//! every redistribution.

pub(crate) mod matrix;

pub use matrix::{DistMat, DistMatMut, DistMatRef, Scratch};

use crate::grid::Grid;
use assert2::assert as fancy_assert;

/// How one matrix axis is spread over the grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dist {
    /// Cycle over the grid's rows (stride `r`).
    MC,
    /// Cycle over the grid's columns (stride `c`).
    MR,
    /// Cycle over all processes in column-major order (stride `p`).
    VC,
    /// Cycle over all processes in row-major order (stride `p`).
    VR,
    /// Cycle over the grid's diagonal (stride `lcm(r, c)`).
    MD,
    /// Replicated: every process holds the full extent of the axis.
    Star,
}

impl Dist {
    /// Cycling period of this distribution on `grid`.
    pub fn period(self, grid: &Grid) -> usize {
        match self {
            Dist::MC => grid.height(),
            Dist::MR => grid.width(),
            Dist::VC | Dist::VR => grid.size(),
            Dist::MD => lcm(grid.height(), grid.width()),
            Dist::Star => 1,
        }
    }

    /// The calling process's rank along this distribution's ordering, when
    /// it participates in it.
    pub fn axis_rank(self, grid: &Grid) -> Option<usize> {
        if !grid.in_grid() {
            return None;
        }
        match self {
            Dist::MC => Some(grid.mc_rank()),
            Dist::MR => Some(grid.mr_rank()),
            Dist::VC => Some(grid.vc_rank()),
            Dist::VR => Some(grid.vr_rank()),
            Dist::MD => diagonal_rank(grid),
            Dist::Star => Some(0),
        }
    }

    /// Whether this tag pins the owner's grid row (MC coordinate).
    pub(crate) fn pins_mc(self) -> bool {
        matches!(self, Dist::MC | Dist::VC | Dist::VR | Dist::MD)
    }

    /// Whether this tag pins the owner's grid column (MR coordinate).
    pub(crate) fn pins_mr(self) -> bool {
        matches!(self, Dist::MR | Dist::VC | Dist::VR | Dist::MD)
    }

    /// The vector refinement of a grid-axis distribution, if any.
    pub(crate) fn refinement(self) -> Option<Dist> {
        match self {
            Dist::MC => Some(Dist::VC),
            Dist::MR => Some(Dist::VR),
            _ => None,
        }
    }
}

/// Whether `(col, row)` is a recognized layout: each grid axis may be
/// consumed by at most one matrix axis, and the diagonal and vector
/// orderings consume both.
pub fn legal_pair(col: Dist, row: Dist) -> bool {
    use Dist::*;
    matches!(
        (col, row),
        (MC, MR)
            | (MC, Star)
            | (Star, MC)
            | (MR, MC)
            | (MR, Star)
            | (Star, MR)
            | (VC, Star)
            | (Star, VC)
            | (VR, Star)
            | (Star, VR)
            | (MD, Star)
            | (Star, MD)
            | (Star, Star)
    )
}

/// First global index owned by the process at `rank` on an axis with the
/// given `alignment` and cycling `modulus`.
#[inline]
pub fn shift(rank: usize, alignment: usize, modulus: usize) -> usize {
    (rank + modulus - alignment) % modulus
}

/// Number of indices below `n` owned by a process whose first owned index
/// is `shift`, cycling with the given `stride`.
#[inline]
pub fn local_length(n: usize, shift: usize, stride: usize) -> usize {
    if n > shift {
        (n - shift + stride - 1) / stride
    } else {
        0
    }
}

/// Largest local length over all processes of an axis of extent `n` cycling
/// with the given `stride`.
#[inline]
pub fn max_local_length(n: usize, stride: usize) -> usize {
    local_length(n, 0, stride)
}

pub(crate) fn gcd(a: usize, b: usize) -> usize {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

pub(crate) fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}

/// Position of the calling process on the grid's diagonal path, when it
/// lies on it: the unique `k < lcm(r, c)` with `k ≡ mc_rank (mod r)` and
/// `k ≡ mr_rank (mod c)`.
pub(crate) fn diagonal_rank(grid: &Grid) -> Option<usize> {
    let (r, c) = (grid.height(), grid.width());
    if grid.mc_rank() % gcd(r, c) != grid.mr_rank() % gcd(r, c) {
        return None;
    }
    (0..lcm(r, c)).find(|&k| k % r == grid.mc_rank() && k % c == grid.mr_rank())
}

/// VC rank of the process at the given VR rank.
#[inline]
pub(crate) fn vr_to_vc(grid: &Grid, vr_rank: usize) -> usize {
    let (r, c) = (grid.height(), grid.width());
    (vr_rank / c) + r * (vr_rank % c)
}

pub(crate) fn assert_legal(col: Dist, row: Dist) {
    fancy_assert!(
        legal_pair(col, row),
        "unsupported distribution pair ({:?}, {:?})",
        col,
        row
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_is_inverse_of_ownership() {
        for modulus in [1usize, 2, 3, 4, 6] {
            for alignment in 0..modulus {
                for rank in 0..modulus {
                    let s = shift(rank, alignment, modulus);
                    // the owner of global index s is this rank
                    assert_eq!((s + alignment) % modulus, rank);
                    assert!(s < modulus);
                }
            }
        }
    }

    #[test]
    fn local_lengths_partition_the_axis() {
        for n in 0..20 {
            for stride in 1..6 {
                let total: usize = (0..stride).map(|s| local_length(n, s, stride)).sum();
                assert_eq!(total, n);
                assert!(local_length(n, 0, stride) == max_local_length(n, stride));
            }
        }
    }

    #[test]
    fn legality_table() {
        use Dist::*;
        assert!(legal_pair(MC, MR));
        assert!(legal_pair(Star, Star));
        assert!(legal_pair(MD, Star));
        assert!(!legal_pair(MC, MC));
        assert!(!legal_pair(VC, VR));
        assert!(!legal_pair(VC, MR));
        assert!(!legal_pair(MD, MC));
    }

    #[test]
    fn gcd_lcm() {
        assert_eq!(gcd(2, 3), 1);
        assert_eq!(gcd(4, 6), 2);
        assert_eq!(lcm(2, 3), 6);
        assert_eq!(lcm(4, 6), 12);
    }
}
