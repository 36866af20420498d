//! Cartesian block decomposition of the ranks in a group.
//!
//! A grid-based simulation gives each rank one block of the domain. The
//! blocks form a rectangular lattice whose shape is chosen by
//! [`block_dims`], and every rank trades guard-zone (halo) data with the
//! ranks owning the blocks next to its own. [`Cartesian::neighbors`] yields
//! exactly the peer set to hand to
//! [`Coordinator::exchange_all`](crate::coordinator::Coordinator::exchange_all).

use crate::message::Rank;
use std::collections::BTreeSet;

/// Find the prime factors of an unsigned integer, in ascending order, by
/// trial division.
pub fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut result = Vec::new();
    let mut p = 2;

    while p * p <= n {
        while n % p == 0 {
            result.push(p);
            n /= p
        }
        p += if p == 2 { 1 } else { 2 }
    }
    if n > 1 {
        result.push(n)
    }
    result
}

/// Factors a number of blocks (`count`) into the sides of a `num_dims`
/// dimensional lattice that is as close to square as the prime factors
/// allow, largest side first: 200 blocks become `[20, 10]` in 2D or
/// `[8, 5, 5]` in 3D. This function is like `MPI_Dims_create`.
pub fn block_dims(count: usize, num_dims: usize) -> Vec<usize> {
    let mut dims = vec![1; num_dims];

    if num_dims == 0 {
        return dims;
    }
    for factor in prime_factors(count).into_iter().rev() {
        if let Some(smallest) = dims.iter_mut().min() {
            *smallest *= factor
        }
    }
    dims.sort_unstable_by(|a, b| b.cmp(a));
    dims
}

/// A lattice of ranks. Rank numbers run through the lattice in row-major
/// order, the last dimension fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cartesian {
    dims: Vec<usize>,
    periodic: bool,
}

impl Cartesian {
    /// Lay `size` ranks out on a `num_dims` dimensional lattice chosen by
    /// [`block_dims`]. A periodic lattice wraps around at every edge.
    pub fn new(size: usize, num_dims: usize, periodic: bool) -> Self {
        Self::with_dims(block_dims(size, num_dims), periodic)
    }

    pub fn with_dims(dims: Vec<usize>, periodic: bool) -> Self {
        Self { dims, periodic }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    /// The number of ranks on the lattice.
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// The lattice coordinates of `rank`.
    pub fn coords(&self, rank: Rank) -> Vec<usize> {
        let mut rest = rank;
        let mut coords = vec![0; self.dims.len()];

        for (c, &n) in coords.iter_mut().zip(&self.dims).rev() {
            *c = rest % n;
            rest /= n;
        }
        coords
    }

    /// The rank at the given lattice coordinates.
    pub fn rank_at(&self, coords: &[usize]) -> Rank {
        coords
            .iter()
            .zip(&self.dims)
            .fold(0, |rank, (&c, &n)| rank * n + c)
    }

    /// The rank `displacement` blocks away from `rank` along dimension
    /// `dim`, or `None` if that steps off the edge of a non-periodic
    /// lattice. Like `MPI_Cart_shift`.
    pub fn shift(&self, rank: Rank, dim: usize, displacement: isize) -> Option<Rank> {
        let n = self.dims[dim] as isize;
        let mut coords = self.coords(rank);
        let target = coords[dim] as isize + displacement;

        coords[dim] = if self.periodic {
            target.rem_euclid(n) as usize
        } else if (0..n).contains(&target) {
            target as usize
        } else {
            return None;
        };
        Some(self.rank_at(&coords))
    }

    /// The ranks sharing a face with `rank`. On a periodic lattice with a
    /// side of length one, this includes `rank` itself.
    pub fn neighbors(&self, rank: Rank) -> BTreeSet<Rank> {
        (0..self.dims.len())
            .flat_map(|dim| vec![self.shift(rank, dim, -1), self.shift(rank, dim, 1)])
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prime_factors_works() {
        assert_eq!(prime_factors(1), vec![]);
        assert_eq!(prime_factors(2), vec![2]);
        assert_eq!(prime_factors(9), vec![3, 3]);
        assert_eq!(prime_factors(12), vec![2, 2, 3]);
        assert_eq!(prime_factors(4099), vec![4099]);
        assert_eq!(prime_factors(200), vec![2, 2, 2, 5, 5]);
    }

    #[test]
    fn block_dims_works() {
        assert_eq!(block_dims(1, 2), vec![1, 1]);
        assert_eq!(block_dims(4, 2), vec![2, 2]);
        assert_eq!(block_dims(5, 2), vec![5, 1]);
        assert_eq!(block_dims(12, 2), vec![4, 3]);
        assert_eq!(block_dims(16, 2), vec![4, 4]);
        assert_eq!(block_dims(200, 2), vec![20, 10]);
        assert_eq!(block_dims(200, 3), vec![8, 5, 5]);
        assert_eq!(block_dims(1000, 3), vec![10, 10, 10]);
        assert!(block_dims(7, 0).is_empty());
    }

    #[test]
    fn coords_and_rank_are_inverse() {
        let lattice = Cartesian::with_dims(vec![3, 4, 2], false);
        for rank in 0..lattice.size() {
            assert_eq!(lattice.rank_at(&lattice.coords(rank)), rank);
        }
        assert_eq!(lattice.coords(5), vec![0, 2, 1]);
    }

    #[test]
    fn shift_stops_at_the_edge_unless_periodic() {
        let open = Cartesian::with_dims(vec![3, 2], false);
        let wrapped = Cartesian::with_dims(vec![3, 2], true);
        assert_eq!(open.shift(0, 0, 1), Some(2));
        assert_eq!(open.shift(0, 0, -1), None);
        assert_eq!(wrapped.shift(0, 0, -1), Some(4));
        assert_eq!(wrapped.shift(4, 0, 1), Some(0));
    }

    #[test]
    fn neighbors_of_a_corner() {
        let open = Cartesian::new(6, 2, false);
        assert_eq!(open.dims(), &[3, 2]);
        assert_eq!(open.neighbors(0), vec![1, 2].into_iter().collect());

        let wrapped = Cartesian::new(6, 2, true);
        assert_eq!(wrapped.neighbors(0), vec![1, 2, 4].into_iter().collect());
    }

    #[test]
    fn single_rank_periodic_lattice_neighbors_itself() {
        let lattice = Cartesian::new(1, 2, true);
        assert_eq!(lattice.neighbors(0), vec![0].into_iter().collect());
        assert!(Cartesian::new(1, 2, false).neighbors(0).is_empty());
    }
}
