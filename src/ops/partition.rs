//! Broadcast-axis partitioning.
//!
//! A tensor of extents `d[0..order]` with broadcast axis `n` is viewed as
//! `block_num × block_size × stride` elements, where
//!
//! - `stride` is the product of the extents after `n`,
//! - `block_size` is `d[n]`,
//! - `block_num` is the product of the extents before `n`.
//!
//! The stride decides the memory access pattern of the kernels, see [`Layout`].

use crate::error::{Result, SubDimError};

/// Physical access pattern of the broadcast vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// The broadcast axis is innermost (`stride == 1`): `block_num` rows of
    /// `block_size` columns, the vector indexed by column.
    Row,
    /// The broadcast axis is not innermost (`stride > 1`): `block_num`
    /// matrices of `block_size × stride`, the vector indexed by row.
    Column,
}

/// The `(stride, block_size, block_num)` decomposition of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub stride: usize,
    pub block_size: usize,
    pub block_num: usize,
}

impl Partition {
    /// Partitions `dim_size` around axis `n`.
    ///
    /// # Errors
    ///
    /// Returns [`SubDimError::AxisOutOfRange`] if `n >= dim_size.len()`.
    pub fn new(dim_size: &[usize], n: usize) -> Result<Self> {
        if n >= dim_size.len() {
            return Err(SubDimError::AxisOutOfRange {
                axis: n,
                order: dim_size.len(),
            });
        }

        Ok(Self {
            stride: dim_size[n + 1..].iter().product(),
            block_size: dim_size[n],
            block_num: dim_size[..n].iter().product(),
        })
    }

    /// Total number of elements described by the partition.
    #[must_use]
    pub const fn unit_num(&self) -> usize {
        self.stride * self.block_size * self.block_num
    }

    /// Layout the kernels must use.
    ///
    /// # Errors
    ///
    /// A zero stride cannot come out of positive extents; it is reported as
    /// [`SubDimError::InvalidStride`].
    pub fn layout(&self) -> Result<Layout> {
        match self.stride {
            1 => Ok(Layout::Row),
            s if s > 1 => Ok(Layout::Column),
            s => Err(SubDimError::InvalidStride(s)),
        }
    }
}

/// Maps a flat element index of the partitioned tensor to the index of the
/// broadcast vector element subtracted from it.
#[must_use]
pub const fn broadcast_index(i: usize, partition: &Partition) -> usize {
    (i / partition.stride) % partition.block_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_axis_is_column_layout() {
        let p = Partition::new(&[2, 3, 4], 1).unwrap();
        assert_eq!(
            p,
            Partition {
                stride: 4,
                block_size: 3,
                block_num: 2
            }
        );
        assert_eq!(p.layout().unwrap(), Layout::Column);
        assert_eq!(p.unit_num(), 24);
    }

    #[test]
    fn last_axis_is_row_layout() {
        let p = Partition::new(&[2, 3, 4], 2).unwrap();
        assert_eq!((p.stride, p.block_size, p.block_num), (1, 4, 6));
        assert_eq!(p.layout().unwrap(), Layout::Row);
    }

    #[test]
    fn first_axis_has_single_block() {
        let p = Partition::new(&[2, 3, 4], 0).unwrap();
        assert_eq!((p.stride, p.block_size, p.block_num), (12, 2, 1));
        assert_eq!(p.layout().unwrap(), Layout::Column);
    }

    #[test]
    fn vector_is_one_row() {
        let p = Partition::new(&[5], 0).unwrap();
        assert_eq!((p.stride, p.block_size, p.block_num), (1, 5, 1));
        assert_eq!(p.layout().unwrap(), Layout::Row);
    }

    #[test]
    fn trailing_unit_extent_is_still_row_layout() {
        let p = Partition::new(&[3, 4, 1], 1).unwrap();
        assert_eq!(p.stride, 1);
        assert_eq!(p.layout().unwrap(), Layout::Row);
    }

    #[test]
    fn axis_out_of_range() {
        assert!(matches!(
            Partition::new(&[2, 3], 2),
            Err(SubDimError::AxisOutOfRange { axis: 2, order: 2 })
        ));
    }

    #[test]
    fn zero_stride_is_internal_error() {
        let p = Partition {
            stride: 0,
            block_size: 3,
            block_num: 1,
        };
        assert!(matches!(p.layout(), Err(SubDimError::InvalidStride(0))));
    }

    #[test]
    fn broadcast_index_walks_the_axis() {
        let p = Partition::new(&[2, 3, 4], 1).unwrap();
        let idx: Vec<usize> = (0..24).map(|i| broadcast_index(i, &p)).collect();
        assert_eq!(idx[..12].to_vec(), vec![0usize, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(idx[12..], idx[..12]);

        let p = Partition::new(&[2, 3], 1).unwrap();
        let idx: Vec<usize> = (0..6).map(|i| broadcast_index(i, &p)).collect();
        assert_eq!(idx, vec![0usize, 1, 2, 0, 1, 2]);
    }
}
