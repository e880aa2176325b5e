//! Parallel CPU backend for broadcast subtraction
//!
//! # CPU Backend
//!
//! Host-side rendition of the row/column kernel pair. The launch geometry is
//! honored: every work-group owns a private cache of the slice of `b` it
//! needs, filled once before any of its work-items read it, exactly like the
//! shared-memory cache of the accelerator kernels.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon)
//! - Monomorphized on element type and on `beta == 1`
//! - In-place operation when no separate `a` buffer is given
//!
//! ## Ordering
//!
//! Work-groups are independent. Each output element is read and written by
//! exactly one work-item, which makes `c == a` safe.

use super::{Element, KernelLaunch};
use super::partition::Layout;
use rayon::prelude::*;

#[inline(always)]
fn sub_scaled<T: Element, const BETA_IS_ONE: bool>(x: T, v: T, beta: T) -> T {
    if BETA_IS_ONE { x - v } else { x - v * beta }
}

/// Launches the kernel specialization described by `launch`.
///
/// `a` is the minuend; `None` means `c` already holds it (in-place).
///
/// # Panics
/// Panics if the buffers are shorter than the partition requires. The
/// dispatcher validates this before calling.
pub fn launch<T: Element>(a: Option<&[T]>, b: &[T], c: &mut [T], launch: &KernelLaunch, beta: T) {
    match (launch.layout, launch.beta_is_one) {
        (Layout::Row, true) => kernel_sub_with_row::<T, true>(a, b, c, launch, beta),
        (Layout::Row, false) => kernel_sub_with_row::<T, false>(a, b, c, launch, beta),
        (Layout::Column, true) => kernel_sub_with_col::<T, true>(a, b, c, launch, beta),
        (Layout::Column, false) => kernel_sub_with_col::<T, false>(a, b, c, launch, beta),
    }
}

/// Row layout: `c[row, col] = a[row, col] - b[col] * beta`.
///
/// Bands of `blocks[1]` rows run in parallel. Inside a band every x-group
/// caches `blocks[0]` entries of `b` once, then sweeps its rows.
pub fn kernel_sub_with_row<T: Element, const BETA_IS_ONE: bool>(
    a: Option<&[T]>,
    b: &[T],
    c: &mut [T],
    launch: &KernelLaunch,
    beta: T,
) {
    let col_num = launch.col_num();
    let [bx, by] = launch.geometry.blocks;
    let used = launch.row_num() * col_num;

    c[..used]
        .par_chunks_mut(by * col_num)
        .enumerate()
        .for_each(|(gy, band)| {
            let band_start = gy * by * col_num;
            let rows = band.len() / col_num;
            let mut bv: Vec<T> = Vec::with_capacity(bx);

            for col0 in (0..col_num).step_by(bx) {
                let cols = bx.min(col_num - col0);

                // row-lane 0 of each column-lane fills the cache
                bv.clear();
                bv.extend_from_slice(&b[col0..col0 + cols]);

                for ty in 0..rows {
                    let offset = ty * col_num + col0;
                    let out = &mut band[offset..offset + cols];
                    match a {
                        Some(a) => {
                            let src = &a[band_start + offset..band_start + offset + cols];
                            for ((o, &x), &v) in out.iter_mut().zip(src).zip(&bv) {
                                *o = sub_scaled::<T, BETA_IS_ONE>(x, v, beta);
                            }
                        }
                        None => {
                            for (o, &v) in out.iter_mut().zip(&bv) {
                                *o = sub_scaled::<T, BETA_IS_ONE>(*o, v, beta);
                            }
                        }
                    }
                }
            }
        });
}

/// Column layout: `c[block, row, col] = a[block, row, col] - b[row] * beta`.
///
/// Every `row_num × col_num` matrix is split into bands of `blocks[1]` rows;
/// bands run in parallel and cache their rows of `b` once.
pub fn kernel_sub_with_col<T: Element, const BETA_IS_ONE: bool>(
    a: Option<&[T]>,
    b: &[T],
    c: &mut [T],
    launch: &KernelLaunch,
    beta: T,
) {
    let row_num = launch.row_num();
    let col_num = launch.col_num();
    let block_size = row_num * col_num;
    let by = launch.geometry.blocks[1];
    let used = block_size * launch.partition.block_num;

    c[..used]
        .par_chunks_mut(block_size)
        .enumerate()
        .for_each(|(block, matrix)| {
            let block_start = block * block_size;

            matrix
                .par_chunks_mut(by * col_num)
                .enumerate()
                .for_each_init(
                    || Vec::with_capacity(by),
                    |bv: &mut Vec<T>, (gy, band)| {
                        let row0 = gy * by;
                        let rows = band.len() / col_num;

                        // the lane with column-local index 0 fills the cache
                        bv.clear();
                        bv.extend_from_slice(&b[row0..row0 + rows]);

                        for (ty, (out, &v)) in band.chunks_mut(col_num).zip(bv.iter()).enumerate() {
                            match a {
                                Some(a) => {
                                    let start = block_start + (row0 + ty) * col_num;
                                    let src = &a[start..start + col_num];
                                    for (o, &x) in out.iter_mut().zip(src) {
                                        *o = sub_scaled::<T, BETA_IS_ONE>(x, v, beta);
                                    }
                                }
                                None => {
                                    for o in out.iter_mut() {
                                        *o = sub_scaled::<T, BETA_IS_ONE>(*o, v, beta);
                                    }
                                }
                            }
                        }
                    },
                );
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::grid::{thread_grid_2d, Geometry, MAX_GROUPS_PER_DIMENSION};
    use crate::ops::partition::Partition;

    fn plan(shape: &[usize], n: usize, max_threads: usize, beta_is_one: bool) -> KernelLaunch {
        let partition = Partition::new(shape, n).unwrap();
        let layout = partition.layout().unwrap();
        let geometry = match layout {
            Layout::Row => thread_grid_2d(
                partition.block_size,
                partition.block_num,
                max_threads,
                MAX_GROUPS_PER_DIMENSION,
            ),
            Layout::Column => thread_grid_2d(
                partition.stride * partition.block_num,
                partition.block_size,
                max_threads,
                MAX_GROUPS_PER_DIMENSION,
            ),
        };
        KernelLaunch {
            partition,
            layout,
            geometry,
            beta_is_one,
        }
    }

    #[test]
    fn row_kernel_with_partial_work_groups() {
        // 5 rows of 7 columns; 4x2 work-groups leave ragged edges on both axes
        let mut launch = plan(&[5, 7], 1, 8, false);
        assert_eq!(launch.geometry.blocks, [8, 1]);
        launch.geometry = Geometry {
            grids: [2, 3],
            blocks: [4, 2],
        };

        let a: Vec<f32> = (0..35).map(|x| x as f32).collect();
        let b: Vec<f32> = (0..7).map(|x| x as f32 * 10.0).collect();
        let mut c = vec![0.0f32; 35];
        kernel_sub_with_row::<f32, false>(Some(&a), &b, &mut c, &launch, 0.5);

        for (i, &v) in c.iter().enumerate() {
            assert_eq!(v, a[i] - b[i % 7] * 0.5);
        }
    }

    #[test]
    fn column_kernel_matches_reference() {
        let launch = plan(&[2, 3, 4], 1, 4, false);
        let a: Vec<f32> = (0..24).map(|x| x as f32).collect();
        let b = vec![1.0f32, 2.0, 3.0];
        let mut c = vec![0.0f32; 24];
        kernel_sub_with_col::<f32, false>(Some(&a), &b, &mut c, &launch, 2.0);

        for i in 0..24 {
            let row = (i / 4) % 3;
            assert_eq!(c[i], a[i] - b[row] * 2.0);
        }
    }

    #[test]
    fn in_place_reads_its_own_offset() {
        let launch = plan(&[3, 2, 2], 0, 2, true);
        let mut c: Vec<f32> = (0..12).map(|x| x as f32).collect();
        let b = vec![100.0f32, 200.0, 300.0];
        super::launch(None, &b, &mut c, &launch, 1.0);

        for (i, &v) in c.iter().enumerate() {
            assert_eq!(v, i as f32 - b[i / 4]);
        }
    }
}
