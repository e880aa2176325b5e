//! Two-dimensional launch geometry.
//!
//! Kernels are launched over a `grids[0] × grids[1]` array of work-groups,
//! each of `blocks[0] × blocks[1]` work-items. Axis 0 is the fastest varying
//! one (columns, or the fused block/column index), axis 1 the slower one.
//!
//! The grid never exceeds `max_groups` work-groups per axis. When a problem
//! needs more, kernels sweep it in grid-stride steps of
//! `grids[i] * blocks[i]`; [`Geometry::sweeps`] gives the number of steps.
//! Every kernel bounds-checks its indices, so over-provisioning is harmless.

/// Work-item ceiling per work-group used by the host backend.
pub const MAX_THREADS_PER_BLOCK: usize = 1024;

/// Work-group ceiling per grid axis used by the host backend.
pub const MAX_GROUPS_PER_DIMENSION: usize = 65535;

/// Grid and work-group dimensions of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub grids: [usize; 2],
    pub blocks: [usize; 2],
}

impl Geometry {
    /// Work-items per work-group.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.blocks[0] * self.blocks[1]
    }

    /// Returns `true` if a single sweep has a work-item for every `(x, y)`
    /// with `x < dim1` and `y < dim2`.
    #[must_use]
    pub const fn covers(&self, dim1: usize, dim2: usize) -> bool {
        self.grids[0] * self.blocks[0] >= dim1 && self.grids[1] * self.blocks[1] >= dim2
    }

    /// Grid-stride steps needed along each axis to visit a `dim1 × dim2`
    /// problem.
    #[must_use]
    pub const fn sweeps(&self, dim1: usize, dim2: usize) -> [usize; 2] {
        [
            dim1.div_ceil(self.grids[0] * self.blocks[0]),
            dim2.div_ceil(self.grids[1] * self.blocks[1]),
        ]
    }
}

/// Computes a launch geometry for a `dim1 × dim2` problem.
///
/// The x-block is the smallest power of two covering `dim1`, capped at
/// `max_threads`; the y-block takes the remaining thread budget, capped at the
/// smallest power of two covering `dim2`. Each grid axis is clamped to
/// `max_groups`.
///
/// # Example
/// ```
/// use subdim::ops::grid::thread_grid_2d;
/// let g = thread_grid_2d(3, 100, 256, 65535);
/// assert_eq!(g.blocks, [4, 64]);
/// assert_eq!(g.grids, [1, 2]);
/// ```
#[must_use]
pub fn thread_grid_2d(dim1: usize, dim2: usize, max_threads: usize, max_groups: usize) -> Geometry {
    let max_threads = floor_power_of_two(max_threads.max(1));
    let max_groups = max_groups.max(1);

    let bx = dim1.max(1).next_power_of_two().min(max_threads);
    let by = (max_threads / bx)
        .max(1)
        .min(dim2.max(1).next_power_of_two());

    Geometry {
        grids: [
            dim1.div_ceil(bx).clamp(1, max_groups),
            dim2.div_ceil(by).clamp(1, max_groups),
        ],
        blocks: [bx, by],
    }
}

const fn floor_power_of_two(x: usize) -> usize {
    1 << (usize::BITS - 1 - x.leading_zeros())
}
