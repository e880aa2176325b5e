//! subdim: broadcasting dimension-wise subtraction for dense tensors.
//!
//! Computes `c = a - b * beta` where `a` is a tensor of any rank and `b` is a
//! vector whose length equals the extent of one dimension `n` of `a`; `b` is
//! broadcast over every other dimension.
//!
//! # Features
//!
//! - Row and column kernels, chosen from where axis `n` sits in memory
//! - Work-group caching of the broadcast vector (shared memory on the GPU,
//!   per-worker tables on the CPU)
//! - `f32` and `f16` kernels, each specialized for `beta == 1`
//! - Scoped device selection that is restored on every exit path
//!
//! # Modules
//!
//! - [`tensors`]: tensor descriptor and storage.
//! - [`backend`]: current device and device guard.
//! - [`ops`]: partitioner, launch geometry, kernels and dispatch.
//! - [`error`]: error taxonomy.
//!
//! # Example
//!
//! ```rust
//! use subdim::{sub_dim, tensor};
//!
//! let a = tensor!([[1.0, 2.0], [3.0, 4.0]]);
//! let b = tensor!([1.0, 2.0]);
//! let mut c = a.zeros_like();
//! sub_dim(&a, &b, &mut c, 0, 2.0).unwrap();
//! assert_eq!(c.as_f32().unwrap(), &[-1.0, 0.0, -1.0, 0.0]);
//! ```

pub mod backend;
pub mod error;
pub mod ops;
pub mod tensors;

pub use error::{Result, SubDimError};
pub use ops::dispatch::{sub_dim, sub_dim_me, sub_dim_new};
pub use ops::partition::{Layout, Partition, broadcast_index};
pub use tensors::{DataType, Tensor, TensorData};
