//! # Operation Layer
//!
//! This module implements dimension-wise broadcast subtraction,
//! `c = a - b * beta` with `b` broadcast along one axis of `a`, across
//! compute backends.
//!
//! ## Submodules
//!
//! - [`partition`]: splits a tensor into `block_num × block_size × stride` around the broadcast axis
//! - [`grid`]: 2-D launch geometry for the kernels
//! - [`cpu`]: rayon emulation of the row/column kernel pair (host device)
//! - [`wgpu`] *(opt-in)*: WGSL compute kernels with work-group shared caching
//! - [`dispatch`]: validation, device selection and kernel specialization
//!
//! ## Specialization
//!
//! Every kernel is monomorphized on its element type ([`Element`]) and on
//! whether `beta` is exactly one, in which case the multiply is not emitted.
//!
//! ## Feature Flags
//!
//! - `half_precision`: compiles the `f16` kernels (on by default)
//! - `wgpu`: enables the `wgpu` (WebGPU) backend

pub mod cpu;
pub mod dispatch;
pub mod grid;
pub mod partition;
#[cfg(feature = "wgpu")]
pub mod wgpu;

use crate::tensors::{DataType, TensorData};
use core::ops::{Mul, Sub};
use half::f16;

use self::grid::Geometry;
use self::partition::{Layout, Partition};

/// An element type with broadcast subtraction kernels.
pub trait Element:
    Copy + Send + Sync + PartialEq + Sub<Output = Self> + Mul<Output = Self> + bytemuck::Pod
{
    /// Descriptor type tag of this element.
    const DATA_TYPE: DataType;

    /// Convert from `f32`, rounding to nearest.
    fn from_f32(x: f32) -> Self;

    /// Convert to `f32`.
    fn into_f32(self) -> f32;

    /// Typed view of matching storage.
    fn storage(data: &TensorData) -> Option<&[Self]>;

    /// Typed mutable view of matching storage.
    fn storage_mut(data: &mut TensorData) -> Option<&mut [Self]>;
}

impl Element for f32 {
    const DATA_TYPE: DataType = DataType::Float32;

    fn from_f32(x: f32) -> Self {
        x
    }

    fn into_f32(self) -> f32 {
        self
    }

    fn storage(data: &TensorData) -> Option<&[Self]> {
        match data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    fn storage_mut(data: &mut TensorData) -> Option<&mut [Self]> {
        match data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }
}

impl Element for f16 {
    const DATA_TYPE: DataType = DataType::Float16;

    fn from_f32(x: f32) -> Self {
        Self::from_f32(x)
    }

    fn into_f32(self) -> f32 {
        self.to_f32()
    }

    fn storage(data: &TensorData) -> Option<&[Self]> {
        match data {
            TensorData::F16(v) => Some(v),
            _ => None,
        }
    }

    fn storage_mut(data: &mut TensorData) -> Option<&mut [Self]> {
        match data {
            TensorData::F16(v) => Some(v),
            _ => None,
        }
    }
}

/// Everything a backend needs to launch one kernel specialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLaunch {
    pub partition: Partition,
    pub layout: Layout,
    pub geometry: Geometry,
    pub beta_is_one: bool,
}

impl KernelLaunch {
    /// Number of rows of the kernel's logical matrix.
    ///
    /// Row layout: one row per outer block. Column layout: the broadcast axis.
    #[must_use]
    pub const fn row_num(&self) -> usize {
        match self.layout {
            Layout::Row => self.partition.block_num,
            Layout::Column => self.partition.block_size,
        }
    }

    /// Number of columns of the kernel's logical matrix.
    #[must_use]
    pub const fn col_num(&self) -> usize {
        match self.layout {
            Layout::Row => self.partition.block_size,
            Layout::Column => self.partition.stride,
        }
    }
}

lazy_static::lazy_static! {
    static ref HOST_HALF_PRECISION: bool = {
        let supported = cfg!(feature = "half_precision");
        if !supported {
            log::warn!("half precision kernels are not compiled in; f16 tensors will be rejected");
        }
        supported
    };
}

/// Returns whether `f16` kernels can run on the host device.
///
/// Evaluated once per process.
#[must_use]
pub fn host_supports_half_precision() -> bool {
    *HOST_HALF_PRECISION
}
