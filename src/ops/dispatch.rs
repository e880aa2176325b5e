//! Operation Dispatch Layer
//!
//! This module validates operands, selects the device of the operands for the
//! duration of the call, and launches the kernel specialization matching
//! `(layout, beta == 1, dtype)` on the backend that serves the device.
//!
//! # Entry Points
//! - [`sub_dim`]: `c = a - b * beta`, `b` broadcast along axis `n` of `a`
//! - [`sub_dim_me`]: the same, writing into `a`
//! - [`sub_dim_new`]: the same, returning a freshly allocated `c`
//!
//! # Failure Policy
//! Every check runs before any kernel is launched and before `c` is touched.
//! Failures are logged at `error` level and returned; nothing is retried.
//!
//! # Example
//! ```rust
//! use subdim::ops::dispatch::sub_dim_new;
//! use subdim::tensors::Tensor;
//!
//! let a = Tensor::from_f32(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! let b = Tensor::from_f32(vec![3], vec![1.0, 1.0, 2.0]).unwrap();
//! let c = sub_dim_new(&a, &b, 1, 1.0).unwrap();
//! assert_eq!(c.as_f32().unwrap(), &[0.0, 1.0, 1.0, 3.0, 4.0, 4.0]);
//! ```

use super::grid::{MAX_GROUPS_PER_DIMENSION, MAX_THREADS_PER_BLOCK, thread_grid_2d};
use super::partition::{Layout, Partition};
use super::{Element, KernelLaunch, cpu};
use crate::backend::{Backend, DeviceGuard};
use crate::error::{Result, SubDimError};
use crate::tensors::{DataType, Tensor};

#[cfg(feature = "half_precision")]
use half::f16;

/// Computes `c = a - b * beta`, broadcasting `b` along dimension `n` of `a`.
///
/// # Requirements
/// - `a` and `c` have the same order and element count
/// - `a`, `b` and `c` share element type and device, and none is sparse
/// - `n < a.order()` and `b.unit_num() == a.dim_size()[n]`
///
/// # Errors
/// Returns a [`SubDimError`] describing the first violated requirement, an
/// unavailable precision, or a device failure. `c` is unchanged on error.
pub fn sub_dim(a: &Tensor, b: &Tensor, c: &mut Tensor, n: usize, beta: f32) -> Result<()> {
    report(validate(a, b, c, n).and_then(|partition| run(Some(a), b, c, partition, beta)))
}

/// In-place form of [`sub_dim`]: `a = a - b * beta`.
///
/// # Errors
/// See [`sub_dim`].
pub fn sub_dim_me(a: &mut Tensor, b: &Tensor, n: usize, beta: f32) -> Result<()> {
    report(validate(a, b, a, n).and_then(|partition| run(None, b, a, partition, beta)))
}

/// Allocating form of [`sub_dim`]: returns `a - b * beta` as a new tensor on
/// the device of `a`.
///
/// # Errors
/// See [`sub_dim`].
pub fn sub_dim_new(a: &Tensor, b: &Tensor, n: usize, beta: f32) -> Result<Tensor> {
    let mut c = a.zeros_like();
    sub_dim(a, b, &mut c, n, beta)?;
    Ok(c)
}

fn report<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        log::error!("sub_dim failed: {e}");
    }
    result
}

fn validate(a: &Tensor, b: &Tensor, c: &Tensor, n: usize) -> Result<Partition> {
    if a.unit_num() != c.unit_num() {
        return Err(SubDimError::UnitNumMismatch {
            a: a.unit_num(),
            c: c.unit_num(),
        });
    }
    if a.data_type() != b.data_type() || a.data_type() != c.data_type() {
        return Err(SubDimError::TypeMismatch {
            a: a.data_type(),
            b: b.data_type(),
            c: c.data_type(),
        });
    }
    if a.order() != c.order() {
        return Err(SubDimError::OrderMismatch {
            a: a.order(),
            c: c.order(),
        });
    }
    if a.is_sparse() || b.is_sparse() || c.is_sparse() {
        return Err(SubDimError::SparseTensor);
    }
    if a.dev_id() != b.dev_id() || a.dev_id() != c.dev_id() {
        return Err(SubDimError::DeviceMismatch {
            a: a.dev_id(),
            b: b.dev_id(),
            c: c.dev_id(),
        });
    }

    let partition = Partition::new(a.dim_size(), n)?;
    if partition.block_size != b.unit_num() {
        return Err(SubDimError::ShapeMismatch {
            axis: n,
            expected: partition.block_size,
            found: b.unit_num(),
        });
    }
    debug_assert_eq!(partition.unit_num(), a.unit_num());

    Ok(partition)
}

fn run(a: Option<&Tensor>, b: &Tensor, c: &mut Tensor, partition: Partition, beta: f32) -> Result<()> {
    let layout = partition.layout()?;
    let dtype = c.data_type();
    let dev_id = c.dev_id();

    let guard = DeviceGuard::select(dev_id);
    let backend = guard.backend();

    match dtype {
        DataType::Float32 => {}
        DataType::Float16 => {
            if !supports_half_precision(backend, dev_id)? {
                return Err(SubDimError::PrecisionNotCompiled(dev_id));
            }
        }
        other => return Err(SubDimError::UnsupportedType(other)),
    }

    // an unavailable device fails here, before the copy path writes `c`
    let (max_threads, max_groups) = launch_limits(backend, dev_id)?;

    if beta == 0.0 {
        if let Some(a) = a {
            c.data_mut().clone_from(a.data());
        }
        log::debug!("sub_dim: beta is zero, no kernel launched");
        return Ok(());
    }

    let geometry = match layout {
        Layout::Row => thread_grid_2d(
            partition.block_size,
            partition.block_num,
            max_threads,
            max_groups,
        ),
        Layout::Column => thread_grid_2d(
            partition.stride * partition.block_num,
            partition.block_size,
            max_threads,
            max_groups,
        ),
    };

    #[allow(clippy::float_cmp)]
    let launch = KernelLaunch {
        partition,
        layout,
        geometry,
        beta_is_one: beta == 1.0,
    };

    log::debug!(
        "sub_dim: {layout:?} layout, {dtype} on device {dev_id} ({backend:?}), \
         {partition:?}, grids {:?}, blocks {:?}, beta_is_one={}",
        geometry.grids,
        geometry.blocks,
        launch.beta_is_one
    );

    match dtype {
        DataType::Float32 => launch_typed::<f32>(backend, dev_id, a, b, c, &launch, beta),
        #[cfg(feature = "half_precision")]
        DataType::Float16 => launch_typed::<f16>(backend, dev_id, a, b, c, &launch, beta),
        #[cfg(not(feature = "half_precision"))]
        DataType::Float16 => Err(SubDimError::PrecisionNotCompiled(dev_id)),
        other => Err(SubDimError::UnsupportedType(other)),
    }
}

fn supports_half_precision(backend: Backend, dev_id: i32) -> Result<bool> {
    match backend {
        Backend::Cpu => Ok(super::host_supports_half_precision()),
        #[cfg(feature = "wgpu")]
        Backend::Wgpu => Ok(super::wgpu::supports_half_precision(dev_id)?),
        #[cfg(not(feature = "wgpu"))]
        Backend::Wgpu => Err(SubDimError::DeviceUnavailable(dev_id)),
    }
}

/// Work-items per work-group and work-groups per grid axis of the device.
fn launch_limits(backend: Backend, dev_id: i32) -> Result<(usize, usize)> {
    match backend {
        Backend::Cpu => Ok((MAX_THREADS_PER_BLOCK, MAX_GROUPS_PER_DIMENSION)),
        #[cfg(feature = "wgpu")]
        Backend::Wgpu => Ok((
            super::wgpu::max_threads_per_block(dev_id)?,
            super::wgpu::max_groups_per_dimension(dev_id)?,
        )),
        #[cfg(not(feature = "wgpu"))]
        Backend::Wgpu => Err(SubDimError::DeviceUnavailable(dev_id)),
    }
}

fn typed<T: Element>(t: &Tensor) -> Result<&[T]> {
    T::storage(t.data()).ok_or_else(|| {
        SubDimError::InvalidTensor(format!(
            "expected {} storage, found {}",
            T::DATA_TYPE,
            t.data_type()
        ))
    })
}

fn typed_mut<T: Element>(t: &mut Tensor) -> Result<&mut [T]> {
    let found = t.data_type();
    T::storage_mut(t.data_mut()).ok_or_else(|| {
        SubDimError::InvalidTensor(format!(
            "expected {} storage, found {found}",
            T::DATA_TYPE
        ))
    })
}

fn launch_typed<T: Element>(
    backend: Backend,
    dev_id: i32,
    a: Option<&Tensor>,
    b: &Tensor,
    c: &mut Tensor,
    launch: &KernelLaunch,
    beta: f32,
) -> Result<()> {
    // the scale factor takes the element's representation before launch
    let beta = T::from_f32(beta);
    let b_data = typed::<T>(b)?;

    match backend {
        Backend::Cpu => {
            let a_data = a.map(typed::<T>).transpose()?;
            cpu::launch(a_data, b_data, typed_mut::<T>(c)?, launch, beta);
            Ok(())
        }
        #[cfg(feature = "wgpu")]
        Backend::Wgpu => {
            let c_data = typed_mut::<T>(c)?;
            match a {
                Some(a) => super::wgpu::launch(dev_id, typed::<T>(a)?, b_data, c_data, launch, beta.into_f32())?,
                None => {
                    let src = c_data.to_vec();
                    super::wgpu::launch(dev_id, &src, b_data, c_data, launch, beta.into_f32())?;
                }
            }
            Ok(())
        }
        #[cfg(not(feature = "wgpu"))]
        Backend::Wgpu => Err(SubDimError::DeviceUnavailable(dev_id)),
    }
}
