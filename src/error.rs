//! Error taxonomy for dimension-wise broadcast subtraction.
//!
//! Every failure is detected before any work reaches a device, with the
//! exception of accelerator failures during launch or readback. In both cases
//! the output tensor is left untouched.

use crate::tensors::DataType;
use thiserror::Error;

/// Errors reported by the broadcast subtraction entry points.
#[derive(Debug, Error)]
pub enum SubDimError {
    /// The broadcast vector does not match the extent of the chosen axis.
    #[error("shape mismatch: dimension {axis} of `a` has size {expected}, but `b` has {found} elements")]
    ShapeMismatch {
        axis: usize,
        expected: usize,
        found: usize,
    },

    /// The broadcast axis is not a dimension of `a`.
    #[error("axis {axis} is out of range for a tensor of order {order}")]
    AxisOutOfRange { axis: usize, order: usize },

    /// Operands disagree on element type.
    #[error("data type mismatch: a={a}, b={b}, c={c}")]
    TypeMismatch { a: DataType, b: DataType, c: DataType },

    /// `a` and `c` do not have the same rank.
    #[error("order mismatch: `a` has order {a}, `c` has order {c}")]
    OrderMismatch { a: usize, c: usize },

    /// `a` and `c` do not hold the same number of elements.
    #[error("unit count mismatch: `a` has {a} elements, `c` has {c}")]
    UnitNumMismatch { a: usize, c: usize },

    /// Operands live on different devices.
    #[error("device mismatch: a={a}, b={b}, c={c}")]
    DeviceMismatch { a: i32, b: i32, c: i32 },

    /// One of the operands is stored in a sparse format.
    #[error("sparse tensors are not supported by dimension-wise subtraction")]
    SparseTensor,

    /// 16-bit floats were requested but the half-precision path is not available.
    #[error("half precision is not compiled in or not supported by device {0}")]
    PrecisionNotCompiled(i32),

    /// The element type has no kernel at all.
    #[error("unsupported data type: {0}")]
    UnsupportedType(DataType),

    /// The partition produced a stride that is neither row nor column layout.
    #[error("internal error: invalid broadcast stride {0}")]
    InvalidStride(usize),

    /// A tensor descriptor could not be built.
    #[error("invalid tensor: {0}")]
    InvalidTensor(String),

    /// No execution backend exists for the requested device.
    #[error("device {0} is not available")]
    DeviceUnavailable(i32),

    /// The accelerator failed to launch or read back the kernel.
    #[cfg(feature = "wgpu")]
    #[error(transparent)]
    Gpu(#[from] crate::ops::wgpu::GpuFailure),
}

impl SubDimError {
    /// Returns `true` for caller mistakes (shape, type, sparsity, axis),
    /// as opposed to capability gaps, internal errors and device failures.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::AxisOutOfRange { .. }
                | Self::TypeMismatch { .. }
                | Self::OrderMismatch { .. }
                | Self::UnitNumMismatch { .. }
                | Self::DeviceMismatch { .. }
                | Self::SparseTensor
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, SubDimError>;
