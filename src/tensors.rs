//! Core tensor descriptor.
//!
//! # Tensor Descriptor
//!
//! A [`Tensor`] is a dense, row-major, multi-dimensional array together with
//! the metadata the broadcast kernels need:
//!
//! - `order` and per-dimension extents (`dim_size`)
//! - the element count (`unit_num`), always equal to the product of the extents
//! - the element type ([`DataType`]), carried by the storage variant
//! - a sparsity flag (sparse tensors are rejected by the kernels)
//! - the device id the tensor belongs to (negative ids denote the host)
//!
//! ## Design Highlights
//! - Storage is an enum over concrete element vectors, so the dtype can never
//!   disagree with the buffer
//! - Construction validates the shape once; accessors never re-check
//! - The `tensor!` macro builds `f32` tensors from nested literals
//!
//! ## Example
//!
//! ```rust
//! use subdim::tensors::{DataType, Tensor};
//! let t = Tensor::from_f32(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! assert_eq!(t.dim_size(), &[2, 3]);
//! assert_eq!(t.data_type(), DataType::Float32);
//! ```

use crate::backend::HOST_DEVICE;
use crate::error::{Result, SubDimError};
use half::f16;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// IEEE 754 single precision.
    Float32,
    /// IEEE 754 half precision.
    Float16,
    /// 32-bit signed integer. Storable, but no broadcast kernel exists for it.
    Int32,
}

impl DataType {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Float16 => 2,
        }
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Float32 => write!(f, "f32"),
            Self::Float16 => write!(f, "f16"),
            Self::Int32 => write!(f, "i32"),
        }
    }
}

/// Contiguous element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F16(Vec<f16>),
    I32(Vec<i32>),
}

impl TensorData {
    /// Allocates `len` zero elements of the given type.
    #[must_use]
    pub fn zeros(dtype: DataType, len: usize) -> Self {
        match dtype {
            DataType::Float32 => Self::F32(vec![0.0; len]),
            DataType::Float16 => Self::F16(vec![f16::ZERO; len]),
            DataType::Int32 => Self::I32(vec![0; len]),
        }
    }

    /// Number of stored elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::I32(v) => v.len(),
        }
    }

    /// Returns `true` if no elements are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type of the storage.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::F32(_) => DataType::Float32,
            Self::F16(_) => DataType::Float16,
            Self::I32(_) => DataType::Int32,
        }
    }
}

/// Represents an N-dimensional dense tensor in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dim_size: Vec<usize>,
    data: TensorData,
    is_sparse: bool,
    dev_id: i32,
}

impl Tensor {
    /// Creates a host tensor from a shape and matching storage.
    ///
    /// # Errors
    ///
    /// Fails if the shape is empty, has a zero extent, or does not describe
    /// exactly `data.len()` elements.
    pub fn new(shape: impl Into<Vec<usize>>, data: TensorData) -> Result<Self> {
        let dim_size = shape.into();
        if dim_size.is_empty() {
            return Err(SubDimError::InvalidTensor(
                "a tensor must have order >= 1".to_string(),
            ));
        }
        if dim_size.contains(&0) {
            return Err(SubDimError::InvalidTensor(format!(
                "shape {dim_size:?} has a zero extent"
            )));
        }
        let units: usize = dim_size.iter().product();
        if units != data.len() {
            return Err(SubDimError::InvalidTensor(format!(
                "shape {dim_size:?} is incompatible with {} data elements",
                data.len()
            )));
        }

        Ok(Self {
            dim_size,
            data,
            is_sparse: false,
            dev_id: HOST_DEVICE,
        })
    }

    /// Creates a single precision tensor.
    ///
    /// # Errors
    ///
    /// See [`Tensor::new`].
    pub fn from_f32(shape: impl Into<Vec<usize>>, data: Vec<f32>) -> Result<Self> {
        Self::new(shape, TensorData::F32(data))
    }

    /// Creates a half precision tensor.
    ///
    /// # Errors
    ///
    /// See [`Tensor::new`].
    pub fn from_f16(shape: impl Into<Vec<usize>>, data: Vec<f16>) -> Result<Self> {
        Self::new(shape, TensorData::F16(data))
    }

    /// Creates a zero-filled tensor of the given type.
    ///
    /// # Errors
    ///
    /// See [`Tensor::new`].
    pub fn zeros(shape: impl Into<Vec<usize>>, dtype: DataType) -> Result<Self> {
        let shape = shape.into();
        let units = shape.iter().product();
        Self::new(shape, TensorData::zeros(dtype, units))
    }

    /// Creates a zero-filled tensor with the shape, type and device of `self`.
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self {
            dim_size: self.dim_size.clone(),
            data: TensorData::zeros(self.data_type(), self.unit_num()),
            is_sparse: false,
            dev_id: self.dev_id,
        }
    }

    /// Moves the descriptor to another device id. Negative ids denote the host.
    #[must_use]
    pub const fn on_device(mut self, dev_id: i32) -> Self {
        self.dev_id = dev_id;
        self
    }

    /// Marks the tensor as sparse (or dense).
    #[must_use]
    pub const fn sparse(mut self, is_sparse: bool) -> Self {
        self.is_sparse = is_sparse;
        self
    }

    /// Number of dimensions.
    #[must_use]
    pub fn order(&self) -> usize {
        self.dim_size.len()
    }

    /// Per-dimension extents.
    #[must_use]
    pub fn dim_size(&self) -> &[usize] {
        &self.dim_size
    }

    /// Total number of elements.
    #[must_use]
    pub fn unit_num(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    #[must_use]
    pub const fn is_sparse(&self) -> bool {
        self.is_sparse
    }

    #[must_use]
    pub const fn dev_id(&self) -> i32 {
        self.dev_id
    }

    #[must_use]
    pub const fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut TensorData {
        &mut self.data
    }

    /// Typed view of single precision storage.
    #[must_use]
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Typed view of half precision storage.
    #[must_use]
    pub fn as_f16(&self) -> Option<&[f16]> {
        match &self.data {
            TensorData::F16(v) => Some(v),
            _ => None,
        }
    }

    /// Copies the elements into a widened `f32` vector.
    ///
    /// Integer elements are converted with `as`, which is exact below 2^24.
    #[must_use]
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match &self.data {
            TensorData::F32(v) => v.clone(),
            TensorData::F16(v) => v.iter().map(|x| x.to_f32()).collect(),
            #[allow(clippy::cast_precision_loss)]
            TensorData::I32(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }

    /// Returns `true` if both tensors have identical extents.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.dim_size == other.dim_size
    }
}

/// Defines an `f32` tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
/// Negative values must be parenthesized, e.g. `(-1.0)`.
///
/// # Panics
/// Panics on ragged literals.
///
/// # Example
/// ```
/// use subdim::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, (-4.0)]]);
/// assert_eq!(t.dim_size(), &[2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    (@nest [ $( $inner:tt ),+ $(,)? ]) => {{
        let children: ::std::vec::Vec<(::std::vec::Vec<usize>, ::std::vec::Vec<f32>)> =
            vec![ $( $crate::tensor!(@nest $inner) ),+ ];
        let first_shape = children[0].0.clone();
        assert!(children.iter().all(|c| c.0 == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = ::std::vec::Vec::with_capacity(children.len() * children[0].1.len());
        for c in children { data.extend(c.1); }
        (shape, data)
    }};

    (@nest $value:expr) => {
        (::std::vec::Vec::<usize>::new(), vec![($value) as f32])
    };

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let (shape, data) = $crate::tensor!(@nest [ $( $inner ),+ ]);
        match $crate::tensors::Tensor::from_f32(shape, data) {
            Ok(t) => t,
            Err(e) => panic!("{e}"),
        }
    }};
}
