//! GPU-accelerated broadcast subtraction using WGPU.
//!
//! This module runs the row/column kernel pair as WGSL compute shaders. Each
//! work-group caches its slice of the broadcast vector in `var<workgroup>`
//! memory, loaded by a single lane per slice and published with
//! `workgroupBarrier()` before any lane reads it. Grids are clamped to the
//! device's work-group limit and the shaders sweep the rest in grid-stride
//! steps.
//!
//! Contexts are created lazily, one per device id, by enumerating the
//! available adapters. Pipelines are compiled on first use and cached per
//! `(layout, dtype, beta == 1, work-group shape)`:
//!
//! - the element type and work-group shape are substituted into the shader text
//! - `beta == 1` is the pipeline-overridable constant `BETA_IS_ONE`
//!
//! Tensor data is copied to the GPU for compute and read back into the output
//! tensor only once the kernel has completed successfully. Buffers over the
//! device's binding limit are rejected before upload, and validation errors
//! raised while recording are returned instead of reaching the uncaptured
//! error handler.

use super::partition::Layout;
use super::{Element, KernelLaunch};
use crate::tensors::DataType;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use wgpu::util::DeviceExt;

const SUB_DIM_ROW: &str = include_str!("shaders/sub_dim_row.wgsl");
const SUB_DIM_COL: &str = include_str!("shaders/sub_dim_col.wgsl");

/// Basic wrapper for common GPU errors.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No adapter exists for the device id.
    #[error("Adapter error: no adapter for device {0}")]
    Adapter(i32),
    /// An error in requesting the GPU (device).
    #[error("Device error: {0}")]
    Device(wgpu::RequestDeviceError),
    /// Waiting for the queue failed.
    #[error("Poll error: {0}")]
    Poll(wgpu::PollError),
    /// Mapping the readback buffer failed.
    #[error("Map error: {0}")]
    Map(wgpu::BufferAsyncError),
    /// The grid exceeds the per-dimension work-group limit.
    #[error("Dispatch error: grid {grids:?} exceeds {limit} work-groups per dimension")]
    DispatchTooLarge { grids: [usize; 2], limit: u32 },
    /// A buffer exceeds what the device can bind.
    #[error("Buffer error: {bytes} bytes exceed the {limit}-byte binding limit")]
    BufferTooLarge { bytes: u64, limit: u64 },
    /// The device rejected a resource or command.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// A type of error closely related to the GPU.
#[derive(Debug, Error)]
#[error("{}", describe(.kind, .message))]
pub struct GpuFailure {
    /// The optional type of failure that occured.
    pub kind: Option<GpuError>,
    /// The optional message explaining the failure.
    pub message: Option<String>,
}

fn describe(kind: &Option<GpuError>, message: &Option<String>) -> String {
    match (kind, message) {
        (Some(kind), _) => format!("GPU failure: {kind}"),
        (None, Some(msg)) => format!("GPU failure: {msg}"),
        (None, None) => "Unknown GPU failure".to_string(),
    }
}

impl From<GpuError> for GpuFailure {
    fn from(kind: GpuError) -> Self {
        Self {
            kind: Some(kind),
            message: None,
        }
    }
}

impl From<wgpu::PollError> for GpuFailure {
    fn from(e: wgpu::PollError) -> Self {
        GpuError::Poll(e).into()
    }
}

impl From<&str> for GpuFailure {
    fn from(msg: &str) -> Self {
        Self {
            kind: None,
            message: Some(msg.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    layout: Layout,
    dtype: DataType,
    beta_is_one: bool,
    blocks: [u32; 2],
}

/// Uniform block shared by both shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    row_num: u32,
    col_num: u32,
    block_size: u32,
    block_num: u32,
    beta: f32,
    _pad: [u32; 3],
}

/// Holds the WGPU device and queue of one device id.
pub struct GpuContext {
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// A queue for information related to the device.
    pub queue: wgpu::Queue,
    /// Whether `f16` kernels are compiled in and the adapter supports them.
    pub half_precision: bool,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Mutex<HashMap<PipelineKey, Arc<wgpu::ComputePipeline>>>,
}

fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuContext {
    /// Opens the `dev_id`-th adapter and creates a device + queue.
    ///
    /// `SHADER_F16` is requested when the half precision path is compiled in
    /// and the adapter offers it.
    ///
    /// # Errors
    ///
    /// - `GpuError::Adapter` if fewer than `dev_id + 1` adapters exist
    /// - `GpuError::Device` if device acquisition fails
    pub fn new(dev_id: i32) -> Result<Self, GpuError> {
        let index = usize::try_from(dev_id).map_err(|_| GpuError::Adapter(dev_id))?;
        let instance = wgpu::Instance::default();
        let adapter = instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .nth(index)
            .ok_or(GpuError::Adapter(dev_id))?;

        let half_precision = cfg!(feature = "half_precision")
            && adapter.features().contains(wgpu::Features::SHADER_F16);
        let required_features = if half_precision {
            wgpu::Features::SHADER_F16
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("subdim"),
            required_features,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(GpuError::Device)?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sub_dim_bgl"),
            entries: &[
                buffer_entry(0, wgpu::BufferBindingType::Uniform),
                buffer_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(2, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(3, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        log::debug!(
            "opened device {dev_id}: {} (f16: {half_precision})",
            adapter.get_info().name
        );

        Ok(Self {
            device,
            queue,
            half_precision,
            bind_group_layout,
            pipelines: Mutex::new(HashMap::new()),
        })
    }

    /// Work-item ceiling per work-group.
    #[must_use]
    pub fn max_threads_per_block(&self) -> usize {
        let limits = self.device.limits();
        limits
            .max_compute_invocations_per_workgroup
            .min(limits.max_compute_workgroup_size_x)
            .min(limits.max_compute_workgroup_size_y) as usize
    }

    /// Work-group ceiling per grid axis.
    #[must_use]
    pub fn max_groups_per_dimension(&self) -> usize {
        self.device.limits().max_compute_workgroups_per_dimension as usize
    }

    fn pipeline(&self, key: PipelineKey) -> Arc<wgpu::ComputePipeline> {
        let mut cache = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pipeline) = cache.get(&key) {
            return Arc::clone(pipeline);
        }

        let (template, label) = match key.layout {
            Layout::Row => (SUB_DIM_ROW, "sub_dim_row"),
            Layout::Column => (SUB_DIM_COL, "sub_dim_col"),
        };
        let source = template
            .replace("{{ENABLE}}", if key.dtype == DataType::Float16 { "enable f16;" } else { "" })
            .replace("{{ELEM}}", &key.dtype.to_string())
            .replace("{{BLOCK_X}}", &key.blocks[0].to_string())
            .replace("{{BLOCK_Y}}", &key.blocks[1].to_string());

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sub_dim_pipeline_layout"),
            bind_group_layouts: &[&self.bind_group_layout],
            push_constant_ranges: &[],
        });
        let constants = [("BETA_IS_ONE", if key.beta_is_one { 1.0 } else { 0.0 })];
        let pipeline = Arc::new(self.device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                module: &module,
                entry_point: Some("main"),
                cache: None,
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &constants,
                    ..Default::default()
                },
            },
        ));

        log::debug!("compiled {label} pipeline for {key:?}");
        cache.insert(key, Arc::clone(&pipeline));
        pipeline
    }
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXTS: Mutex<HashMap<i32, Arc<GpuContext>>> = Mutex::new(HashMap::new());
}

/// Returns the context of `dev_id`, creating it on first use.
///
/// # Errors
///
/// See [`GpuContext::new`].
pub fn context(dev_id: i32) -> Result<Arc<GpuContext>, GpuFailure> {
    let mut contexts = GPU_CONTEXTS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(ctx) = contexts.get(&dev_id) {
        return Ok(Arc::clone(ctx));
    }
    let ctx = Arc::new(GpuContext::new(dev_id)?);
    contexts.insert(dev_id, Arc::clone(&ctx));
    Ok(ctx)
}

/// Returns `true` if `f16` kernels can run on `dev_id`.
///
/// # Errors
///
/// Fails if the device cannot be opened.
pub fn supports_half_precision(dev_id: i32) -> Result<bool, GpuFailure> {
    Ok(context(dev_id)?.half_precision)
}

/// Work-item ceiling per work-group of `dev_id`.
///
/// # Errors
///
/// Fails if the device cannot be opened.
pub fn max_threads_per_block(dev_id: i32) -> Result<usize, GpuFailure> {
    Ok(context(dev_id)?.max_threads_per_block())
}

/// Work-group ceiling per grid axis of `dev_id`.
///
/// # Errors
///
/// Fails if the device cannot be opened.
pub fn max_groups_per_dimension(dev_id: i32) -> Result<usize, GpuFailure> {
    Ok(context(dev_id)?.max_groups_per_dimension())
}

/// Byte length of a buffer holding `len` elements of `T`, padded to the
/// 4-byte granularity of buffer copies.
fn padded_len<T: Element>(len: usize) -> u64 {
    (len * size_of::<T>()).next_multiple_of(4).max(4) as u64
}

/// Checks every storage binding against the device limits.
fn check_binding_sizes(sizes: &[u64], limits: &wgpu::Limits) -> Result<(), GpuError> {
    let limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    match sizes.iter().copied().find(|&bytes| bytes > limit) {
        Some(bytes) => Err(GpuError::BufferTooLarge { bytes, limit }),
        None => Ok(()),
    }
}

/// Bytes of `data`, zero-padded to the 4-byte granularity of buffer copies.
fn padded_bytes<T: Element>(data: &[T]) -> Vec<u8> {
    let mut bytes = bytemuck::cast_slice::<T, u8>(data).to_vec();
    bytes.resize(bytes.len().next_multiple_of(4).max(4), 0);
    bytes
}

/// Runs one kernel specialization on `dev_id` and copies the result into `c`.
///
/// `beta` must already be representable in `T`.
///
/// # Errors
///
/// Fails on device, dispatch-limit, buffer-limit, validation or readback
/// errors. `c` is only written
/// after the kernel has completed.
pub fn launch<T: Element>(
    dev_id: i32,
    a: &[T],
    b: &[T],
    c: &mut [T],
    launch: &KernelLaunch,
    beta: f32,
) -> Result<(), GpuFailure> {
    let ctx = context(dev_id)?;
    let device = &ctx.device;
    let queue = &ctx.queue;

    let limit = device.limits().max_compute_workgroups_per_dimension;
    let grids = launch.geometry.grids;
    let (Ok(gx), Ok(gy)) = (u32::try_from(grids[0]), u32::try_from(grids[1])) else {
        return Err(GpuError::DispatchTooLarge { grids, limit }.into());
    };
    if gx > limit || gy > limit {
        return Err(GpuError::DispatchTooLarge { grids, limit }.into());
    }

    let to_u32 = |x: usize| u32::try_from(x).map_err(|_| GpuFailure::from("tensor too large for 32-bit indexing"));
    let params = Params {
        row_num: to_u32(launch.row_num())?,
        col_num: to_u32(launch.col_num())?,
        block_size: to_u32(launch.row_num() * launch.col_num())?,
        block_num: to_u32(launch.partition.block_num)?,
        beta,
        _pad: [0; 3],
    };

    let out_len = c.len() * size_of::<T>();
    let out_size = padded_len::<T>(c.len());
    check_binding_sizes(
        &[padded_len::<T>(a.len()), padded_len::<T>(b.len()), out_size],
        &device.limits(),
    )?;

    let pipeline = ctx.pipeline(PipelineKey {
        layout: launch.layout,
        dtype: T::DATA_TYPE,
        beta_is_one: launch.beta_is_one,
        blocks: [to_u32(launch.geometry.blocks[0])?, to_u32(launch.geometry.blocks[1])?],
    });

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("params"),
        contents: bytemuck::bytes_of(&params),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let a_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("A"),
        contents: &padded_bytes(a),
        usage: wgpu::BufferUsages::STORAGE,
    });

    let b_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("B"),
        contents: &padded_bytes(b),
        usage: wgpu::BufferUsages::STORAGE,
    });

    let c_buf = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("C"),
        size: out_size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("sub_dim_bind_group"),
        layout: &ctx.bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: a_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: b_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: c_buf.as_entire_binding(),
            },
        ],
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("sub_dim_encoder"),
    });

    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("sub_dim_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(gx, gy, 1);
    }

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("sub_dim_staging"),
        size: out_size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    encoder.copy_buffer_to_buffer(&c_buf, 0, &staging, 0, out_size);
    let commands = encoder.finish();

    if let Some(e) = pollster::block_on(device.pop_error_scope()) {
        return Err(GpuError::Validation(e.to_string()).into());
    }
    queue.submit(Some(commands));

    let (tx, rx) = std::sync::mpsc::channel();
    let slice = staging.slice(..);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::PollType::Wait)?;

    rx.recv()
        .map_err(|_| GpuFailure::from("readback callback was dropped"))?
        .map_err(GpuError::Map)?;

    {
        let view = slice.get_mapped_range();
        bytemuck::cast_slice_mut::<T, u8>(c).copy_from_slice(&view[..out_len]);
    }
    staging.unmap();

    Ok(())
}
