//! wgpu backend
//!
//! Compiles `shaders/forces.wgsl` with the configured group size. Buffers are
//! allocated inside an out-of-memory error scope so allocation failures come
//! back as [`CapacityError`] instead of a device panic. Readback goes through a
//! cached `MAP_READ` staging buffer and blocks on `PollType::Wait`, which is the
//! synchronization point between a dispatch and its download.

use crate::device::{Binding, ComputeDevice, Scalar};
use crate::error::{CapacityError, EngineError};
use crate::params::{KernelParams, StepParams};

const KERNEL_SOURCE: &str = include_str!("shaders/forces.wgsl");
const WORKGROUP_SIZE_DECL: &str = "const WORKGROUP_SIZE: u32 = 64u;";

/// Binding slot of the `StepParams` uniform
const PARAMS_BINDING: u32 = 3;

/// Kernel source with `WORKGROUP_SIZE` set to `group_size`
pub fn kernel_source(group_size: u32) -> String {
    KERNEL_SOURCE.replace(
        WORKGROUP_SIZE_DECL,
        &format!("const WORKGROUP_SIZE: u32 = {group_size}u;"),
    )
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    params: KernelParams,

    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,

    bound: [Option<wgpu::Buffer>; 3],
    scalars: [u32; 2],

    // Grown on demand, never shrunk
    readback_buffer: Option<wgpu::Buffer>,
}

impl WgpuDevice {
    /// Request a high-performance adapter and build the force pipeline on it
    pub async fn new(params: KernelParams) -> Result<Self, EngineError> {
        params.validate()?;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        log::info!("Using GPU: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Gravity Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Self::from_device(device, queue, params)
    }

    /// Build the force pipeline on an existing device
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        params: KernelParams,
    ) -> Result<Self, EngineError> {
        params.validate()?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Force Compute Shader"),
            source: wgpu::ShaderSource::Wgsl(kernel_source(params.group_size).into()),
        });

        let storage_entry = |binding: Binding, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding: binding.index(),
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Force Bind Group Layout"),
            entries: &[
                storage_entry(Binding::Ships, true),
                storage_entry(Binding::Planets, true),
                storage_entry(Binding::OutForces, false),
                wgpu::BindGroupLayoutEntry {
                    binding: PARAMS_BINDING,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Force Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Force Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Step Params Buffer"),
            size: std::mem::size_of::<StepParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::info!("Force pipeline created (group size {})", params.group_size);

        Ok(Self {
            device,
            queue,
            params,
            pipeline,
            bind_group_layout,
            params_buffer,
            bound: [None, None, None],
            scalars: [0; 2],
            readback_buffer: None,
        })
    }

    fn readback_buffer(&mut self, size: u64) -> wgpu::Buffer {
        if let Some(buffer) = &self.readback_buffer {
            if buffer.size() >= size {
                return buffer.clone();
            }
        }

        if let Some(old) = self.readback_buffer.take() {
            old.destroy();
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Force Readback Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.readback_buffer = Some(buffer.clone());
        buffer
    }
}

impl ComputeDevice for WgpuDevice {
    type Buffer = wgpu::Buffer;

    fn params(&self) -> &KernelParams {
        &self.params
    }

    fn allocate(&mut self, binding: Binding, len: usize, stride: usize) -> Result<wgpu::Buffer, EngineError> {
        let limits = self.device.limits();
        let limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        let bytes = (len as u64).saturating_mul(stride as u64);
        if bytes > limit {
            return Err(CapacityError::InvalidSize { binding, bytes, limit }.into());
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(binding.name()),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("{binding} buffer allocation failed: {err}");
            buffer.destroy();
            return Err(CapacityError::OutOfMemory { binding, bytes }.into());
        }

        log::debug!("Allocated {binding} buffer ({bytes} bytes)");
        Ok(buffer)
    }

    fn release(&mut self, buffer: wgpu::Buffer) {
        // Any binding may refer to it; the engine rebinds before every dispatch
        self.bound = [None, None, None];
        buffer.destroy();
    }

    fn write(&mut self, buffer: &wgpu::Buffer, bytes: &[u8]) -> Result<(), EngineError> {
        if bytes.len() as u64 > buffer.size() {
            return Err(EngineError::Dispatch(format!(
                "write of {} bytes into a {} byte buffer",
                bytes.len(),
                buffer.size()
            )));
        }
        self.queue.write_buffer(buffer, 0, bytes);
        Ok(())
    }

    fn bind_buffer(&mut self, binding: Binding, buffer: &wgpu::Buffer) {
        self.bound[binding.index() as usize] = Some(buffer.clone());
    }

    fn bind_scalar(&mut self, scalar: Scalar, value: u32) {
        match scalar {
            Scalar::ShipCount => self.scalars[0] = value,
            Scalar::PlanetCount => self.scalars[1] = value,
        }
    }

    fn dispatch(&mut self, groups: [u32; 3]) -> Result<(), EngineError> {
        let step = StepParams {
            ship_count: self.scalars[0],
            planet_count: self.scalars[1],
            min_distance_sq: self.params.min_distance_sq,
            _padding: 0,
        };
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&step));

        let mut entries = Vec::with_capacity(4);
        for binding in Binding::ALL {
            let buffer = self.bound[binding.index() as usize]
                .as_ref()
                .ok_or(EngineError::Unallocated(binding))?;
            entries.push(wgpu::BindGroupEntry {
                binding: binding.index(),
                resource: buffer.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: PARAMS_BINDING,
            resource: self.params_buffer.as_entire_binding(),
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Force Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Force Encoder"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Force Compute Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(EngineError::Dispatch(err.to_string()));
        }
        Ok(())
    }

    fn read(&mut self, buffer: &wgpu::Buffer, out: &mut [u8]) -> Result<(), EngineError> {
        let size = out.len() as u64;
        if size > buffer.size() {
            return Err(EngineError::Dispatch(format!(
                "readback of {size} bytes from a {} byte buffer",
                buffer.size()
            )));
        }

        let staging = self.readback_buffer(size);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Force Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        // Blocks until the dispatch and the copy above have finished
        self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        rx.recv()
            .map_err(|_| EngineError::Dispatch("readback callback never ran".into()))??;

        {
            let data = slice.get_mapped_range();
            out.copy_from_slice(&data);
        }
        staging.unmap();

        Ok(())
    }
}
