use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::Arc;

use bytemuck::Pod;
use wgpu::{Buffer, Device, Queue};

use super::error::{GpuError, Result};
use super::gpu_module::{checked, synchronize, GpuModule};

/// Fixed-capacity array of `T` in device memory.
///
/// Capacity is set at creation and never changes; `swap` exchanges the
/// underlying allocations of two buffers without touching their contents.
pub struct DeviceBuffer<T: Pod> {
    device: Arc<Device>,
    queue: Arc<Queue>,
    buffer: Buffer,
    len: usize,
    _element: PhantomData<T>,
}

pub type GpuMem32i = DeviceBuffer<i32>;
pub type GpuMem32u = DeviceBuffer<u32>;
pub type GpuMem32f = DeviceBuffer<f32>;

impl<T: Pod> DeviceBuffer<T> {
    #[track_caller]
    pub fn create_n(gpu: &GpuModule, n: usize, label: &str) -> Result<Self> {
        if n == 0 {
            return Err(GpuError::EmptyBuffer);
        }
        if size_of::<T>() % 4 != 0 {
            return Err(GpuError::UnalignedElement {
                size: size_of::<T>(),
            });
        }

        let buffer = gpu.checked("create_buffer", || {
            gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: (n * size_of::<T>()) as u64,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;

        return Ok(Self {
            device: gpu.device.clone(),
            queue: gpu.queue.clone(),
            buffer,
            len: n,
            _element: PhantomData,
        });
    }

    /// Creates a buffer sized to `data` and uploads it.
    #[track_caller]
    pub fn from_slice(gpu: &GpuModule, data: &[T], label: &str) -> Result<Self> {
        let buffer = Self::create_n(gpu, data.len(), label)?;
        buffer.write_n(data)?;

        return Ok(buffer);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn raw(&self) -> &Buffer {
        &self.buffer
    }

    fn byte_len(n: usize) -> u64 {
        (n * size_of::<T>()) as u64
    }

    fn check_len(&self, n: usize) -> Result<()> {
        if n > self.len {
            return Err(GpuError::LengthMismatch {
                expected: self.len,
                actual: n,
            });
        }
        Ok(())
    }

    /// Writes `data` into the first `data.len()` elements.
    #[track_caller]
    pub fn write_n(&self, data: &[T]) -> Result<()> {
        self.check_len(data.len())?;

        if data.is_empty() {
            return Ok(());
        }

        return checked(&self.device, "write_buffer", || {
            self.queue
                .write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        });
    }

    /// Reads the first `n` elements back to the host, blocking until the
    /// copy has completed.
    #[track_caller]
    pub fn read_n(&self, n: usize) -> Result<Vec<T>> {
        self.check_len(n)?;

        if n == 0 {
            return Ok(Vec::new());
        }

        let size = Self::byte_len(n);

        let staging_buffer = checked(&self.device, "read_buffer", || {
            let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Staging Buffer"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Read Encoder"),
                });

            encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging_buffer, 0, size);
            self.queue.submit(std::iter::once(encoder.finish()));

            staging_buffer
        })?;

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = flume::bounded(1);

        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = sender.send(v);
        });

        loop {
            synchronize(&self.device)?;

            if let Ok(result) = receiver.try_recv() {
                result?;
                break;
            }
        }

        let data = buffer_slice.get_mapped_range();
        let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();

        drop(data);

        staging_buffer.unmap();

        return Ok(values);
    }

    /// Device-to-device copy of the first `n` elements into `other`.
    #[track_caller]
    pub fn copy_to_n(&self, other: &DeviceBuffer<T>, n: usize) -> Result<()> {
        self.check_len(n)?;
        other.check_len(n)?;

        if n == 0 {
            return Ok(());
        }

        return checked(&self.device, "copy_buffer", || {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Copy Encoder"),
                });

            encoder.copy_buffer_to_buffer(&self.buffer, 0, &other.buffer, 0, Self::byte_len(n));
            self.queue.submit(std::iter::once(encoder.finish()));
        });
    }

    pub fn swap(&mut self, other: &mut DeviceBuffer<T>) {
        std::mem::swap(&mut self.buffer, &mut other.buffer);
        std::mem::swap(&mut self.len, &mut other.len);
    }
}
