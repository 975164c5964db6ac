use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use tracing::{info, trace};
use wgpu::{Adapter, Device, Queue};

use super::error::{GpuError, Result};
use super::shader_manager::ShaderManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    #[default]
    HighPerformance,
    Index(usize),
}

#[derive(Debug, Clone)]
pub struct AdapterSummary {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
    pub driver: String,
    pub driver_info: String,
    pub max_buffer_size_mb: u64,
    pub max_storage_binding_mb: u64,
    pub max_workgroup_size_x: u32,
    pub max_invocations_per_workgroup: u32,
    pub max_workgroups_per_dimension: u32,
    pub max_workgroup_storage_bytes: u32,
}

impl AdapterSummary {
    pub fn from_adapter(adapter: &Adapter) -> Self {
        let info = adapter.get_info();
        let limits = adapter.limits();

        Self {
            name: info.name,
            vendor: info.vendor,
            device: info.device,
            device_type: info.device_type,
            backend: info.backend,
            driver: info.driver,
            driver_info: info.driver_info,
            max_buffer_size_mb: limits.max_buffer_size >> 20,
            max_storage_binding_mb: (limits.max_storage_buffer_binding_size as u64) >> 20,
            max_workgroup_size_x: limits.max_compute_workgroup_size_x,
            max_invocations_per_workgroup: limits.max_compute_invocations_per_workgroup,
            max_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
            max_workgroup_storage_bytes: limits.max_compute_workgroup_storage_size,
        }
    }

    /// Largest 1D workgroup the device accepts.
    pub fn max_group_size(&self) -> u32 {
        self.max_workgroup_size_x.min(self.max_invocations_per_workgroup)
    }
}

impl fmt::Display for AdapterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    device name: {}", self.name)?;
        writeln!(f, "    device type: {:?}", self.device_type)?;
        writeln!(f, "    backend: {:?}", self.backend)?;
        writeln!(f, "    vendor id: {:#06X}, device id: {:#06X}", self.vendor, self.device)?;
        writeln!(f, "    driver: {} {}", self.driver, self.driver_info)?;
        writeln!(f, "    max buffer size [Mb]: {}", self.max_buffer_size_mb)?;
        writeln!(f, "    max storage binding [Mb]: {}", self.max_storage_binding_mb)?;
        writeln!(
            f,
            "    max workgroup size: {} (invocations: {})",
            self.max_workgroup_size_x, self.max_invocations_per_workgroup
        )?;
        write!(
            f,
            "    max workgroups per dimension: {}, workgroup storage [bytes]: {}",
            self.max_workgroups_per_dimension, self.max_workgroup_storage_bytes
        )
    }
}

pub struct GpuModule {
    pub adapter: Adapter,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    pub info: AdapterSummary,
    pub shader_manager: ShaderManager,
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

impl GpuModule {
    pub fn enumerate_adapters() -> Vec<AdapterSummary> {
        return create_instance()
            .enumerate_adapters(wgpu::Backends::all())
            .iter()
            .map(AdapterSummary::from_adapter)
            .collect();
    }

    pub async fn new(selection: DeviceSelection) -> Result<Self> {
        let instance = create_instance();

        let adapter = match selection {
            DeviceSelection::HighPerformance => instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|_| GpuError::NoAdapter)?,

            DeviceSelection::Index(index) => {
                let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
                let available = adapters.len();

                if available == 0 {
                    return Err(GpuError::NoAdapter);
                }
                if index >= available {
                    return Err(GpuError::AdapterIndex { index, available });
                }

                adapters.swap_remove(index)
            }
        };

        let info = AdapterSummary::from_adapter(&adapter);

        info!(
            adapter = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "Using adapter"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("gpu-accel device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        return Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            info,
            shader_manager: ShaderManager::new(),
        });
    }

    /// Runs `call` inside validation and out-of-memory error scopes and turns
    /// a captured error into [`GpuError::Api`] tagged with the caller's location.
    #[track_caller]
    pub fn checked<T>(&self, operation: &'static str, call: impl FnOnce() -> T) -> Result<T> {
        return checked(&self.device, operation, call);
    }

    /// Blocks until all submitted work has finished.
    pub fn synchronize(&self) -> Result<()> {
        synchronize(&self.device)
    }

    pub fn max_workgroups_per_dimension(&self) -> u32 {
        self.info.max_workgroups_per_dimension
    }

    pub fn print_info(&self) {
        println!("GPU Info:");
        println!("{}", self.info);
    }
}

#[track_caller]
pub(crate) fn checked<T>(
    device: &Device,
    operation: &'static str,
    call: impl FnOnce() -> T,
) -> Result<T> {
    let location = Location::caller();

    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let value = call();

    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());

    if let Some(error) = validation.or(out_of_memory) {
        return Err(GpuError::Api {
            operation,
            location,
            message: error.to_string(),
        });
    }

    trace!(operation, %location, "GPU call ok");

    return Ok(value);
}

pub(crate) fn synchronize(device: &Device) -> Result<()> {
    device.poll(wgpu::PollType::Wait)?;
    Ok(())
}
