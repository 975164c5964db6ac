use std::fmt::Debug;
use std::panic::Location;

#[derive(thiserror::Error, Debug)]
pub enum GpuError {
    #[error("No compute adapter available")]
    NoAdapter,

    #[error("Adapter #{index} requested, but only {available} adapter(s) found")]
    AdapterIndex { index: usize, available: usize },

    #[error("Failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("GPU call `{operation}` failed at {location}: {message}")]
    Api {
        operation: &'static str,
        location: &'static Location<'static>,
        message: String,
    },

    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("Group size {group_size} is invalid (expected 2..={max})")]
    InvalidGroupSize { group_size: u32, max: u32 },

    #[error("Device buffers must hold at least one element")]
    EmptyBuffer,

    #[error("Element size {size} is not a multiple of 4 bytes")]
    UnalignedElement { size: usize },

    #[error("Length mismatch: expected {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Input of {len} elements exceeds the limit of {max}")]
    InputTooLong { len: usize, max: usize },

    #[error("Dispatch of {workgroups:?} workgroups exceeds {max} per dimension")]
    DispatchTooLarge { workgroups: [u32; 2], max: u32 },

    #[error("Kernel {kernel} has unresolved placeholder {{{{{placeholder}}}}}")]
    MissingDefine { kernel: String, placeholder: String },

    #[error("{message} But {expected} != {actual}, {location}")]
    Mismatch {
        message: String,
        expected: String,
        actual: String,
        location: &'static Location<'static>,
    },
}

pub type Result<T> = std::result::Result<T, GpuError>;

/// Fails with [`GpuError::Mismatch`] carrying the caller's location when
/// `expected != actual`.
#[track_caller]
pub fn expect_same<T>(expected: T, actual: T, message: &str) -> Result<()>
where
    T: PartialEq + Debug,
{
    if expected == actual {
        return Ok(());
    }

    return Err(GpuError::Mismatch {
        message: message.to_string(),
        expected: format!("{:?}", expected),
        actual: format!("{:?}", actual),
        location: Location::caller(),
    });
}
