pub mod buffer;
pub mod error;
pub mod gpu_module;
pub mod reduction;
pub mod reference;
pub mod shader_manager;
pub mod timer;
pub mod work_size;

pub use buffer::{DeviceBuffer, GpuMem32f, GpuMem32i, GpuMem32u};
pub use error::{expect_same, GpuError, Result};
pub use gpu_module::{AdapterSummary, DeviceSelection, GpuModule};
pub use reduction::{
    GpuReduction, HostReduction, MaxPrefixSumDriver, PrefixSummary, ReductionDevice,
    ReductionOutcome,
};
pub use shader_manager::{Defines, Kernel, KernelKind, SumVariant, TransposeVariant};
pub use timer::Timer;
pub use work_size::WorkSize;

use tracing::warn;

/// Validates a 2D tile for the transpose kernels against device limits.
pub fn check_tile_size(info: &AdapterSummary, tile_size: u32) -> Result<()> {
    let invocations = tile_size.saturating_mul(tile_size);

    if tile_size == 0 || invocations > info.max_invocations_per_workgroup {
        warn!(tile_size, "Tile size rejected by device limits");

        return Err(GpuError::InvalidGroupSize {
            group_size: tile_size,
            max: (info.max_invocations_per_workgroup as f64).sqrt() as u32,
        });
    }

    Ok(())
}

/// Validates a 1D workgroup size for the sum kernels. The local tree
/// reduction halves the group each step, so it must be a power of two.
pub fn check_workgroup_size(info: &AdapterSummary, group_size: u32) -> Result<()> {
    let max = info.max_group_size();

    if group_size == 0 || group_size > max || !group_size.is_power_of_two() {
        warn!(group_size, max, "Workgroup size rejected by device limits");

        return Err(GpuError::InvalidGroupSize { group_size, max });
    }

    Ok(())
}
