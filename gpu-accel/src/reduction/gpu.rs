use super::{PrefixBuffers, ReductionDevice};
use crate::buffer::GpuMem32i;
use crate::error::Result;
use crate::gpu_module::GpuModule;
use crate::shader_manager::{Defines, KernelKind};
use crate::work_size::WorkSize;

/// Bytes of workgroup memory one invocation stages: sum, max_sum and index.
const STAGED_BYTES_PER_SLOT: u32 = 3 * 4;

/// Runs reduction rounds with the `max_prefix_sum` kernel, one workgroup per
/// group of slots.
pub struct GpuReduction<'g> {
    gpu: &'g GpuModule,
}

impl<'g> GpuReduction<'g> {
    pub fn new(gpu: &'g GpuModule) -> Self {
        Self { gpu }
    }
}

impl ReductionDevice for GpuReduction<'_> {
    type Buffer = GpuMem32i;

    fn max_group_size(&self) -> u32 {
        self.gpu
            .info
            .max_group_size()
            .min(self.gpu.info.max_workgroup_storage_bytes / STAGED_BYTES_PER_SLOT)
    }

    fn allocate(&self, len: usize, label: &str) -> Result<GpuMem32i> {
        GpuMem32i::create_n(self.gpu, len, label)
    }

    fn upload(&self, buffer: &mut GpuMem32i, data: &[i32]) -> Result<()> {
        buffer.write_n(data)
    }

    fn copy(&self, src: &GpuMem32i, dst: &mut GpuMem32i, len: usize) -> Result<()> {
        src.copy_to_n(dst, len)
    }

    fn launch_round(
        &self,
        current: &PrefixBuffers<GpuMem32i>,
        next: &mut PrefixBuffers<GpuMem32i>,
        data_size: u32,
        group_size: u32,
    ) -> Result<()> {
        let kernel = self.gpu.kernel(
            KernelKind::MaxPrefixSum,
            &Defines::new().set("WORKGROUP_SIZE", group_size),
        )?;

        kernel.exec(
            self.gpu,
            WorkSize::new_1d(group_size, data_size),
            &[
                next.sum.raw(),
                next.max_sum.raw(),
                next.index.raw(),
                current.sum.raw(),
                current.max_sum.raw(),
                current.index.raw(),
            ],
            &[data_size],
        )
    }

    fn read_head(&self, buffers: &PrefixBuffers<GpuMem32i>) -> Result<(i32, i32)> {
        let max_sum = buffers.max_sum.read_n(1)?;
        let index = buffers.index.read_n(1)?;

        Ok((max_sum[0], index[0]))
    }
}
