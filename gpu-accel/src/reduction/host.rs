use rayon::prelude::*;

use super::{fold_group, PrefixBuffers, ReductionDevice};
use crate::error::{GpuError, Result};

/// Runs reduction rounds on host memory, folding the groups of a round in
/// parallel.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostReduction;

impl HostReduction {
    pub fn new() -> Self {
        Self
    }
}

fn check_capacity(buffer: &[i32], len: usize) -> Result<()> {
    if len > buffer.len() {
        return Err(GpuError::LengthMismatch {
            expected: buffer.len(),
            actual: len,
        });
    }
    Ok(())
}

impl ReductionDevice for HostReduction {
    type Buffer = Vec<i32>;

    fn max_group_size(&self) -> u32 {
        u32::MAX
    }

    fn allocate(&self, len: usize, _label: &str) -> Result<Vec<i32>> {
        if len == 0 {
            return Err(GpuError::EmptyBuffer);
        }
        Ok(vec![0; len])
    }

    fn upload(&self, buffer: &mut Vec<i32>, data: &[i32]) -> Result<()> {
        check_capacity(buffer, data.len())?;
        buffer[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn copy(&self, src: &Vec<i32>, dst: &mut Vec<i32>, len: usize) -> Result<()> {
        check_capacity(src, len)?;
        check_capacity(dst, len)?;
        dst[..len].copy_from_slice(&src[..len]);
        Ok(())
    }

    fn launch_round(
        &self,
        current: &PrefixBuffers<Vec<i32>>,
        next: &mut PrefixBuffers<Vec<i32>>,
        data_size: u32,
        group_size: u32,
    ) -> Result<()> {
        let live = data_size as usize;
        let group = group_size as usize;
        let groups = live.div_ceil(group);

        check_capacity(&current.sum, live)?;
        check_capacity(&next.sum, groups)?;

        next.sum[..groups]
            .par_iter_mut()
            .zip(next.max_sum[..groups].par_iter_mut())
            .zip(next.index[..groups].par_iter_mut())
            .enumerate()
            .for_each(|(g, ((sum, max_sum), index))| {
                let start = g * group;
                let end = (start + group).min(live);
                let slot = fold_group(
                    &current.sum[start..end],
                    &current.max_sum[start..end],
                    &current.index[start..end],
                );

                *sum = slot.sum;
                *max_sum = slot.max_sum;
                *index = slot.index;
            });

        Ok(())
    }

    fn read_head(&self, buffers: &PrefixBuffers<Vec<i32>>) -> Result<(i32, i32)> {
        Ok((buffers.max_sum[0], buffers.index[0]))
    }
}
