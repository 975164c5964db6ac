use super::error::{GpuError, Result};

/// Local workgroup shape plus the global extent it tiles, both in invocations.
///
/// The global extent is always rounded up to a multiple of the local shape,
/// so kernels must bounds-check their own indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSize {
    pub local: [u32; 2],
    pub global: [u32; 2],
}

impl WorkSize {
    pub fn new_1d(group_size: u32, global_size: u32) -> Self {
        return Self::new_2d(group_size, 1, global_size, 1);
    }

    pub fn new_2d(group_x: u32, group_y: u32, global_x: u32, global_y: u32) -> Self {
        assert!(group_x > 0 && group_y > 0, "workgroup shape must be non-zero");

        Self {
            local: [group_x, group_y],
            global: [
                round_up(global_x, group_x),
                round_up(global_y, group_y),
            ],
        }
    }

    pub fn workgroups(&self) -> [u32; 2] {
        [
            self.global[0] / self.local[0],
            self.global[1] / self.local[1],
        ]
    }

    /// Workgroup counts to dispatch. For 1D work an x count above
    /// `max_per_dimension` is folded into y; such kernels linearise with
    /// `wid.y * num_workgroups.x + wid.x` and skip the tail groups the fold
    /// adds. 2D grids address tiles by `wid.xy` directly and are never folded.
    pub fn dispatch(&self, max_per_dimension: u32) -> Result<[u32; 3]> {
        let [groups_x, groups_y] = self.workgroups();

        if groups_x <= max_per_dimension && groups_y <= max_per_dimension {
            return Ok([groups_x.max(1), groups_y.max(1), 1]);
        }

        let one_dimensional = self.local[1] == 1 && groups_y == 1;
        let folded_y = groups_x.div_ceil(max_per_dimension);

        if !one_dimensional || folded_y > max_per_dimension {
            return Err(GpuError::DispatchTooLarge {
                workgroups: [groups_x, groups_y],
                max: max_per_dimension,
            });
        }

        let folded_x = groups_x.div_ceil(folded_y);

        return Ok([folded_x, folded_y, 1]);
    }
}

fn round_up(value: u32, multiple: u32) -> u32 {
    value.div_ceil(multiple) * multiple
}
