//! Maximum prefix sum by iterative tree reduction.
//!
//! Every slot carries `(sum, max_sum, index)`: the total of the input range
//! folded into it, the best prefix sum inside that range, and the 1-based
//! input position where that best prefix ends. A round folds consecutive
//! groups of `group_size` slots into one slot of the other buffer set, until
//! a single slot describes the whole input.

mod gpu;
mod host;

pub use gpu::GpuReduction;
pub use host::HostReduction;

use tracing::debug;

use super::error::{GpuError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrefixSummary {
    pub max_sum: i32,
    pub end_index: u32,
}

impl PrefixSummary {
    pub const EMPTY: PrefixSummary = PrefixSummary {
        max_sum: 0,
        end_index: 0,
    };

    /// Finalizes the head slot. The empty prefix (sum 0, index 0) wins unless
    /// the best non-empty prefix is strictly positive.
    pub fn from_head(max_sum: i32, index: i32) -> Self {
        if max_sum > 0 {
            return Self {
                max_sum,
                end_index: index as u32,
            };
        }

        Self::EMPTY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub sum: i32,
    pub max_sum: i32,
    pub index: i32,
}

/// Folds one group of slots in order, seeded from its first slot. A later
/// slot only takes over on a strictly greater prefix sum.
pub fn fold_group(sum: &[i32], max_sum: &[i32], index: &[i32]) -> Slot {
    let mut slot = Slot {
        sum: sum[0],
        max_sum: max_sum[0],
        index: index[0],
    };

    for j in 1..sum.len() {
        let candidate = slot.sum.wrapping_add(max_sum[j]);
        if candidate > slot.max_sum {
            slot.max_sum = candidate;
            slot.index = index[j];
        }
        slot.sum = slot.sum.wrapping_add(sum[j]);
    }

    slot
}

/// Number of rounds needed to fold `len` slots with fan-in `group_size`.
pub fn round_count(len: usize, group_size: u32) -> u32 {
    let mut data_size = len;
    let mut rounds = 0;

    while data_size > 1 {
        data_size = data_size.div_ceil(group_size as usize);
        rounds += 1;
    }

    rounds
}

/// Slot indexes are stored as `i32`, which bounds the input length.
pub const MAX_INPUT_LEN: usize = i32::MAX as usize;

fn check_input_len(len: usize) -> Result<()> {
    if len > MAX_INPUT_LEN {
        return Err(GpuError::InputTooLong {
            len,
            max: MAX_INPUT_LEN,
        });
    }
    Ok(())
}

pub struct PrefixBuffers<B> {
    pub sum: B,
    pub max_sum: B,
    pub index: B,
}

impl<B> PrefixBuffers<B> {
    fn allocate<D>(device: &D, len: usize, label: &str) -> Result<Self>
    where
        D: ReductionDevice<Buffer = B>,
    {
        Ok(Self {
            sum: device.allocate(len, &format!("{} sum", label))?,
            max_sum: device.allocate(len, &format!("{} max_sum", label))?,
            index: device.allocate(len, &format!("{} index", label))?,
        })
    }

    /// Exchanges the storage of both sets without copying elements.
    pub fn swap(&mut self, other: &mut PrefixBuffers<B>) {
        std::mem::swap(self, other);
    }
}

/// Buffer and kernel services the driver needs from a compute device.
pub trait ReductionDevice {
    type Buffer;

    /// Largest fan-in a single round can fold.
    fn max_group_size(&self) -> u32;

    fn allocate(&self, len: usize, label: &str) -> Result<Self::Buffer>;

    fn upload(&self, buffer: &mut Self::Buffer, data: &[i32]) -> Result<()>;

    fn copy(&self, src: &Self::Buffer, dst: &mut Self::Buffer, len: usize) -> Result<()>;

    /// Folds the first `data_size` slots of `current` into the first
    /// `ceil(data_size / group_size)` slots of `next`.
    fn launch_round(
        &self,
        current: &PrefixBuffers<Self::Buffer>,
        next: &mut PrefixBuffers<Self::Buffer>,
        data_size: u32,
        group_size: u32,
    ) -> Result<()>;

    /// Blocking read of slot 0 as `(max_sum, index)`.
    fn read_head(&self, buffers: &PrefixBuffers<Self::Buffer>) -> Result<(i32, i32)>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionOutcome {
    pub summary: PrefixSummary,
    /// Live slot count at the start of every round.
    pub round_sizes: Vec<u32>,
}

pub struct MaxPrefixSumDriver<'d, D: ReductionDevice> {
    device: &'d D,
    group_size: u32,
    len: usize,
    init: PrefixBuffers<D::Buffer>,
    current: PrefixBuffers<D::Buffer>,
    next: PrefixBuffers<D::Buffer>,
}

impl<'d, D: ReductionDevice> MaxPrefixSumDriver<'d, D> {
    /// Allocates the init snapshot and both working sets and uploads `values`
    /// into the snapshot.
    pub fn new(device: &'d D, values: &[i32], group_size: u32) -> Result<Self> {
        let max = device.max_group_size();

        if group_size < 2 || group_size > max {
            return Err(GpuError::InvalidGroupSize { group_size, max });
        }
        check_input_len(values.len())?;

        let capacity = values.len().max(1);
        let indexes: Vec<i32> = (1..=values.len() as i32).collect();

        let mut init = PrefixBuffers::allocate(device, capacity, "init")?;
        device.upload(&mut init.sum, values)?;
        device.upload(&mut init.max_sum, values)?;
        device.upload(&mut init.index, &indexes)?;

        let current = PrefixBuffers::allocate(device, capacity, "current")?;
        let next = PrefixBuffers::allocate(device, capacity, "next")?;

        return Ok(Self {
            device,
            group_size,
            len: values.len(),
            init,
            current,
            next,
        });
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn group_size(&self) -> u32 {
        self.group_size
    }

    /// Restores the working set from the init snapshot and reduces it to a
    /// single slot. Every call solves the same problem.
    pub fn run(&mut self) -> Result<ReductionOutcome> {
        if self.len == 0 {
            return Ok(ReductionOutcome {
                summary: PrefixSummary::EMPTY,
                round_sizes: Vec::new(),
            });
        }

        self.device
            .copy(&self.init.sum, &mut self.current.sum, self.len)?;
        self.device
            .copy(&self.init.max_sum, &mut self.current.max_sum, self.len)?;
        self.device
            .copy(&self.init.index, &mut self.current.index, self.len)?;

        let mut data_size = self.len as u32;
        let mut round_sizes = Vec::new();

        while data_size > 1 {
            round_sizes.push(data_size);

            self.device
                .launch_round(&self.current, &mut self.next, data_size, self.group_size)?;
            self.current.swap(&mut self.next);

            data_size = data_size.div_ceil(self.group_size);

            debug!(round = round_sizes.len(), data_size, "Reduction round done");
        }

        let (max_sum, index) = self.device.read_head(&self.current)?;

        return Ok(ReductionOutcome {
            summary: PrefixSummary::from_head(max_sum, index),
            round_sizes,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference;

    use proptest::prelude::*;

    fn reduce(values: &[i32], group_size: u32) -> ReductionOutcome {
        let device = HostReduction::new();
        let mut driver = MaxPrefixSumDriver::new(&device, values, group_size).unwrap();

        driver.run().unwrap()
    }

    #[test]
    fn concrete_scenarios_match_reference() {
        let cases: Vec<Vec<i32>> = vec![
            vec![],
            vec![7],
            vec![-7],
            vec![3, -1, -2, 5, -1],
            vec![0; 8],
            vec![-1, -2, -3, -4, -5],
            vec![1; 300],
            vec![5, -5, 5, -5, 5],
        ];

        for values in cases {
            for group_size in [2, 3, 64, 128] {
                assert_eq!(
                    reduce(&values, group_size).summary,
                    reference::max_prefix_sum(&values),
                    "values {:?}, group size {}",
                    values,
                    group_size
                );
            }
        }
    }

    #[test]
    fn input_length_is_bounded_by_index_type() {
        assert!(check_input_len(MAX_INPUT_LEN).is_ok());

        let err = check_input_len(MAX_INPUT_LEN + 1).unwrap_err();
        assert!(matches!(
            err,
            GpuError::InputTooLong { len, max } if len == MAX_INPUT_LEN + 1 && max == MAX_INPUT_LEN
        ));
        assert_eq!(
            err.to_string(),
            "Input of 2147483648 elements exceeds the limit of 2147483647"
        );
    }

    #[test]
    fn single_element() {
        let outcome = reduce(&[7], 128);

        assert_eq!(outcome.summary, PrefixSummary { max_sum: 7, end_index: 1 });
        assert!(outcome.round_sizes.is_empty());
    }

    #[test]
    fn all_zero_and_all_negative_give_empty_prefix() {
        assert_eq!(reduce(&[0; 8], 4).summary, PrefixSummary::EMPTY);
        assert_eq!(reduce(&[-4, -1, -9, -2], 2).summary, PrefixSummary::EMPTY);
    }

    #[test]
    fn plateau_across_groups_keeps_earliest_index() {
        // prefix sums: 2, 3, 3, 1, 3, 3 - the maximum 3 is first reached at 2
        let values = [2, 1, 0, -2, 2, 0];

        for group_size in [2, 3, 4, 128] {
            assert_eq!(
                reduce(&values, group_size).summary,
                PrefixSummary { max_sum: 3, end_index: 2 }
            );
        }
    }

    #[test]
    fn rerun_is_idempotent() {
        let values: Vec<i32> = (0..1000).map(|i| (i * 37 % 101) - 50).collect();
        let device = HostReduction::new();
        let mut driver = MaxPrefixSumDriver::new(&device, &values, 16).unwrap();

        let first = driver.run().unwrap();
        let second = driver.run().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.summary, reference::max_prefix_sum(&values));
    }

    #[test]
    fn data_size_shrinks_every_round() {
        let values = vec![1; 10_000];
        let outcome = reduce(&values, 7);

        assert_eq!(outcome.round_sizes.first(), Some(&10_000));
        assert!(outcome.round_sizes.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(outcome.round_sizes.len() as u32, round_count(values.len(), 7));
        // 10000 -> 1429 -> 205 -> 30 -> 5 -> 1
        assert_eq!(outcome.round_sizes, vec![10_000, 1429, 205, 30, 5]);
    }

    #[test]
    fn square_of_group_size_takes_two_rounds() {
        for group_size in [2u32, 8, 64, 128] {
            let n = (group_size * group_size) as usize;
            let values: Vec<i32> = (0..n as i32).map(|i| if i % 3 == 0 { -2 } else { 1 }).collect();
            let outcome = reduce(&values, group_size);

            assert_eq!(outcome.round_sizes.len(), 2);
            assert_eq!(round_count(n, group_size), 2);
            assert_eq!(outcome.summary, reference::max_prefix_sum(&values));
        }
    }

    #[test]
    fn round_count_is_ceil_log() {
        assert_eq!(round_count(0, 128), 0);
        assert_eq!(round_count(1, 128), 0);
        assert_eq!(round_count(2, 128), 1);
        assert_eq!(round_count(128, 128), 1);
        assert_eq!(round_count(129, 128), 2);
        assert_eq!(round_count(1 << 24, 128), 4);
    }

    #[test]
    fn group_size_below_two_is_rejected() {
        let device = HostReduction::new();

        for group_size in [0, 1] {
            let err = MaxPrefixSumDriver::new(&device, &[1, 2, 3], group_size)
                .err()
                .unwrap();

            assert!(matches!(err, GpuError::InvalidGroupSize { .. }));
        }
    }

    #[test]
    fn fold_group_matches_serial_scan_within_group() {
        let values = [3, -1, -2, 5, -1];
        let indexes = [1, 2, 3, 4, 5];
        let slot = fold_group(&values, &values, &indexes);

        assert_eq!(slot, Slot { sum: 4, max_sum: 5, index: 4 });
    }

    #[test]
    fn from_head_clamps_non_positive_best() {
        assert_eq!(PrefixSummary::from_head(-3, 1), PrefixSummary::EMPTY);
        assert_eq!(PrefixSummary::from_head(0, 4), PrefixSummary::EMPTY);
        assert_eq!(
            PrefixSummary::from_head(9, 4),
            PrefixSummary { max_sum: 9, end_index: 4 }
        );
    }

    proptest! {
        #[test]
        fn host_driver_matches_reference(
            values in prop::collection::vec(-1023i32..=1023, 0..2000),
            group_size in 2u32..300,
        ) {
            prop_assert_eq!(reduce(&values, group_size).summary, reference::max_prefix_sum(&values));
        }

        #[test]
        fn answer_is_independent_of_group_size(
            values in prop::collection::vec(-50i32..=50, 1..1500),
        ) {
            prop_assert_eq!(reduce(&values, 64).summary, reduce(&values, 128).summary);
        }
    }
}
