use clap::Args;
use gpu_accel::{
    expect_same, reference, GpuReduction, HostReduction, MaxPrefixSumDriver, Timer,
};
use tracing::{debug, info};

use super::{random_i32, report, BenchConfig};

#[derive(Args, Debug, Clone)]
pub struct MaxPrefixSumArgs {
    /// Largest input length; lengths double from 2 up to this value
    #[arg(long, default_value_t = 1 << 24, value_parser = clap::value_parser!(u32).range(2..))]
    pub max_n: u32,

    /// Reduction fan-in: slots folded into one per round
    #[arg(short, long, default_value_t = 128)]
    pub group_size: u32,
}

pub fn run(config: &BenchConfig, args: &MaxPrefixSumArgs) -> anyhow::Result<()> {
    let gpu = config.open_gpu()?;
    let gpu_device = GpuReduction::new(&gpu);
    let host_device = HostReduction::new();

    let mut n: u32 = 2;
    while n <= args.max_n {
        println!("______________________________________________");
        let values_range = 1023.min(i32::MAX / n as i32);
        println!("n={} values in range: [{}; {}]", n, -values_range, values_range);

        let values = random_i32(n as usize, n as u64, values_range);

        let expected = reference::max_prefix_sum(&values);
        println!(
            "Max prefix sum: {} on prefix [0; {})",
            expected.max_sum, expected.end_index
        );

        {
            let mut t = Timer::new();
            for _ in 0..config.iters {
                let result = reference::max_prefix_sum(&values);
                expect_same(expected, result, "CPU result should be consistent!")?;
                t.next_lap();
            }
            report("CPU:", &t, n as usize);
        }

        {
            let mut driver = MaxPrefixSumDriver::new(&host_device, &values, args.group_size)?;

            let mut t = Timer::new();
            for _ in 0..config.iters {
                let outcome = driver.run()?;
                expect_same(expected, outcome.summary, "CPU tree result should be consistent!")?;
                t.next_lap();
            }
            report("CPU tree:", &t, n as usize);
        }

        {
            let mut driver = MaxPrefixSumDriver::new(&gpu_device, &values, args.group_size)?;

            let mut t = Timer::new();
            for _ in 0..config.iters {
                let outcome = driver.run()?;
                debug!(rounds = outcome.round_sizes.len(), "GPU reduction done");
                expect_same(expected, outcome.summary, "GPU result should be consistent!")?;
                t.next_lap();
            }
            report("GPU:", &t, n as usize);
        }

        n = match n.checked_mul(2) {
            Some(next) => next,
            None => break,
        };
    }

    info!(max_n = args.max_n, "Max prefix sum benchmark finished");

    Ok(())
}
