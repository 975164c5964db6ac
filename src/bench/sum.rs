use clap::Args;
use gpu_accel::{
    check_workgroup_size, expect_same, reference, Defines, GpuMem32u, KernelKind, SumVariant,
    Timer, WorkSize,
};
use tracing::info;

use super::{random_u32, report, BenchConfig};

#[derive(Args, Debug, Clone)]
pub struct SumArgs {
    /// Number of values to sum
    #[arg(short, long, default_value_t = 100_000_000, value_parser = clap::value_parser!(u32).range(1..))]
    pub n: u32,

    /// Workgroup size of the sum kernels (power of two)
    #[arg(long, default_value_t = 128)]
    pub workgroup_size: u32,

    /// Values folded by each invocation in the looping kernels
    #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u32).range(1..))]
    pub values_per_workitem: u32,
}

pub fn run(config: &BenchConfig, args: &SumArgs) -> anyhow::Result<()> {
    let n = args.n as usize;
    let values = random_u32(n, 42, u32::MAX / args.n);
    let reference_sum = reference::sum(&values);

    info!(n, reference_sum, "Generated sum input");

    {
        let mut t = Timer::new();
        for _ in 0..config.iters {
            let sum = reference::sum(&values);
            expect_same(reference_sum, sum, "CPU result should be consistent!")?;
            t.next_lap();
        }
        report("CPU:    ", &t, n);
    }

    {
        let mut t = Timer::new();
        for _ in 0..config.iters {
            let sum = reference::sum_parallel(&values);
            expect_same(reference_sum, sum, "CPU parallel result should be consistent!")?;
            t.next_lap();
        }
        report("CPU par:", &t, n);
    }

    let gpu = config.open_gpu()?;
    check_workgroup_size(&gpu.info, args.workgroup_size)?;

    let total_gpu = GpuMem32u::create_n(&gpu, 1, "sum total")?;
    let values_gpu = GpuMem32u::from_slice(&gpu, &values, "sum values")?;

    let defines = Defines::new()
        .set("WORKGROUP_SIZE", args.workgroup_size)
        .set("VALUES_PER_WORKITEM", args.values_per_workitem);

    for variant in SumVariant::ALL {
        let kernel = gpu.kernel(KernelKind::Sum(variant), &defines)?;
        let invocations = args.n.div_ceil(variant.values_per_workitem(args.values_per_workitem));
        let work_size = WorkSize::new_1d(args.workgroup_size, invocations);

        let mut t = Timer::new();
        for _ in 0..config.iters {
            total_gpu.write_n(&[0])?;
            kernel.exec(
                &gpu,
                work_size,
                &[total_gpu.raw(), values_gpu.raw()],
                &[args.n],
            )?;

            let result = total_gpu.read_n(1)?[0];
            expect_same(reference_sum, result, "GPU result should be consistent!")?;
            t.next_lap();
        }

        println!("GPU:     {}", kernel.kind);
        report("GPU:    ", &t, n);
    }

    Ok(())
}
