use clap::Args;
use gpu_accel::{
    check_tile_size, expect_same, reference, Defines, GpuMem32f, KernelKind, Timer,
    TransposeVariant, WorkSize,
};
use tracing::info;

use super::{random_f32, report, BenchConfig};

#[derive(Args, Debug, Clone)]
pub struct TransposeArgs {
    /// Matrix width (columns)
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    /// Matrix height (rows)
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    /// Edge of the square workgroup tile
    #[arg(long, default_value_t = 16)]
    pub tile_size: u32,
}

pub fn run(config: &BenchConfig, args: &TransposeArgs) -> anyhow::Result<()> {
    let (width, height) = (args.width as usize, args.height as usize);
    let n = width * height;

    let matrix = random_f32(n, (width + height) as u64);
    info!(width, height, "Data generated");

    let gpu = config.open_gpu()?;
    check_tile_size(&gpu.info, args.tile_size)?;

    let matrix_gpu = GpuMem32f::from_slice(&gpu, &matrix, "matrix")?;
    let transposed_gpu = GpuMem32f::create_n(&gpu, n, "matrix transposed")?;
    let empty = vec![0.0f32; n];

    let defines = Defines::new().set("TILE_SIZE", args.tile_size);
    let work_size = WorkSize::new_2d(args.tile_size, args.tile_size, args.width, args.height);

    for variant in TransposeVariant::ALL {
        let kernel = gpu.kernel(KernelKind::MatrixTranspose(variant), &defines)?;
        transposed_gpu.write_n(&empty)?;

        let mut t = Timer::new();
        for _ in 0..config.iters {
            kernel.exec(
                &gpu,
                work_size,
                &[matrix_gpu.raw(), transposed_gpu.raw()],
                &[args.width, args.height],
            )?;
            gpu.synchronize()?;
            t.next_lap();
        }

        println!("GPU: {}", kernel.kind);
        report("GPU:", &t, n);

        let transposed = transposed_gpu.read_n(n)?;
        let mismatch = reference::find_transpose_mismatch(&matrix, &transposed, width, height);
        expect_same(None, mismatch, "GPU transpose should match the CPU transpose!")?;
    }

    Ok(())
}
