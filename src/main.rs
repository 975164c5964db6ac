mod bench;

use clap::{Parser, Subcommand};
use gpu_accel::DeviceSelection;
use tracing_subscriber::EnvFilter;

use bench::max_prefix_sum::MaxPrefixSumArgs;
use bench::sum::SumArgs;
use bench::transpose::TransposeArgs;
use bench::BenchConfig;

/// GPU compute exercises: adapters, sums, transposes and max prefix sums
#[derive(Parser)]
#[command(name = "gpgpu-exercises")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Adapter index as printed by `devices`; the high-performance adapter if omitted
    #[arg(short, long, global = true)]
    device: Option<usize>,

    /// Timed iterations per benchmark
    #[arg(short, long, global = true, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    iters: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List compute adapters and their properties
    Devices,
    /// Sum of u32 values: CPU baselines and atomic GPU kernels
    Sum(SumArgs),
    /// Matrix transpose kernels
    Transpose(TransposeArgs),
    /// Max prefix sum by iterative tree reduction
    MaxPrefixSum(MaxPrefixSumArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = BenchConfig {
        device: cli
            .device
            .map_or(DeviceSelection::HighPerformance, DeviceSelection::Index),
        iters: cli.iters,
    };

    match cli.command {
        Commands::Devices => bench::devices::run(),
        Commands::Sum(args) => bench::sum::run(&config, &args),
        Commands::Transpose(args) => bench::transpose::run(&config, &args),
        Commands::MaxPrefixSum(args) => bench::max_prefix_sum::run(&config, &args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_and_subcommand_options() {
        let cli = Cli::try_parse_from([
            "gpgpu-exercises",
            "max-prefix-sum",
            "--max-n",
            "1024",
            "-g",
            "64",
            "--device",
            "1",
            "--iters",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.device, Some(1));
        assert_eq!(cli.iters, 3);
        match cli.command {
            Commands::MaxPrefixSum(args) => {
                assert_eq!(args.max_n, 1024);
                assert_eq!(args.group_size, 64);
            }
            _ => panic!("expected max-prefix-sum"),
        }
    }

    #[test]
    fn cli_defaults_follow_the_exercises() {
        let cli = Cli::try_parse_from(["gpgpu-exercises", "sum"]).unwrap();

        assert_eq!(cli.iters, 10);
        assert_eq!(cli.device, None);
        match cli.command {
            Commands::Sum(args) => {
                assert_eq!(args.n, 100_000_000);
                assert_eq!(args.workgroup_size, 128);
                assert_eq!(args.values_per_workitem, 64);
            }
            _ => panic!("expected sum"),
        }
    }

    #[test]
    fn zero_iterations_are_rejected() {
        assert!(Cli::try_parse_from(["gpgpu-exercises", "--iters", "0", "devices"]).is_err());
    }
}
