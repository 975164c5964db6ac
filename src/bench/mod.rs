pub mod devices;
pub mod max_prefix_sum;
pub mod sum;
pub mod transpose;

use gpu_accel::{DeviceSelection, GpuModule, Timer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Settings shared by every benchmark.
#[derive(Debug, Clone, Copy)]
pub struct BenchConfig {
    pub device: DeviceSelection,
    pub iters: u32,
}

impl BenchConfig {
    pub fn open_gpu(&self) -> gpu_accel::Result<GpuModule> {
        let gpu = pollster::block_on(GpuModule::new(self.device))?;
        gpu.print_info();

        Ok(gpu)
    }
}

/// Prints mean +- std seconds and throughput for `n` elements per lap.
pub fn report(label: &str, timer: &Timer, n: usize) {
    println!("{} {:.6}+-{:.6} s", label, timer.lap_avg(), timer.lap_std());
    println!("{} {:.2} millions/s", label, timer.millions_per_second(n));
}

pub fn random_u32(n: usize, seed: u64, max: u32) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n).map(|_| rng.gen_range(0..=max)).collect()
}

pub fn random_i32(n: usize, seed: u64, range: i32) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n).map(|_| rng.gen_range(-range..=range)).collect()
}

pub fn random_f32(n: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n).map(|_| rng.gen::<f32>()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generators_are_seeded_and_bounded() {
        let a = random_i32(1000, 7, 5);
        let b = random_i32(1000, 7, 5);

        assert_eq!(a, b);
        assert!(a.iter().all(|v| (-5..=5).contains(v)));

        let u = random_u32(1000, 42, 10);
        assert!(u.iter().all(|&v| v <= 10));

        let f = random_f32(1000, 3);
        assert!(f.iter().all(|&v| (0.0..1.0).contains(&v)));
    }
}
