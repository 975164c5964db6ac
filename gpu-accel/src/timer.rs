use std::time::{Duration, Instant};

/// Lap timer for repeated benchmark iterations.
pub struct Timer {
    lap_start: Instant,
    laps: Vec<Duration>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            lap_start: Instant::now(),
            laps: Vec::new(),
        }
    }

    /// Closes the current lap and starts the next one.
    pub fn next_lap(&mut self) {
        let now = Instant::now();
        self.laps.push(now - self.lap_start);
        self.lap_start = now;
    }

    pub fn restart(&mut self) {
        self.lap_start = Instant::now();
    }

    pub fn laps(&self) -> &[Duration] {
        &self.laps
    }

    /// Mean lap time in seconds, 0 when no lap was recorded.
    pub fn lap_avg(&self) -> f64 {
        if self.laps.is_empty() {
            return 0.0;
        }

        let total: f64 = self.laps.iter().map(Duration::as_secs_f64).sum();

        return total / self.laps.len() as f64;
    }

    /// Population standard deviation of the lap times in seconds.
    pub fn lap_std(&self) -> f64 {
        if self.laps.len() < 2 {
            return 0.0;
        }

        let avg = self.lap_avg();
        let variance: f64 = self
            .laps
            .iter()
            .map(|lap| {
                let diff = lap.as_secs_f64() - avg;
                diff * diff
            })
            .sum::<f64>()
            / self.laps.len() as f64;

        return variance.sqrt();
    }

    /// Throughput in millions of elements per second for `n` elements per lap.
    pub fn millions_per_second(&self, n: usize) -> f64 {
        let avg = self.lap_avg();

        if avg == 0.0 {
            return 0.0;
        }

        return (n as f64 / 1e6) / avg;
    }
}
