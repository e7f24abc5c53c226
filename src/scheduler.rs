// ⏰ Scheduler
// Runs the batch once at startup and then once per interval, forever.

use anyhow::Result;
use chrono::Local;
use log::{error, info};
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Scheduler { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `job` now and then every interval, never returns
    pub fn run_forever<T, F>(&self, mut job: F) -> !
    where
        F: FnMut() -> Result<T>,
    {
        loop {
            self.run_cycles(None, &mut job);
        }
    }

    /// Run `job` `max_cycles` times (unbounded with `None`), sleeping between runs
    ///
    /// A failing run is logged and the schedule carries on. Returns the
    /// number of successful runs.
    pub fn run_cycles<T, F>(&self, max_cycles: Option<usize>, mut job: F) -> usize
    where
        F: FnMut() -> Result<T>,
    {
        let mut cycle = 0;
        let mut succeeded = 0;

        loop {
            cycle += 1;
            info!("Scheduled run #{} started", cycle);

            match job() {
                Ok(_) => succeeded += 1,
                Err(e) => error!("Scheduled run #{} failed: {:#}", cycle, e),
            }

            if max_cycles.map_or(false, |max| cycle >= max) {
                return succeeded;
            }

            if let Ok(delta) = chrono::Duration::from_std(self.interval) {
                info!("Next run at {}", (Local::now() + delta).format("%Y-%m-%d %H:%M:%S"));
            }
            std::thread::sleep(self.interval);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new(DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_runs_immediately_and_repeats() {
        let scheduler = Scheduler::new(Duration::ZERO);
        let mut runs = 0;

        let succeeded = scheduler.run_cycles(Some(3), || {
            runs += 1;
            Ok(())
        });

        assert_eq!(runs, 3);
        assert_eq!(succeeded, 3);
    }

    #[test]
    fn test_failed_run_does_not_stop_schedule() {
        let scheduler = Scheduler::new(Duration::ZERO);
        let mut runs = 0;

        let succeeded = scheduler.run_cycles(Some(2), || {
            runs += 1;
            if runs == 1 {
                Err(anyhow!("store unavailable"))
            } else {
                Ok(runs)
            }
        });

        assert_eq!(runs, 2);
        assert_eq!(succeeded, 1);
    }

    #[test]
    fn test_default_interval_is_a_day() {
        assert_eq!(Scheduler::default().interval(), Duration::from_secs(86_400));
    }
}
