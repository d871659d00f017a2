//! Process statistics from `/proc/self/stat` using procfs.

use procfs::process::Process;

use super::{ProcessClock, ProcessStats, ProcessStatsError, ProcessStatsSource};

/// Reads the current process's `stat` file.
#[derive(Debug, Clone, Copy)]
pub struct ProcfsSource {
    clock: ProcessClock,
}

impl ProcfsSource {
    pub fn new(clock: ProcessClock) -> Self {
        Self { clock }
    }
}

impl ProcessStatsSource for ProcfsSource {
    fn read(&self) -> Result<ProcessStats, ProcessStatsError> {
        let stat = Process::myself()
            .and_then(|p| p.stat())
            .map_err(|e| ProcessStatsError::Read(e.to_string()))?;

        let threads = u64::try_from(stat.num_threads).map_err(|_| ProcessStatsError::Invalid {
            field: "num_threads",
            value: stat.num_threads.to_string(),
        })?;

        // utime and stime are in clock ticks
        let ticks = procfs::ticks_per_second() as f64;
        let cpu_seconds = (stat.utime + stat.stime) as f64 / ticks;

        Ok(ProcessStats {
            virtual_memory_bytes: stat.vsize,
            resident_memory_bytes: stat.rss * procfs::page_size(),
            minor_faults: stat.minflt,
            major_faults: stat.majflt,
            threads,
            cpu_seconds,
            start_time_seconds: self.clock.start_time_seconds(),
            uptime_seconds: self.clock.uptime_seconds(),
        })
    }
}
