//! Command lines for external stress and probe workloads.
//!
//! The engine launches these verbatim; their output is streamed as log lines.

use std::path::PathBuf;
use std::time::Duration;

/// Workers for the memory stressor.
pub const MEMORY_WORKERS: u32 = 2;

/// Share of available memory the memory stressor claims.
pub const MEMORY_SHARE: &str = "90%";

/// Block size for the disk stressor.
pub const DISK_BLOCK_SIZE: &str = "4k";

/// Queue depth for the disk stressor.
pub const DISK_QUEUE_DEPTH: u32 = 16;

/// Scratch file size for the disk stressor.
pub const DISK_FILE_SIZE: &str = "256M";

/// Executable names (or paths) for each workload tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadPrograms {
    /// CPU and memory stressor.
    pub stress: String,
    /// Disk I/O stressor.
    pub fio: String,
    /// Network probe.
    pub ping: String,
}

impl Default for WorkloadPrograms {
    fn default() -> Self {
        Self {
            stress: "stress-ng".into(),
            fio: "fio".into(),
            ping: "ping".into(),
        }
    }
}

/// A fully specified external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments, passed without a shell.
    pub args: Vec<String>,
    /// Scratch file owned by this workload; removed when it finishes.
    pub scratch: Option<PathBuf>,
    /// Whether a non-zero exit status fails the execution.
    pub fatal_exit: bool,
}

impl WorkloadSpec {
    /// Saturate every available CPU.
    pub fn cpu_stress(programs: &WorkloadPrograms, duration: Duration) -> Self {
        Self {
            program: programs.stress.clone(),
            args: vec![
                "--cpu".into(),
                "0".into(),
                "--timeout".into(),
                secs(duration),
                "-v".into(),
            ],
            scratch: None,
            fatal_exit: true,
        }
    }

    /// Claim most of the available memory with a fixed worker count.
    pub fn memory_stress(programs: &WorkloadPrograms, duration: Duration) -> Self {
        Self {
            program: programs.stress.clone(),
            args: vec![
                "--vm".into(),
                MEMORY_WORKERS.to_string(),
                "--vm-bytes".into(),
                MEMORY_SHARE.into(),
                "--timeout".into(),
                secs(duration),
                "-v".into(),
            ],
            scratch: None,
            fatal_exit: true,
        }
    }

    /// Random read/write against a scratch file.
    pub fn disk_stress(programs: &WorkloadPrograms, duration: Duration, scratch: PathBuf) -> Self {
        Self {
            program: programs.fio.clone(),
            args: vec![
                "--name=chaosd-disk".into(),
                format!("--filename={}", scratch.display()),
                "--rw=randrw".into(),
                format!("--bs={}", DISK_BLOCK_SIZE),
                format!("--iodepth={}", DISK_QUEUE_DEPTH),
                format!("--size={}", DISK_FILE_SIZE),
                "--ioengine=libaio".into(),
                "--direct=1".into(),
                "--time_based".into(),
                format!("--runtime={}", secs(duration)),
            ],
            scratch: Some(scratch),
            fatal_exit: true,
        }
    }

    /// One ping per second for the fault's duration.
    ///
    /// Loss makes ping exit non-zero, so its status is informational only.
    pub fn network_probe(programs: &WorkloadPrograms, duration: Duration, host: &str) -> Self {
        Self {
            program: programs.ping.clone(),
            args: vec![
                "-c".into(),
                duration.as_secs().max(1).to_string(),
                "-i".into(),
                "1".into(),
                host.into(),
            ],
            scratch: None,
            fatal_exit: false,
        }
    }

    /// Full command string (for logging).
    pub fn to_command_string(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

fn secs(duration: Duration) -> String {
    format!("{}s", duration.as_secs().max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn programs() -> WorkloadPrograms {
        WorkloadPrograms::default()
    }

    #[test]
    fn cpu_stress_uses_all_cpus() {
        let spec = WorkloadSpec::cpu_stress(&programs(), Duration::from_secs(10));
        assert_eq!(spec.to_command_string(), "stress-ng --cpu 0 --timeout 10s -v");
        assert!(spec.fatal_exit);
    }

    #[test]
    fn memory_stress_uses_fixed_workers_and_share() {
        let spec = WorkloadSpec::memory_stress(&programs(), Duration::from_secs(30));
        assert_eq!(
            spec.to_command_string(),
            "stress-ng --vm 2 --vm-bytes 90% --timeout 30s -v"
        );
    }

    #[test]
    fn disk_stress_owns_its_scratch_file() {
        let scratch = PathBuf::from("/tmp/chaosd-disk-1.dat");
        let spec = WorkloadSpec::disk_stress(&programs(), Duration::from_secs(5), scratch.clone());
        assert_eq!(spec.program, "fio");
        assert_eq!(spec.scratch, Some(scratch));
        assert!(spec.args.contains(&"--filename=/tmp/chaosd-disk-1.dat".to_string()));
        assert!(spec.args.contains(&"--bs=4k".to_string()));
        assert!(spec.args.contains(&"--iodepth=16".to_string()));
        assert!(spec.args.contains(&"--size=256M".to_string()));
        assert!(spec.args.contains(&"--runtime=5s".to_string()));
    }

    #[test]
    fn probe_exit_status_is_not_fatal() {
        let spec = WorkloadSpec::network_probe(&programs(), Duration::from_secs(10), "1.1.1.1");
        assert_eq!(spec.to_command_string(), "ping -c 10 -i 1 1.1.1.1");
        assert!(!spec.fatal_exit);
    }

    #[test]
    fn sub_second_durations_round_up() {
        let spec = WorkloadSpec::cpu_stress(&programs(), Duration::from_millis(200));
        assert!(spec.args.contains(&"1s".to_string()));
    }

    #[test]
    fn custom_program_paths() {
        let programs = WorkloadPrograms {
            stress: "/opt/bin/stress-ng".into(),
            ..Default::default()
        };
        let spec = WorkloadSpec::cpu_stress(&programs, Duration::from_secs(1));
        assert_eq!(spec.program, "/opt/bin/stress-ng");
    }
}
