//! cgroup v2 ceilings for sandboxed invocations
//!
//! Every execution gets a throwaway cgroup under
//! /sys/fs/cgroup/jn66/{exec_id}/ that lives exactly as long as the
//! interpreter does.
//!
//! ```text
//! /sys/fs/cgroup/                     ← cgroup v2 root
//! └── jn66/                           ← our namespace
//!     ├── exec-0190.../               ← one per invocation
//!     │   ├── cpu.max                 ← "100000 100000" = 1 core
//!     │   ├── memory.max              ← bytes, OOM-kill above it
//!     │   ├── pids.max                ← fork bomb ceiling
//!     │   ├── cgroup.procs            ← PIDs in this cgroup
//!     │   └── cgroup.kill             ← write "1" to SIGKILL everything
//!     └── exec-0190.../
//! ```
//!
//! Children of the interpreter (subprocess, multiprocessing) inherit the
//! cgroup, so `kill_all` reaches processes that escaped the process group.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

/// Base path for cgroup v2 filesystem
const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Our namespace within the cgroup hierarchy
const CGROUP_NAMESPACE: &str = "jn66";

/// CPU period in microseconds used for `cpu.max`
const CPU_PERIOD_USEC: u64 = 100_000;

/// Ceilings for one invocation
///
/// A value of 0 leaves the corresponding controller at "max".
///
/// `cpu.max` has the format "{quota} {period}": 1.0 core is
/// "100000 100000", half a core "50000 100000".
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    /// Number of CPU cores (can be fractional)
    pub cpu_cores: f64,
    /// Memory limit in bytes
    pub memory_bytes: u64,
    /// Maximum number of tasks (processes and threads)
    pub max_pids: u64,
}

impl ResourceLimits {
    pub fn unlimited() -> Self {
        Self {
            cpu_cores: 0.0,
            memory_bytes: 0,
            max_pids: 0,
        }
    }

    /// Value for `cpu.max`
    pub fn cpu_max(&self) -> String {
        if self.cpu_cores <= 0.0 {
            return format!("max {}", CPU_PERIOD_USEC);
        }
        let quota = ((self.cpu_cores * CPU_PERIOD_USEC as f64) as u64).max(1000);
        format!("{} {}", quota, CPU_PERIOD_USEC)
    }

    /// Value for `memory.max`
    pub fn memory_max(&self) -> String {
        limit_value(self.memory_bytes)
    }

    /// Value for `pids.max`
    pub fn pids_max(&self) -> String {
        limit_value(self.max_pids)
    }
}

fn limit_value(value: u64) -> String {
    if value == 0 {
        "max".to_string()
    } else {
        value.to_string()
    }
}

/// Creates and tears down per-invocation cgroups
pub struct CgroupManager {
    /// Base path: /sys/fs/cgroup/jn66
    base_path: PathBuf,
}

impl CgroupManager {
    /// Create the manager rooted at /sys/fs/cgroup/jn66
    ///
    /// Creates the namespace directory and delegates the cpu, memory and
    /// pids controllers to its children. Fails when cgroups v2 is not
    /// mounted or not writable by this process.
    pub fn new() -> io::Result<Self> {
        Self::with_base(PathBuf::from(CGROUP_ROOT).join(CGROUP_NAMESPACE))
    }

    /// Create the manager rooted at an arbitrary directory
    pub fn with_base(base_path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = base_path.into();

        if !base_path.exists() {
            fs::create_dir_all(&base_path)?;
        }

        // Children can only use controllers enabled in the parent's subtree_control
        fs::write(base_path.join("cgroup.subtree_control"), "+cpu +memory +pids")?;

        Ok(Self { base_path })
    }

    /// `new()`, or `None` with a warning when cgroups are unavailable
    pub fn try_new() -> Option<Self> {
        match Self::new() {
            Ok(manager) => Some(manager),
            Err(e) => {
                warn!(error = %e, "cgroups v2 unavailable, invocations run without cgroup ceilings");
                None
            }
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn exec_path(&self, exec_id: &str) -> PathBuf {
        self.base_path.join(exec_id)
    }

    /// Create the cgroup for one invocation and write its ceilings
    pub fn create(&self, exec_id: &str, limits: &ResourceLimits) -> io::Result<()> {
        let cgroup_path = self.exec_path(exec_id);

        // The kernel populates the control files on mkdir
        fs::create_dir_all(&cgroup_path)?;

        fs::write(cgroup_path.join("cpu.max"), limits.cpu_max())?;
        fs::write(cgroup_path.join("memory.max"), limits.memory_max())?;
        fs::write(cgroup_path.join("pids.max"), limits.pids_max())?;

        debug!(exec_id, cpu_max = %limits.cpu_max(), memory_max = %limits.memory_max(), "cgroup created");
        Ok(())
    }

    /// Move a process (and its future children) into the invocation's cgroup
    pub fn add_process(&self, exec_id: &str, pid: u32) -> io::Result<()> {
        fs::write(self.exec_path(exec_id).join("cgroup.procs"), pid.to_string())
    }

    /// SIGKILL every process in the invocation's cgroup
    ///
    /// Uses `cgroup.kill` (Linux 5.14+); older kernels fall back to signalling
    /// each PID listed in `cgroup.procs`.
    pub fn kill_all(&self, exec_id: &str) -> io::Result<()> {
        let cgroup_path = self.exec_path(exec_id);
        if !cgroup_path.exists() {
            return Ok(());
        }

        if fs::write(cgroup_path.join("cgroup.kill"), "1").is_ok() {
            return Ok(());
        }

        for pid in self.processes(exec_id)? {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGKILL,
            );
        }
        Ok(())
    }

    /// PIDs currently in the invocation's cgroup
    pub fn processes(&self, exec_id: &str) -> io::Result<Vec<u32>> {
        let content = fs::read_to_string(self.exec_path(exec_id).join("cgroup.procs"))?;
        Ok(content.lines().filter_map(|l| l.trim().parse().ok()).collect())
    }

    /// Whether the invocation was OOM-killed (`memory.events` oom_kill > 0)
    pub fn oom_killed(&self, exec_id: &str) -> bool {
        fs::read_to_string(self.exec_path(exec_id).join("memory.events"))
            .map(|content| parse_oom_kills(&content) > 0)
            .unwrap_or(false)
    }

    /// Kill leftovers and remove the invocation's cgroup
    ///
    /// rmdir fails while processes remain, so the kill is retried briefly
    /// while the kernel reaps them.
    pub fn destroy(&self, exec_id: &str) -> io::Result<()> {
        let cgroup_path = self.exec_path(exec_id);
        if !cgroup_path.exists() {
            return Ok(());
        }

        let mut last_err = None;
        for _ in 0..20 {
            let _ = self.kill_all(exec_id);
            // rmdir (not rm -rf) - the kernel requires this
            match fs::remove_dir(&cgroup_path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => last_err = Some(e),
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "cgroup busy")))
    }

    pub fn exists(&self, exec_id: &str) -> bool {
        self.exec_path(exec_id).exists()
    }

    /// Invocation cgroups currently present under the namespace
    pub fn list(&self) -> io::Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        Ok(ids)
    }
}

fn parse_oom_kills(memory_events: &str) -> u64 {
    memory_events
        .lines()
        .filter_map(|line| line.split_once(' '))
        .find(|(key, _)| *key == "oom_kill")
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}
