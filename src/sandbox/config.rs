//! Sandbox service configuration
//!
//! `SandboxPolicy` is the per-invocation policy: interpreter, ceilings and
//! the read-only prelude injected into every fresh scope. `SandboxConfig`
//! adds the service-level knobs (bind address, concurrency, rate limit).

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cgroups::ResourceLimits;
use crate::config::{env_flag, env_parse, env_string};

/// One module made available to every snippet, e.g. `numpy as np`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreludeImport {
    pub module: String,
    pub alias: String,
}

impl PreludeImport {
    pub fn new(module: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            alias: alias.into(),
        }
    }

    /// Parse `"module"` or `"module as alias"`
    ///
    /// Without an alias the binding name is the first dotted component, the
    /// same name a plain `import a.b` would bind.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        match entry.split_once(" as ") {
            Some((module, alias)) => {
                let (module, alias) = (module.trim(), alias.trim());
                if module.is_empty() || alias.is_empty() {
                    return None;
                }
                Some(Self::new(module, alias))
            }
            None => {
                let root = entry.split('.').next().unwrap_or(entry);
                Some(Self::new(entry, root))
            }
        }
    }

    /// Parse a comma separated list, skipping malformed entries
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',').filter_map(Self::parse).collect()
    }
}

/// Data-science stack made available to generated code
pub fn default_prelude() -> Vec<PreludeImport> {
    vec![
        PreludeImport::new("numpy", "np"),
        PreludeImport::new("pandas", "pd"),
        PreludeImport::new("sklearn", "sklearn"),
        PreludeImport::new("matplotlib.pyplot", "plt"),
        PreludeImport::new("requests", "requests"),
    ]
}

/// Policy applied to each sandboxed invocation
///
/// A ceiling of 0 means "not enforced".
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    /// Python interpreter to spawn
    pub python: String,
    /// Wall-clock limit for one invocation
    pub timeout: Duration,
    /// RLIMIT_CPU in seconds
    pub cpu_seconds: u64,
    /// RLIMIT_AS and cgroup memory.max in bytes
    pub memory_bytes: u64,
    /// RLIMIT_FSIZE in bytes
    pub max_file_bytes: u64,
    /// cgroup pids.max
    pub max_pids: u64,
    /// cgroup cpu.max expressed in cores
    pub cpu_cores: f64,
    /// Bytes kept per captured stream
    pub output_limit_bytes: usize,
    /// Modules injected into every fresh scope
    pub prelude: Vec<PreludeImport>,
    /// Put each invocation in its own cgroup when cgroups v2 is writable
    pub use_cgroups: bool,
    /// Drop all capabilities in the child before exec
    pub drop_capabilities: bool,
    /// Install the seccomp deny-list in the child before exec
    pub seccomp: bool,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            timeout: Duration::from_secs(25),
            cpu_seconds: 20,
            memory_bytes: 2 * 1024 * 1024 * 1024, // 2GB
            max_file_bytes: 64 * 1024 * 1024,
            max_pids: 64,
            cpu_cores: 1.0,
            output_limit_bytes: 1024 * 1024,
            prelude: default_prelude(),
            use_cgroups: true,
            drop_capabilities: true,
            seccomp: true,
        }
    }
}

/// Saturates instead of wrapping on absurd values
fn mib_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

impl SandboxPolicy {
    /// Apply `JN66_*` environment overrides on top of the defaults
    pub fn from_env() -> Self {
        let mut policy = Self::default();
        if let Some(python) = env_string("JN66_PYTHON") {
            policy.python = python;
        }
        if let Some(secs) = env_parse::<u64>("JN66_EXEC_TIMEOUT_SECS") {
            policy.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = env_parse("JN66_CPU_SECS") {
            policy.cpu_seconds = secs;
        }
        if let Some(mb) = env_parse::<u64>("JN66_MEMORY_MB") {
            policy.memory_bytes = mib_to_bytes(mb);
        }
        if let Some(mb) = env_parse::<u64>("JN66_MAX_FILE_MB") {
            policy.max_file_bytes = mib_to_bytes(mb);
        }
        if let Some(pids) = env_parse("JN66_MAX_PIDS") {
            policy.max_pids = pids;
        }
        if let Some(cores) = env_parse("JN66_CPU_CORES") {
            policy.cpu_cores = cores;
        }
        if let Some(bytes) = env_parse("JN66_MAX_OUTPUT_BYTES") {
            policy.output_limit_bytes = bytes;
        }
        if let Ok(list) = std::env::var("JN66_PRELUDE") {
            policy.prelude = PreludeImport::parse_list(&list);
        }
        if let Some(flag) = env_flag("JN66_USE_CGROUPS") {
            policy.use_cgroups = flag;
        }
        if let Some(flag) = env_flag("JN66_DROP_CAPS") {
            policy.drop_capabilities = flag;
        }
        if let Some(flag) = env_flag("JN66_SECCOMP") {
            policy.seccomp = flag;
        }
        policy
    }

    /// cgroup ceilings derived from this policy
    pub fn cgroup_limits(&self) -> ResourceLimits {
        ResourceLimits {
            cpu_cores: self.cpu_cores,
            memory_bytes: self.memory_bytes,
            max_pids: self.max_pids,
        }
    }
}

/// Configuration of the sandbox HTTP service
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub bind_addr: SocketAddr,
    /// Executions allowed to run at once; further requests wait
    pub max_concurrent: usize,
    /// Token bucket burst size for `/execute`
    pub rate_limit_burst: u64,
    /// Token bucket refill rate (requests per second)
    pub rate_limit_per_sec: f64,
    pub policy: SandboxPolicy,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            max_concurrent: 4,
            rate_limit_burst: 50,
            rate_limit_per_sec: 10.0,
            policy: SandboxPolicy::default(),
        }
    }
}

impl SandboxConfig {
    pub fn from_env() -> Self {
        let mut config = Self {
            policy: SandboxPolicy::from_env(),
            ..Self::default()
        };
        if let Some(addr) = env_parse("JN66_SANDBOX_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(n) = env_parse::<usize>("JN66_MAX_CONCURRENT") {
            config.max_concurrent = n.max(1);
        }
        if let Some(burst) = env_parse("JN66_RATE_LIMIT_BURST") {
            config.rate_limit_burst = burst;
        }
        if let Some(rate) = env_parse("JN66_RATE_LIMIT_PER_SEC") {
            config.rate_limit_per_sec = rate;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_parse() {
        assert_eq!(PreludeImport::parse("numpy as np"), Some(PreludeImport::new("numpy", "np")));
        assert_eq!(
            PreludeImport::parse(" matplotlib.pyplot "),
            Some(PreludeImport::new("matplotlib.pyplot", "matplotlib"))
        );
        assert_eq!(PreludeImport::parse("numpy as "), None);
        assert_eq!(PreludeImport::parse(""), None);
    }

    #[test]
    fn test_prelude_parse_list_skips_blanks() {
        let list = PreludeImport::parse_list("numpy as np, ,pandas as pd,");
        assert_eq!(list, vec![PreludeImport::new("numpy", "np"), PreludeImport::new("pandas", "pd")]);
    }

    #[test]
    fn test_mib_to_bytes_saturates() {
        assert_eq!(mib_to_bytes(0), 0);
        assert_eq!(mib_to_bytes(2048), 2 * 1024 * 1024 * 1024);
        assert_eq!(mib_to_bytes(u64::MAX), u64::MAX);
        assert_eq!(mib_to_bytes(u64::MAX / 1024), u64::MAX);
    }

    #[test]
    fn test_default_policy() {
        let policy = SandboxPolicy::default();
        assert_eq!(policy.python, "python3");
        assert!(policy.timeout < Duration::from_secs(30));
        assert!(policy.prelude.iter().any(|p| p.alias == "plt"));

        let limits = policy.cgroup_limits();
        assert_eq!(limits.memory_bytes, policy.memory_bytes);
        assert_eq!(limits.max_pids, 64);
    }

    #[test]
    fn test_default_service_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.max_concurrent, 4);
    }
}
