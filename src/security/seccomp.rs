//! Seccomp BPF deny-list for sandboxed interpreters
//!
//! A Python interpreter (plus numpy, pandas, matplotlib...) touches far too
//! many syscalls for an allow-list to be maintainable, so the sandbox uses
//! the inverse shape: everything is allowed except a fixed set of
//! host-administration syscalls, which fail with `EPERM`.
//!
//! ```text
//!   syscall ──► filter ──in deny-list?──► Errno(EPERM)
//!                  │
//!                  └──otherwise──────────► Allow
//! ```
//!
//! The program is compiled in the parent (allocation is fine there) and only
//! installed in the forked child, right before exec.

use seccompiler::{BpfProgram, SeccompAction, SeccompFilter, SeccompRule, TargetArch};
use std::convert::TryInto;
use std::io;

/// Builder for the sandbox deny-list filter
pub struct SandboxSeccomp {
    denied_syscalls: Vec<(&'static str, i64)>,
}

impl SandboxSeccomp {
    /// Empty filter (denies nothing)
    pub fn new() -> Self {
        Self {
            denied_syscalls: Vec::new(),
        }
    }

    /// Deny-list covering privilege, kernel and cross-process operations
    pub fn with_sandbox_defaults() -> Self {
        let mut filter = Self::new();

        // Cross-process inspection
        filter
            .deny("ptrace", libc::SYS_ptrace)
            .deny("process_vm_readv", libc::SYS_process_vm_readv)
            .deny("process_vm_writev", libc::SYS_process_vm_writev)
            .deny("kcmp", libc::SYS_kcmp);

        // Filesystem topology
        filter
            .deny("mount", libc::SYS_mount)
            .deny("umount2", libc::SYS_umount2)
            .deny("pivot_root", libc::SYS_pivot_root)
            .deny("chroot", libc::SYS_chroot)
            .deny("swapon", libc::SYS_swapon)
            .deny("swapoff", libc::SYS_swapoff);

        // Namespaces
        filter
            .deny("unshare", libc::SYS_unshare)
            .deny("setns", libc::SYS_setns);

        // Kernel
        filter
            .deny("init_module", libc::SYS_init_module)
            .deny("finit_module", libc::SYS_finit_module)
            .deny("delete_module", libc::SYS_delete_module)
            .deny("kexec_load", libc::SYS_kexec_load)
            .deny("reboot", libc::SYS_reboot)
            .deny("bpf", libc::SYS_bpf)
            .deny("perf_event_open", libc::SYS_perf_event_open)
            .deny("userfaultfd", libc::SYS_userfaultfd)
            .deny("acct", libc::SYS_acct);

        // Keyring and clock
        filter
            .deny("add_key", libc::SYS_add_key)
            .deny("request_key", libc::SYS_request_key)
            .deny("keyctl", libc::SYS_keyctl)
            .deny("settimeofday", libc::SYS_settimeofday)
            .deny("clock_settime", libc::SYS_clock_settime);

        filter
    }

    pub fn deny(&mut self, name: &'static str, syscall: i64) -> &mut Self {
        self.denied_syscalls.push((name, syscall));
        self
    }

    /// Compile into BPF bytecode for the running architecture
    pub fn build(&self) -> Result<BpfProgram, io::Error> {
        let rules: Vec<(i64, Vec<SeccompRule>)> = self
            .denied_syscalls
            .iter()
            .map(|&(_, syscall)| (syscall, vec![])) // empty = match unconditionally
            .collect();

        let arch: TargetArch = std::env::consts::ARCH
            .try_into()
            .map_err(|e: seccompiler::BackendError| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let filter = SeccompFilter::new(
            rules.into_iter().collect(),
            SeccompAction::Allow,                      // not in the list
            SeccompAction::Errno(libc::EPERM as u32), // in the list
            arch,
        )
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        filter
            .try_into()
            .map_err(|e: seccompiler::BackendError| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    pub fn denied_count(&self) -> usize {
        self.denied_syscalls.len()
    }

    pub fn denied_names(&self) -> Vec<&'static str> {
        self.denied_syscalls.iter().map(|&(name, _)| name).collect()
    }
}

impl Default for SandboxSeccomp {
    fn default() -> Self {
        Self::with_sandbox_defaults()
    }
}

/// Install a compiled program on the calling process
///
/// Intended for a `pre_exec` hook. On success only the `prctl`/`seccomp`
/// calls seccompiler issues are made.
pub fn install(program: &BpfProgram) -> Result<(), io::Error> {
    seccompiler::apply_filter(program).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_filter() {
        let filter = SandboxSeccomp::with_sandbox_defaults();
        let result = filter.build();
        assert!(result.is_ok(), "Failed to build filter: {:?}", result.err());
        assert!(!result.unwrap().is_empty());
    }

    #[test]
    fn test_defaults_keep_exec_and_fork_available() {
        let names = SandboxSeccomp::with_sandbox_defaults().denied_names();
        assert!(names.contains(&"ptrace"));
        assert!(names.contains(&"mount"));
        assert!(!names.contains(&"execve"));
        assert!(!names.contains(&"clone"));
    }

    #[test]
    fn test_custom_filter() {
        let mut filter = SandboxSeccomp::new();
        filter.deny("ptrace", libc::SYS_ptrace).deny("mount", libc::SYS_mount);
        assert_eq!(filter.denied_count(), 2);
        assert!(filter.build().is_ok());
    }
}
