//! cgroups v2 resource isolation
//!
//! rlimits only bound a single process. A snippet that forks, spawns
//! threads or allocates in children needs a kernel-enforced ceiling on the
//! whole tree, which is what a per-invocation cgroup provides.
//!
//! ```ignore
//! use jn66::cgroups::{CgroupManager, ResourceLimits};
//!
//! let cgroups = CgroupManager::new()?;
//! cgroups.create("exec-42", &policy.cgroup_limits())?;
//! cgroups.add_process("exec-42", child_pid)?;
//! // ... wait for the interpreter ...
//! cgroups.destroy("exec-42")?;
//! ```

pub mod manager;

pub use manager::{CgroupManager, ResourceLimits};
