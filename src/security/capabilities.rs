//! Linux capability dropping for sandboxed children
//!
//! Generated code needs no privileges at all, so a child drops every
//! capability before exec:
//!
//! ```text
//!   Bounding    ─► emptied (needs CAP_SETPCAP; skipped when unprivileged)
//!   Inheritable ─► cleared
//!   Ambient     ─► cleared
//!   Permitted   ─► cleared (cannot be raised again)
//!   Effective   ─► cleared
//! ```
//!
//! When the service already runs unprivileged every set is empty and the
//! calls are no-ops.

use std::io;

use caps::{CapSet, Capability};

fn to_io(e: caps::errors::CapsError) -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, e.to_string())
}

/// Drop every capability from the calling process
///
/// Meant for a `pre_exec` hook.
pub fn drop_all() -> Result<(), io::Error> {
    // Bounding set changes require CAP_SETPCAP in the effective set
    if caps::has_cap(None, CapSet::Effective, Capability::CAP_SETPCAP).unwrap_or(false) {
        caps::clear(None, CapSet::Bounding).map_err(to_io)?;
    }

    caps::clear(None, CapSet::Inheritable).map_err(to_io)?;
    // Ambient sets do not exist before Linux 4.3
    let _ = caps::clear(None, CapSet::Ambient);
    caps::clear(None, CapSet::Permitted).map_err(to_io)?;
    caps::clear(None, CapSet::Effective).map_err(to_io)?;

    Ok(())
}

/// Human readable summary of the current process' capabilities
pub fn describe_current() -> String {
    let mut output = String::new();

    for (name, set) in [
        ("effective", CapSet::Effective),
        ("permitted", CapSet::Permitted),
        ("inheritable", CapSet::Inheritable),
    ] {
        let rendered = match caps::read(None, set) {
            Ok(caps) if caps.is_empty() => "(none)".to_string(),
            Ok(caps) => {
                let mut names: Vec<String> = caps.iter().map(|c| c.to_string()).collect();
                names.sort();
                names.join(",")
            }
            Err(_) => "(unreadable)".to_string(),
        };
        if !output.is_empty() {
            output.push_str("; ");
        }
        output.push_str(&format!("{}={}", name, rendered));
    }

    output
}

/// Whether this process could drop privileges that matter
pub fn is_privileged() -> bool {
    caps::read(None, CapSet::Effective)
        .map(|caps| !caps.is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_lists_each_set() {
        let summary = describe_current();
        assert!(summary.contains("effective="));
        assert!(summary.contains("permitted="));
        assert!(summary.contains("inheritable="));
    }

    #[test]
    fn test_drop_all_in_child_process() {
        // Dropping is irreversible, so exercise it in a throwaway child
        use std::os::unix::process::CommandExt;

        let mut cmd = std::process::Command::new("true");
        unsafe {
            cmd.pre_exec(drop_all);
        }
        match cmd.status() {
            Ok(status) => assert!(status.success()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => panic!("drop_all failed in child: {}", e),
        }
    }
}
