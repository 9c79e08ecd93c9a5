//! Sandboxed execution of one snippet per interpreter process
//!
//! Nothing survives between requests: every invocation gets a new python3
//! process, a new working directory and a new global scope, so bindings and
//! open figures from one request cannot be observed by the next.
//!
//! ```text
//!   CodeArtifact
//!        │
//!        ▼
//!   tempdir (cwd, HOME, artifact.png) + cgroup exec-{uuid}
//!        │
//!        ▼
//!   fork ─► setsid ─► rlimits ─► drop caps ─► seccomp ─► exec python3 -I -B -c HARNESS
//!        │                                                     ▲
//!        ├── stdin:  snippet source ───────────────────────────┘
//!        ├── stdout/stderr: captured up to the output cap
//!        ▼
//!   exit or wall-clock timeout ─► killpg + cgroup.kill ─► reap
//!        │
//!        ▼
//!   drain pipes (short grace for leftover writers)
//!        │
//!        ▼
//!   ExecutionOutcome { stdout, stderr, image_b64 }
//! ```

use std::fmt;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{setsid, Pid};
use seccompiler::BpfProgram;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::config::SandboxPolicy;
use super::harness::{self, ARTIFACT_PATH_ENV, PRELUDE_ENV};
use super::outcome::{CodeArtifact, ExecutionOutcome};
use crate::cgroups::CgroupManager;
use crate::metrics::{SANDBOX_EXECUTIONS, SANDBOX_EXECUTION_DURATION, SANDBOX_IN_FLIGHT};
use crate::security::{capabilities, seccomp, SandboxSeccomp};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const TRUNCATION_NOTE: &str = "\n[output truncated]";
const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
const ARTIFACT_FILE: &str = "artifact.png";
/// How long the pipes may stay open once the process group is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Failure of the executor itself, as opposed to a failing snippet
#[derive(Debug)]
pub enum ExecutorError {
    /// Working directory, cgroup or filter could not be prepared
    Setup(io::Error),
    /// The interpreter could not be started
    Spawn(io::Error),
    /// Reading the child's output or status failed
    Io(io::Error),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::Setup(e) => write!(f, "Sandbox setup failed: {}", e),
            ExecutorError::Spawn(e) => write!(f, "Failed to start interpreter: {}", e),
            ExecutorError::Io(e) => write!(f, "Sandbox I/O error: {}", e),
        }
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutorError::Setup(e) | ExecutorError::Spawn(e) | ExecutorError::Io(e) => Some(e),
        }
    }
}

/// Runs one code artifact in isolation
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, code: &CodeArtifact) -> Result<ExecutionOutcome, ExecutorError>;
}

/// Decrements the in-flight gauge on every exit path
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        SANDBOX_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        SANDBOX_IN_FLIGHT.dec();
    }
}

/// Bytes read from one stream, capped
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_NOTE);
        }
        text
    }
}

/// Read a stream until EOF or until `stop` fires, keeping at most `limit`
/// bytes (0 keeps everything)
///
/// Bytes past the cap are still read and dropped so the child never blocks
/// on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
    mut stop: watch::Receiver<bool>,
) -> io::Result<Captured> {
    let mut bytes = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let n = tokio::select! {
            read = reader.read(&mut chunk) => read?,
            _ = stop.changed() => break,
        };
        if n == 0 {
            break;
        }
        let keep = if limit == 0 {
            n
        } else {
            limit.saturating_sub(bytes.len()).min(n)
        };
        bytes.extend_from_slice(&chunk[..keep]);
        truncated |= keep < n;
    }
    Ok(Captured { bytes, truncated })
}

/// Block until `pid` has exited, leaving it unreaped
///
/// The zombie keeps its pid, and with it the process group id, reserved
/// until `Child::wait` collects it.
fn wait_for_exit(pid: u32) -> io::Result<()> {
    loop {
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> ExecutorError {
    ExecutorError::Io(io::Error::new(io::ErrorKind::Other, e))
}

/// Describe an abnormal termination, `None` for a clean exit
fn termination_message(status: ExitStatus, oom_killed: bool, policy: &SandboxPolicy) -> Option<String> {
    if status.success() {
        return None;
    }
    if let Some(signo) = status.signal() {
        if oom_killed {
            return Some(format!(
                "Process killed: memory limit of {} MiB exceeded",
                policy.memory_bytes / (1024 * 1024)
            ));
        }
        return Some(match Signal::try_from(signo) {
            Ok(Signal::SIGXCPU) => format!(
                "Process killed: CPU time limit of {}s exceeded",
                policy.cpu_seconds
            ),
            Ok(signal) => format!("Process terminated by signal {} ({})", signo, signal.as_str()),
            Err(_) => format!("Process terminated by signal {}", signo),
        });
    }
    match status.code() {
        Some(code) => Some(format!("Process exited with status {}", code)),
        None => Some("Process terminated abnormally".to_string()),
    }
}

/// Read the rendered figure, if the harness saved one
async fn load_artifact(path: &Path) -> Option<String> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(error = %e, "Failed to read rendered artifact");
            return None;
        }
    };
    if !bytes.starts_with(PNG_MAGIC) {
        warn!(size = bytes.len(), "Discarding artifact that is not a PNG");
        return None;
    }
    Some(ExecutionOutcome::encode_artifact(&bytes))
}

/// Spawns a fresh, confined python3 for every request
pub struct PythonExecutor {
    policy: SandboxPolicy,
    seccomp: Option<Arc<BpfProgram>>,
    cgroups: Option<Arc<CgroupManager>>,
    prelude_json: String,
    /// matplotlib font/config cache; holds no execution state
    mpl_config_dir: tempfile::TempDir,
}

impl PythonExecutor {
    /// Prepare the executor
    ///
    /// Isolation layers the host cannot provide (cgroups v2 not writable,
    /// seccomp unsupported on this architecture) are disabled with a warning.
    pub fn new(policy: SandboxPolicy) -> Result<Self, ExecutorError> {
        let seccomp = if policy.seccomp {
            match SandboxSeccomp::with_sandbox_defaults().build() {
                Ok(program) => Some(Arc::new(program)),
                Err(e) => {
                    warn!(error = %e, "seccomp filter unavailable, running without it");
                    None
                }
            }
        } else {
            None
        };

        let cgroups = if policy.use_cgroups {
            CgroupManager::try_new().map(Arc::new)
        } else {
            None
        };

        let prelude_json = serde_json::to_string(&policy.prelude)
            .map_err(|e| ExecutorError::Setup(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let mpl_config_dir = tempfile::Builder::new()
            .prefix("jn66-mpl-")
            .tempdir()
            .map_err(ExecutorError::Setup)?;

        info!(
            python = %policy.python,
            timeout_secs = policy.timeout.as_secs_f64(),
            seccomp = seccomp.is_some(),
            cgroups = cgroups.is_some(),
            drop_caps = policy.drop_capabilities,
            prelude = policy.prelude.len(),
            "Python executor ready"
        );

        Ok(Self {
            policy,
            seccomp,
            cgroups,
            prelude_json,
            mpl_config_dir,
        })
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Run an empty snippet so the prelude imports and matplotlib's font
    /// cache are built before the first real request
    pub async fn warm_up(&self) -> Result<ExecutionOutcome, ExecutorError> {
        let start = Instant::now();
        let outcome = self.run(&CodeArtifact::new("pass")).await?;
        if outcome.is_success() {
            info!(duration_ms = start.elapsed().as_millis() as u64, "Sandbox warm-up complete");
        } else {
            warn!(stderr = %outcome.stderr.trim(), "Sandbox warm-up reported errors");
        }
        Ok(outcome)
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.policy.python);
        cmd.args(harness::interpreter_args())
            .current_dir(workdir)
            .env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_else(|_| FALLBACK_PATH.to_string()))
            .env("HOME", workdir)
            .env("LANG", "C.UTF-8")
            .env("MPLBACKEND", "Agg")
            .env("MPLCONFIGDIR", self.mpl_config_dir.path())
            .env("OPENBLAS_NUM_THREADS", "1")
            .env("OMP_NUM_THREADS", "1")
            .env(ARTIFACT_PATH_ENV, workdir.join(ARTIFACT_FILE))
            .env(PRELUDE_ENV, &self.prelude_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let cpu_seconds = self.policy.cpu_seconds;
        let memory_bytes = self.policy.memory_bytes;
        let max_file_bytes = self.policy.max_file_bytes;
        let drop_caps = self.policy.drop_capabilities;
        let filter = self.seccomp.clone();

        // Runs in the forked child between fork and exec
        unsafe {
            cmd.pre_exec(move || {
                setsid()?;
                if cpu_seconds > 0 {
                    // soft limit raises SIGXCPU, the hard limit one second later SIGKILL
                    setrlimit(Resource::RLIMIT_CPU, cpu_seconds, cpu_seconds + 1)?;
                }
                if memory_bytes > 0 {
                    setrlimit(Resource::RLIMIT_AS, memory_bytes, memory_bytes)?;
                }
                if max_file_bytes > 0 {
                    setrlimit(Resource::RLIMIT_FSIZE, max_file_bytes, max_file_bytes)?;
                }
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) != 0 {
                    return Err(io::Error::last_os_error());
                }
                if drop_caps {
                    capabilities::drop_all()?;
                }
                if let Some(program) = filter.as_deref() {
                    seccomp::install(program)?;
                }
                Ok(())
            });
        }

        cmd
    }

    async fn run(&self, code: &CodeArtifact) -> Result<ExecutionOutcome, ExecutorError> {
        let exec_id = format!("exec-{}", Uuid::now_v7());
        let span = info_span!("sandbox_execute", exec_id = %exec_id, code_bytes = code.source.len());
        self.run_isolated(&exec_id, code).instrument(span).await
    }

    async fn run_isolated(&self, exec_id: &str, code: &CodeArtifact) -> Result<ExecutionOutcome, ExecutorError> {
        let _in_flight = InFlight::enter();
        let start = Instant::now();

        let workdir = tempfile::Builder::new()
            .prefix("jn66-exec-")
            .tempdir()
            .map_err(ExecutorError::Setup)?;

        let cgroups = match &self.cgroups {
            Some(manager) => match manager.create(exec_id, &self.policy.cgroup_limits()) {
                Ok(()) => Some(Arc::clone(manager)),
                Err(e) => {
                    warn!(error = %e, "Failed to create invocation cgroup");
                    None
                }
            },
            None => None,
        };

        let result = self.supervise(exec_id, code, workdir.path(), cgroups.as_deref()).await;

        if let Some(manager) = cgroups {
            let id = exec_id.to_string();
            let destroyed = tokio::task::spawn_blocking(move || manager.destroy(&id)).await;
            if let Ok(Err(e)) = destroyed {
                warn!(error = %e, "Failed to remove invocation cgroup");
            }
        }

        let elapsed = start.elapsed();
        SANDBOX_EXECUTION_DURATION.observe(elapsed.as_secs_f64());

        let (outcome, status) = match result {
            Ok(pair) => pair,
            Err(e) => {
                SANDBOX_EXECUTIONS.with_label_values(&["error"]).inc();
                return Err(e);
            }
        };
        SANDBOX_EXECUTIONS.with_label_values(&[status]).inc();

        info!(
            status,
            duration_ms = elapsed.as_millis() as u64,
            stdout_bytes = outcome.stdout.len(),
            stderr_bytes = outcome.stderr.len(),
            artifact = outcome.has_artifact(),
            "Execution finished"
        );
        Ok(outcome)
    }

    /// Spawn, feed, wait and collect. Returns the outcome and its status label.
    async fn supervise(
        &self,
        exec_id: &str,
        code: &CodeArtifact,
        workdir: &Path,
        cgroups: Option<&CgroupManager>,
    ) -> Result<(ExecutionOutcome, &'static str), ExecutorError> {
        let mut child = self.command(workdir).spawn().map_err(ExecutorError::Spawn)?;
        let pid = child.id();

        if let (Some(manager), Some(pid)) = (cgroups, pid) {
            if let Err(e) = manager.add_process(exec_id, pid) {
                warn!(error = %e, pid, "Failed to move interpreter into its cgroup");
            }
        }
        debug!(pid = ?pid, "Interpreter started");

        // The harness reads all of stdin before running anything
        if let Some(mut stdin) = child.stdin.take() {
            let source = code.source.clone();
            tokio::spawn(async move {
                let _ = stdin.write_all(source.as_bytes()).await;
            });
        }

        let missing = || ExecutorError::Io(io::Error::new(io::ErrorKind::Other, "child output not captured"));
        let stdout = child.stdout.take().ok_or_else(missing)?;
        let stderr = child.stderr.take().ok_or_else(missing)?;
        let pid = pid.ok_or_else(|| {
            ExecutorError::Io(io::Error::new(io::ErrorKind::Other, "interpreter reaped before supervision"))
        })?;
        let limit = self.policy.output_limit_bytes;

        // Background children may hold the pipes open after the interpreter
        // exits, so the readers run on their own and are stopped explicitly
        let (stop_tx, stop_rx) = watch::channel(false);
        let stdout_task = tokio::spawn(read_capped(stdout, limit, stop_rx.clone()));
        let stderr_task = tokio::spawn(read_capped(stderr, limit, stop_rx));

        let exited = tokio::time::timeout(
            self.policy.timeout,
            tokio::task::spawn_blocking(move || wait_for_exit(pid)),
        )
        .await;

        // The interpreter is a zombie or still running here, so its pgid
        // cannot have been handed to another session yet
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        if let Some(manager) = cgroups {
            let _ = manager.kill_all(exec_id);
        }
        let status = child.wait().await.map_err(ExecutorError::Io)?;

        match exited {
            Ok(joined) => joined.map_err(join_error)?.map_err(ExecutorError::Io)?,
            Err(_) => {
                let _ = stop_tx.send(true);
                warn!(timeout_secs = self.policy.timeout.as_secs_f64(), "Execution timed out");
                let outcome = ExecutionOutcome::failure(format!(
                    "Execution timed out after {}s",
                    self.policy.timeout.as_secs_f64()
                ));
                return Ok((outcome, "timeout"));
            }
        }

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(DRAIN_GRACE).await;
            let _ = stop_tx.send(true);
        });
        let (stdout, stderr) = tokio::join!(stdout_task, stderr_task);
        stopper.abort();

        let stdout = stdout.map_err(join_error)?.map_err(ExecutorError::Io)?.into_text();
        let mut stderr = stderr.map_err(join_error)?.map_err(ExecutorError::Io)?.into_text();

        let oom_killed = cgroups.map(|m| m.oom_killed(exec_id)).unwrap_or(false);
        if let Some(message) = termination_message(status, oom_killed, &self.policy) {
            debug!(?status, "Interpreter terminated abnormally");
            if stderr.trim().is_empty() {
                stderr = message;
            }
        }

        let image_b64 = if stderr.is_empty() {
            load_artifact(&workdir.join(ARTIFACT_FILE)).await
        } else {
            None
        };

        let label = if stderr.is_empty() { "success" } else { "error" };
        Ok((ExecutionOutcome::new(stdout, stderr, image_b64), label))
    }
}

#[async_trait]
impl Executor for PythonExecutor {
    async fn execute(&self, code: &CodeArtifact) -> Result<ExecutionOutcome, ExecutorError> {
        self.run(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::config::PreludeImport;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .args(["-c", "pass"])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn matplotlib_available() -> bool {
        std::process::Command::new("python3")
            .args(["-c", "import matplotlib"])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn test_policy(prelude: Vec<PreludeImport>) -> SandboxPolicy {
        SandboxPolicy {
            use_cgroups: false,
            prelude,
            timeout: Duration::from_secs(20),
            ..SandboxPolicy::default()
        }
    }

    fn executor() -> PythonExecutor {
        PythonExecutor::new(test_policy(Vec::new())).unwrap()
    }

    #[test]
    fn test_termination_messages() {
        let policy = SandboxPolicy::default();
        assert_eq!(termination_message(ExitStatus::from_raw(0), false, &policy), None);

        // wait(2) encoding: exit code in the high byte, signal in the low bits
        let exited = termination_message(ExitStatus::from_raw(3 << 8), false, &policy).unwrap();
        assert_eq!(exited, "Process exited with status 3");

        let killed = termination_message(ExitStatus::from_raw(libc::SIGKILL), false, &policy).unwrap();
        assert!(killed.contains("SIGKILL"));

        let oom = termination_message(ExitStatus::from_raw(libc::SIGKILL), true, &policy).unwrap();
        assert!(oom.contains("memory limit"));

        let cpu = termination_message(ExitStatus::from_raw(libc::SIGXCPU), false, &policy).unwrap();
        assert!(cpu.contains("CPU time limit"));
    }

    #[tokio::test]
    async fn test_read_capped_truncates() {
        let (_stop_tx, stop) = watch::channel(false);
        let data: &[u8] = b"0123456789";
        let captured = read_capped(data, 4, stop.clone()).await.unwrap();
        assert_eq!(captured.bytes, b"0123");
        assert!(captured.truncated);
        assert_eq!(captured.into_text(), "0123\n[output truncated]");

        let whole = read_capped(&b"abc"[..], 0, stop).await.unwrap();
        assert!(!whole.truncated);
        assert_eq!(whole.into_text(), "abc");
    }

    #[tokio::test]
    async fn test_read_capped_stops_on_signal() {
        let (stop_tx, stop) = watch::channel(false);
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"partial").await.unwrap();

        let reading = tokio::spawn(read_capped(reader, 0, stop));
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();

        let captured = reading.await.unwrap().unwrap();
        assert_eq!(captured.into_text(), "partial");
        drop(writer);
    }

    #[tokio::test]
    async fn test_clean_run_has_empty_stderr() {
        if !python_available() {
            return;
        }
        let outcome = executor().execute(&CodeArtifact::new("print(256 ** 0.5)")).await.unwrap();
        assert_eq!(outcome.stdout, "16.0\n");
        assert_eq!(outcome.stderr, "");
        assert!(outcome.image_b64.is_none());
    }

    #[tokio::test]
    async fn test_exception_keeps_prior_stdout() {
        if !python_available() {
            return;
        }
        let code = "print('before')\nraise ValueError('boom')\nprint('after')";
        let outcome = executor().execute(&CodeArtifact::new(code)).await.unwrap();
        assert_eq!(outcome.stdout, "before\n");
        assert!(outcome.stderr.contains("Traceback"));
        assert!(outcome.stderr.contains("ValueError: boom"));
    }

    #[tokio::test]
    async fn test_bindings_do_not_leak_between_requests() {
        if !python_available() {
            return;
        }
        let executor = executor();
        let first = executor.execute(&CodeArtifact::new("leaked = 42")).await.unwrap();
        assert!(first.is_success());

        let second = executor.execute(&CodeArtifact::new("print(leaked)")).await.unwrap();
        assert!(second.stderr.contains("NameError"));
        assert_eq!(second.stdout, "");
    }

    #[tokio::test]
    async fn test_silent_exit_is_reported() {
        if !python_available() {
            return;
        }
        let outcome = executor()
            .execute(&CodeArtifact::new("import os\nos._exit(7)"))
            .await
            .unwrap();
        assert_eq!(outcome.stderr, "Process exited with status 7");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        if !python_available() {
            return;
        }
        let policy = SandboxPolicy {
            timeout: Duration::from_secs(1),
            ..test_policy(Vec::new())
        };
        let executor = PythonExecutor::new(policy).unwrap();

        let start = Instant::now();
        let outcome = executor
            .execute(&CodeArtifact::new("import time\nprint('x')\ntime.sleep(30)"))
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.stdout, "");
        assert!(outcome.stderr.contains("timed out"));
        assert!(outcome.image_b64.is_none());
    }

    #[tokio::test]
    async fn test_empty_snippet_succeeds() {
        if !python_available() {
            return;
        }
        let outcome = executor().execute(&CodeArtifact::new("")).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::new("", "", None));
    }

    #[tokio::test]
    async fn test_background_child_does_not_hold_the_request() {
        if !python_available() {
            return;
        }
        let policy = SandboxPolicy {
            timeout: Duration::from_secs(5),
            ..test_policy(Vec::new())
        };
        let executor = PythonExecutor::new(policy).unwrap();

        let code = "import subprocess\nchild = subprocess.Popen(['sleep', '60'])\nprint(child.pid)\nprint('done')";
        let start = Instant::now();
        let outcome = executor.execute(&CodeArtifact::new(code)).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.stderr, "");
        let mut lines = outcome.stdout.lines();
        let sleeper: u32 = lines.next().unwrap().parse().unwrap();
        assert_eq!(lines.next(), Some("done"));

        // The process group is killed with the interpreter: the sleeper is
        // gone or at most a zombie awaiting its new parent
        let mut alive = true;
        for _ in 0..40 {
            let stat = std::fs::read_to_string(format!("/proc/{}/stat", sleeper)).unwrap_or_default();
            let state = stat.rsplit(") ").next().and_then(|rest| rest.chars().next());
            if stat.is_empty() || state == Some('Z') {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive, "background child survived the request");
    }

    #[tokio::test]
    async fn test_artifact_does_not_leak_into_next_request() {
        if !python_available() || !matplotlib_available() {
            return;
        }
        let executor =
            PythonExecutor::new(test_policy(vec![PreludeImport::new("matplotlib.pyplot", "plt")])).unwrap();

        let drawn = executor
            .execute(&CodeArtifact::new("plt.plot([1, 2, 3], [1, 4, 9])"))
            .await
            .unwrap();
        assert_eq!(drawn.stderr, "");
        let png = drawn.artifact_bytes().unwrap().unwrap();
        assert!(png.starts_with(PNG_MAGIC));

        let plain = executor.execute(&CodeArtifact::new("print('no figure')")).await.unwrap();
        assert_eq!(plain.stderr, "");
        assert!(plain.image_b64.is_none());
    }
}
