//! Python harness run by every sandboxed invocation
//!
//! The harness is passed to `python3 -I -B -c`, reads the snippet from stdin
//! and executes it in a brand new global scope seeded only with the prelude
//! modules. Exceptions are printed as a full traceback to stderr (harness
//! frames stripped). After a clean run it asks matplotlib itself whether a
//! figure is open and saves the current one to the artifact path; every
//! figure is closed before the interpreter exits.

/// Env var carrying the PNG destination for a rendered figure
pub const ARTIFACT_PATH_ENV: &str = "JN66_ARTIFACT_PATH";

/// Env var carrying the prelude as JSON `[{"module": ..., "alias": ...}]`
pub const PRELUDE_ENV: &str = "JN66_PRELUDE_JSON";

pub const HARNESS_SOURCE: &str = r#"
import contextlib
import importlib
import io
import json
import os
import sys
import traceback
import warnings


def _fresh_scope():
    scope = {"__name__": "__main__", "__builtins__": __builtins__}
    entries = json.loads(os.environ.get("JN66_PRELUDE_JSON") or "[]")
    with warnings.catch_warnings(), contextlib.redirect_stderr(io.StringIO()), contextlib.redirect_stdout(io.StringIO()):
        warnings.simplefilter("ignore")
        for entry in entries:
            try:
                scope[entry["alias"]] = importlib.import_module(entry["module"])
            except Exception:
                pass
    return scope


def _report(exc_info):
    etype, value, tb = exc_info
    traceback.print_exception(etype, value, tb.tb_next if tb is not None else None)


def _capture_figure(path):
    plt = sys.modules.get("matplotlib.pyplot")
    if plt is None:
        return
    try:
        if path and plt.get_fignums():
            plt.savefig(path, format="png")
    finally:
        plt.close("all")


def _main():
    source = sys.stdin.read()
    scope = _fresh_scope()
    try:
        exec(compile(source, "<sandbox>", "exec"), scope)
    except SystemExit as exc:
        if exc.code not in (None, 0):
            _report(sys.exc_info())
            return
    except BaseException:
        _report(sys.exc_info())
        return
    try:
        _capture_figure(os.environ.get("JN66_ARTIFACT_PATH"))
    except Exception:
        _report(sys.exc_info())


_main()
sys.stdout.flush()
"#;

/// Interpreter arguments that run the harness
pub fn interpreter_args() -> [&'static str; 4] {
    ["-I", "-B", "-c", HARNESS_SOURCE]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_uses_declared_env_names() {
        assert!(HARNESS_SOURCE.contains(ARTIFACT_PATH_ENV));
        assert!(HARNESS_SOURCE.contains(PRELUDE_ENV));
    }

    #[test]
    fn test_harness_detects_figures_from_library_state() {
        assert!(HARNESS_SOURCE.contains("plt.get_fignums()"));
        assert!(HARNESS_SOURCE.contains("plt.close(\"all\")"));
    }
}
