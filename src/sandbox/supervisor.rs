use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ExecuteError, monitor};

// Resource ceilings applied to every child process tree. The CPU ceiling is
// the only per-request value; it tracks the effective wall-clock timeout.
const PROCESS_LIMIT: u64 = 64;
const MEMORY_LIMIT_BYTES: u64 = 512 * 1024 * 1024;

// Upper bound on waiting for pipe readers after the child has been reaped.
// Descendants may still hold the write ends open.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Raw outcome of one supervised child process.
#[derive(Debug)]
pub(super) struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

/// Spawns the resolved command under resource limits and supervises it to
/// completion or forced termination.
///
/// The child is placed in its own process group so that a timeout can signal
/// the entire tree without touching the server. Output is drained
/// concurrently into shared buffers so that whatever was produced before a
/// timeout is still recoverable.
pub(super) async fn run(
    exec_id: Uuid,
    command: &[String],
    work_dir: &Path,
    timeout_secs: u64,
) -> Result<ProcessOutcome, ExecuteError> {
    let (program, args) = command.split_first().ok_or_else(|| ExecuteError::Launch {
        program: String::new(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "empty launch command"),
    })?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let cpu_limit = timeout_secs;
    // SAFETY: the closure only calls setrlimit, which is async-signal-safe.
    unsafe {
        cmd.pre_exec(move || apply_resource_limits(cpu_limit));
    }

    let mut child = cmd.spawn().map_err(|source| ExecuteError::Launch {
        program: program.clone(),
        source,
    })?;
    let pid = child.id().map(|p| p as i32);
    log::debug!("execution {exec_id}: process started [pid={pid:?}]");

    let cancel = CancellationToken::new();
    if let Some(pid) = pid {
        tokio::spawn(monitor::watch(exec_id, pid, cancel.clone()));
    }

    let stdout_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf = Arc::new(Mutex::new(Vec::new()));
    let stdout_task = spawn_pipe_reader(child.stdout.take(), stdout_buf.clone());
    let stderr_task = spawn_pipe_reader(child.stderr.take(), stderr_buf.clone());

    // The sole suspension point of the request: wait for the child, bounded
    // by the wall-clock timeout. On expiry the wait future is abandoned and
    // never polled again; the child is then already being torn down.
    let wait_result = timeout(Duration::from_secs(timeout_secs), child.wait()).await;
    let (exit_code, timed_out) = match wait_result {
        Ok(Ok(status)) => (exit_code_of(status), false),
        Ok(Err(source)) => {
            cancel.cancel();
            return Err(ExecuteError::Supervise { source });
        }
        Err(_elapsed) => {
            log::warn!("execution {exec_id}: timed out after {timeout_secs}s, killing process tree");
            terminate_process_tree(exec_id, &mut child, pid).await;
            (-1, true)
        }
    };
    cancel.cancel();

    // Best-effort drain: bounded, because orphaned descendants may keep the
    // pipes open long after the direct child is gone.
    let drain = async {
        let _ = stdout_task.await;
        let _ = stderr_task.await;
    };
    if timeout(OUTPUT_DRAIN_GRACE, drain).await.is_err() {
        log::debug!("execution {exec_id}: output drain expired, using partial output");
    }

    let stdout = String::from_utf8_lossy(&stdout_buf.lock()).into_owned();
    let mut stderr = String::from_utf8_lossy(&stderr_buf.lock()).into_owned();
    if timed_out {
        stderr.push_str(&format!(
            "\n\nExecution timed out after {timeout_secs} seconds."
        ));
    }

    log::debug!(
        "execution {exec_id}: process finished [exit_code={exit_code}, timed_out={timed_out}, \
         stdout={}B, stderr={}B]",
        stdout.len(),
        stderr.len()
    );

    Ok(ProcessOutcome {
        stdout,
        stderr,
        exit_code,
        timed_out,
    })
}

/// Applies the per-tree resource ceilings. Runs in the forked child before
/// exec, so only async-signal-safe calls are allowed here.
fn apply_resource_limits(cpu_secs: u64) -> io::Result<()> {
    set_rlimit(libc::RLIMIT_NPROC, PROCESS_LIMIT)?;
    set_rlimit(libc::RLIMIT_CPU, cpu_secs)?;
    // RLIMIT_DATA rather than RLIMIT_AS: VM runtimes (JVM, V8, Go) reserve
    // large virtual ranges up front and would not even start under an
    // address-space cap, while committed memory stays bounded either way.
    set_rlimit(libc::RLIMIT_DATA, MEMORY_LIMIT_BYTES)?;
    Ok(())
}

fn set_rlimit(resource: libc::__rlimit_resource_t, limit: u64) -> io::Result<()> {
    let rlim = libc::rlimit {
        rlim_cur: limit,
        rlim_max: limit,
    };
    // SAFETY: rlim is a valid struct and resource is a valid constant.
    if unsafe { libc::setrlimit(resource, &rlim) } != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Stops a timed-out process tree.
///
/// First the whole process group is asked to terminate, then the direct
/// child is killed outright regardless of whether the group signal landed.
/// Both attempts are independently best-effort; the group may already be
/// gone by the time either signal is sent.
async fn terminate_process_tree(exec_id: Uuid, child: &mut Child, pid: Option<i32>) {
    if let Some(pgid) = pid {
        // The child was spawned into its own group, so its pid names the group.
        // SAFETY: killpg with a stale pgid fails with ESRCH, nothing worse.
        if unsafe { libc::killpg(pgid, libc::SIGTERM) } != 0 {
            log::debug!(
                "execution {exec_id}: failed to signal process group {pgid}: {}",
                io::Error::last_os_error()
            );
        }
    }

    // kill() also reaps the child, so the wait abandoned by the timeout is
    // never attempted a second time.
    if let Err(e) = child.kill().await {
        log::debug!("execution {exec_id}: failed to kill process: {e}");
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

fn spawn_pipe_reader<R>(pipe: Option<R>, buffer: Arc<Mutex<Vec<u8>>>) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
            }
        }
    })
}
