use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Advisory observer of a running child process tree.
///
/// Samples CPU and resident memory of the process and its descendants from
/// `/proc` at a fixed interval and emits them as debug diagnostics. Purely a
/// side channel: it never feeds back into the supervisor's control flow, and
/// every sampling error is swallowed. The loop ends when the process
/// disappears or the supervisor cancels the token.
pub(super) async fn watch(exec_id: Uuid, pid: i32, cancel: CancellationToken) {
    let clock_ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) } as f64;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64;
    let interval_secs = SAMPLE_INTERVAL.as_secs_f64();

    let mut previous_jiffies: Option<u64> = None;
    let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match sample_tree(pid, page_size) {
                    Ok(Some(sample)) => {
                        let cpu_percent = previous_jiffies
                            .map(|prev| {
                                sample.jiffies.saturating_sub(prev) as f64
                                    / clock_ticks
                                    / interval_secs
                                    * 100.0
                            })
                            .unwrap_or(0.0);
                        previous_jiffies = Some(sample.jiffies);

                        log::debug!(
                            "execution {exec_id} stats: cpu={cpu_percent:.1}%, \
                             memory={:.1}MiB, processes={}",
                            sample.resident_bytes as f64 / (1024.0 * 1024.0),
                            sample.processes,
                        );
                    }
                    Ok(None) => break, // process ended
                    Err(e) => log::warn!("execution {exec_id}: monitoring error: {e:#}"),
                }
            }
        }
    }

    log::debug!("execution {exec_id}: monitor stopped");
}

struct TreeSample {
    /// Cumulative user+system jiffies across the whole tree.
    jiffies: u64,
    resident_bytes: u64,
    processes: usize,
}

/// Walks the process and its descendants, accumulating CPU time and RSS.
/// Returns `Ok(None)` once the root process no longer exists.
fn sample_tree(pid: i32, page_size: u64) -> Result<Option<TreeSample>> {
    if !Path::new(&format!("/proc/{pid}")).exists() {
        return Ok(None);
    }

    let mut pids = vec![pid];
    collect_descendants(pid, &mut pids);

    let mut jiffies = 0u64;
    let mut resident_pages = 0u64;
    let mut alive = 0usize;

    for &p in &pids {
        // A process may exit mid-walk; only the root's disappearance matters.
        match sample_process(p) {
            Ok((proc_jiffies, proc_pages)) => {
                jiffies += proc_jiffies;
                resident_pages += proc_pages;
                alive += 1;
            }
            Err(_) if p != pid => continue,
            Err(e) => {
                return if Path::new(&format!("/proc/{pid}")).exists() {
                    Err(e)
                } else {
                    Ok(None)
                };
            }
        }
    }

    Ok(Some(TreeSample {
        jiffies,
        resident_bytes: resident_pages * page_size,
        processes: alive,
    }))
}

fn sample_process(pid: i32) -> Result<(u64, u64)> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat"))
        .with_context(|| format!("reading stat of pid {pid}"))?;
    // Fields after the parenthesized comm; comm itself may contain spaces.
    let after_comm = stat
        .rsplit_once(')')
        .map(|(_, rest)| rest)
        .context("malformed stat line")?;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let utime: u64 = fields.get(11).and_then(|f| f.parse().ok()).unwrap_or(0);
    let stime: u64 = fields.get(12).and_then(|f| f.parse().ok()).unwrap_or(0);

    let statm = fs::read_to_string(format!("/proc/{pid}/statm"))
        .with_context(|| format!("reading statm of pid {pid}"))?;
    let resident_pages: u64 = statm
        .split_whitespace()
        .nth(1)
        .and_then(|f| f.parse().ok())
        .unwrap_or(0);

    Ok((utime + stime, resident_pages))
}

fn collect_descendants(pid: i32, pids: &mut Vec<i32>) {
    let task_dir = format!("/proc/{pid}/task");
    let Ok(tasks) = fs::read_dir(task_dir) else {
        return;
    };

    for task in tasks.flatten() {
        let children_path = task.path().join("children");
        let Ok(children) = fs::read_to_string(children_path) else {
            continue;
        };
        for child in children.split_whitespace() {
            if let Ok(child_pid) = child.parse::<i32>() {
                if !pids.contains(&child_pid) {
                    pids.push(child_pid);
                    collect_descendants(child_pid, pids);
                }
            }
        }
    }
}
