//! PID files, liveness probes and bounded termination of daemon services.

use crate::backend::{ServiceRuntime, SignalDelivery};
use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    #[default]
    Term,
    Kill,
    Int,
}

impl Signal {
    pub fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
            Signal::Int => libc::SIGINT,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Signal::Term => "SIGTERM",
            Signal::Kill => "SIGKILL",
            Signal::Int => "SIGINT",
        })
    }
}

/// Read a PID written by a daemon start command.
///
/// Errors if the file is missing, or holds anything other than a positive
/// integer that fits a `pid_t`.
pub fn read_pid_file(path: &Path) -> Result<u32, RuntimeError> {
    let content = std::fs::read_to_string(path)?;
    let trimmed = content.trim();
    match trimmed.parse::<u32>() {
        Ok(pid) if pid > 0 && i32::try_from(pid).is_ok() => Ok(pid),
        _ => Err(RuntimeError::InvalidPid {
            path: path.to_path_buf(),
            content: trimmed.to_owned(),
        }),
    }
}

/// Whether `pid` names a live process. Zombies count as exited.
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // The state field follows the parenthesised command name, which may
        // itself contain spaces or parentheses.
        Ok(stat) => match stat.rfind(')').and_then(|i| stat[i + 1..].split_whitespace().next()) {
            Some("Z" | "X") => false,
            Some(_) => true,
            None => Path::new(&format!("/proc/{pid}")).exists(),
        },
        Err(_) => {
            let Ok(pid_i32) = i32::try_from(pid) else {
                return false;
            };
            // SAFETY: signal 0 performs only an existence and permission check.
            #[allow(unsafe_code)]
            let ret = unsafe { libc::kill(pid_i32, 0) };
            ret == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
        }
    }
}

/// How a daemon is asked to stop and how long to wait for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub signal: Signal,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            signal: Signal::Term,
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process was signalled and exited within the wait budget.
    Exited { waited: Duration },
    /// The process was already gone when the signal was sent.
    AlreadyGone,
    /// Still alive when the wait budget ran out.
    TimedOut { waited: Duration },
}

impl StopOutcome {
    #[inline]
    pub fn stopped(&self) -> bool {
        !matches!(self, StopOutcome::TimedOut { .. })
    }
}

/// Poll `pid` until it exits or `policy.max_wait` elapses.
///
/// Returns `Exited` or `TimedOut`; never sleeps past the deadline.
pub fn wait_for_exit(runtime: &dyn ServiceRuntime, pid: u32, policy: &StopPolicy) -> StopOutcome {
    let start = Instant::now();
    let deadline = start + policy.max_wait;
    loop {
        if !runtime.is_alive(pid) {
            return StopOutcome::Exited {
                waited: start.elapsed(),
            };
        }
        let now = Instant::now();
        if now >= deadline {
            return StopOutcome::TimedOut {
                waited: start.elapsed(),
            };
        }
        std::thread::sleep(policy.poll_interval.min(deadline - now));
    }
}

/// Signal `pid` and wait for it to exit.
pub fn terminate(
    runtime: &dyn ServiceRuntime,
    pid: u32,
    policy: &StopPolicy,
) -> Result<StopOutcome, RuntimeError> {
    match runtime.signal(pid, policy.signal)? {
        SignalDelivery::NotRunning => {
            debug!("pid {pid} was not running");
            Ok(StopOutcome::AlreadyGone)
        }
        SignalDelivery::Delivered => {
            let outcome = wait_for_exit(runtime, pid, policy);
            match outcome {
                StopOutcome::TimedOut { waited } => {
                    warn!("pid {pid} still alive {}ms after {}", waited.as_millis(), policy.signal);
                }
                StopOutcome::Exited { waited } => {
                    debug!("pid {pid} exited after {}ms", waited.as_millis());
                }
                StopOutcome::AlreadyGone => {}
            }
            Ok(outcome)
        }
    }
}
