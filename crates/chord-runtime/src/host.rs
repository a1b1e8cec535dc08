use crate::backend::{CommandStatus, ServiceRuntime, SignalDelivery};
use crate::process::{process_alive, Signal};
use crate::RuntimeError;
use std::process::Command;
use tracing::debug;

const SYSTEM_SHELL: &str = "/bin/sh";

/// Runs commands directly on the machine (or container) the tool runs in.
///
/// Child processes inherit stdio, so service output lands in the job log.
#[derive(Debug, Clone)]
pub struct HostRuntime {
    shell: String,
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self {
            shell: SYSTEM_SHELL.to_owned(),
        }
    }
}

impl HostRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> RuntimeError {
    RuntimeError::ExecFailed(format!("failed to run '{program}': {e}"))
}

impl ServiceRuntime for HostRuntime {
    fn name(&self) -> &'static str {
        "host"
    }

    fn run_shell(&self, line: &str) -> Result<CommandStatus, RuntimeError> {
        debug!("running: {line}");
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(line)
            .status()
            .map_err(|e| spawn_error(&self.shell, e))?;
        Ok(status.into())
    }

    fn run_program(&self, program: &str, args: &[String]) -> Result<CommandStatus, RuntimeError> {
        debug!("running: {program} {}", args.join(" "));
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| spawn_error(program, e))?;
        Ok(status.into())
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<SignalDelivery, RuntimeError> {
        let pid_i32 = i32::try_from(pid).map_err(|_| RuntimeError::SignalFailed {
            pid,
            source: std::io::Error::from_raw_os_error(libc::EINVAL),
        })?;
        if pid_i32 <= 0 {
            // 0 and negatives address process groups, never a single service.
            return Err(RuntimeError::SignalFailed {
                pid,
                source: std::io::Error::from_raw_os_error(libc::EINVAL),
            });
        }

        debug!("sending {signal} to pid {pid}");
        // SAFETY: kill() with a positive pid and a valid signal number is safe.
        #[allow(unsafe_code)]
        let ret = unsafe { libc::kill(pid_i32, signal.as_raw()) };
        if ret == 0 {
            return Ok(SignalDelivery::Delivered);
        }
        let errno = std::io::Error::last_os_error();
        if errno.raw_os_error() == Some(libc::ESRCH) {
            debug!("pid {pid} already exited before {signal}");
            Ok(SignalDelivery::NotRunning)
        } else {
            Err(RuntimeError::SignalFailed { pid, source: errno })
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        process_alive(pid)
    }
}
