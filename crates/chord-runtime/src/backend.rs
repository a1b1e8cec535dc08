use crate::process::Signal;
use crate::RuntimeError;
use serde::{Deserialize, Serialize};

/// Exit status of a finished command. `code` is `None` when the process was
/// killed by a signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandStatus {
    pub code: Option<i32>,
}

impl CommandStatus {
    pub const SUCCESS: Self = Self { code: Some(0) };

    pub fn failed(code: i32) -> Self {
        Self { code: Some(code) }
    }

    #[inline]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for CommandStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    Delivered,
    /// No such process; it exited before the signal was sent.
    NotRunning,
}

/// Everything the orchestrator needs from the host: running shell lines and
/// programs, signalling processes, and probing whether they are alive.
pub trait ServiceRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// Run a complete shell line and wait for it to finish. Output is not
    /// captured.
    fn run_shell(&self, line: &str) -> Result<CommandStatus, RuntimeError>;

    /// Run `program` with `args` directly, without a shell.
    fn run_program(&self, program: &str, args: &[String]) -> Result<CommandStatus, RuntimeError>;

    fn signal(&self, pid: u32, signal: Signal) -> Result<SignalDelivery, RuntimeError>;

    fn is_alive(&self, pid: u32) -> bool;
}

/// Shared runtimes, so a caller can keep a handle (e.g. on a mock) while
/// handing ownership to an orchestrator.
impl<T: ServiceRuntime + ?Sized> ServiceRuntime for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run_shell(&self, line: &str) -> Result<CommandStatus, RuntimeError> {
        (**self).run_shell(line)
    }

    fn run_program(&self, program: &str, args: &[String]) -> Result<CommandStatus, RuntimeError> {
        (**self).run_program(program, args)
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<SignalDelivery, RuntimeError> {
        (**self).signal(pid, signal)
    }

    fn is_alive(&self, pid: u32) -> bool {
        (**self).is_alive(pid)
    }
}

pub fn select_runtime(name: &str) -> Result<Box<dyn ServiceRuntime>, RuntimeError> {
    match name {
        "host" => Ok(Box::new(crate::host::HostRuntime::new())),
        "mock" => Ok(Box::new(crate::mock::MockRuntime::new())),
        other => Err(RuntimeError::RuntimeUnavailable(other.to_owned())),
    }
}
