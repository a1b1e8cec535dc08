use crate::backend::{CommandStatus, ServiceRuntime, SignalDelivery};
use crate::process::Signal;
use crate::RuntimeError;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One call recorded by [`MockRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Shell(String),
    Program { program: String, args: Vec<String> },
    Signal { pid: u32, signal: Signal },
}

impl Invocation {
    /// The call flattened to one line, for substring matching.
    pub fn line(&self) -> String {
        match self {
            Invocation::Shell(line) => line.clone(),
            Invocation::Program { program, args } if args.is_empty() => program.clone(),
            Invocation::Program { program, args } => format!("{program} {}", args.join(" ")),
            Invocation::Signal { pid, signal } => format!("kill -{signal} {pid}"),
        }
    }
}

/// Records every call instead of executing it.
///
/// Commands succeed unless their line contains a registered failure pattern.
/// Processes registered as live exit when signalled, except stubborn ones.
#[derive(Default)]
pub struct MockRuntime {
    invocations: Mutex<Vec<Invocation>>,
    failing: Vec<String>,
    live: Mutex<HashSet<u32>>,
    stubborn: HashSet<u32>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any command whose line contains `pattern` exits with status 1.
    #[must_use]
    pub fn fail_when_contains(mut self, pattern: impl Into<String>) -> Self {
        self.failing.push(pattern.into());
        self
    }

    #[must_use]
    pub fn with_live_process(self, pid: u32) -> Self {
        lock(&self.live).insert(pid);
        self
    }

    /// A live process that ignores every signal.
    #[must_use]
    pub fn with_stubborn_process(mut self, pid: u32) -> Self {
        self.stubborn.insert(pid);
        self.with_live_process(pid)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        lock(&self.invocations).clone()
    }

    /// Every recorded call as a line, in order.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.invocations).iter().map(Invocation::line).collect()
    }

    pub fn shell_lines(&self) -> Vec<String> {
        lock(&self.invocations)
            .iter()
            .filter_map(|i| match i {
                Invocation::Shell(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, invocation: Invocation) -> CommandStatus {
        let line = invocation.line();
        lock(&self.invocations).push(invocation);
        if self.failing.iter().any(|p| line.contains(p.as_str())) {
            CommandStatus::failed(1)
        } else {
            CommandStatus::SUCCESS
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ServiceRuntime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn run_shell(&self, line: &str) -> Result<CommandStatus, RuntimeError> {
        Ok(self.record(Invocation::Shell(line.to_owned())))
    }

    fn run_program(&self, program: &str, args: &[String]) -> Result<CommandStatus, RuntimeError> {
        Ok(self.record(Invocation::Program {
            program: program.to_owned(),
            args: args.to_vec(),
        }))
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<SignalDelivery, RuntimeError> {
        lock(&self.invocations).push(Invocation::Signal { pid, signal });
        let mut live = lock(&self.live);
        if !live.contains(&pid) {
            return Ok(SignalDelivery::NotRunning);
        }
        if !self.stubborn.contains(&pid) {
            live.remove(&pid);
        }
        Ok(SignalDelivery::Delivered)
    }

    fn is_alive(&self, pid: u32) -> bool {
        lock(&self.live).contains(&pid)
    }
}
