use crate::manifest::Language;
use std::fmt;

/// How a service is hosted inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceMode {
    /// Mounted inside the shared process manager (uWSGI) behind a unix socket.
    Embedded,
    /// Runs its own listener; started detached and tracked through a PID file.
    Daemon,
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceMode::Embedded => write!(f, "embedded"),
            ServiceMode::Daemon => write!(f, "daemon"),
        }
    }
}

/// The closed variant a service falls into: runtime language x hosting mode.
///
/// Selected once per service by [`ServiceDescriptor::kind`](crate::ServiceDescriptor::kind);
/// renderers match on it instead of re-inspecting descriptor flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKind {
    pub language: Language,
    pub mode: ServiceMode,
}

impl ServiceKind {
    pub fn new(language: Language, mode: ServiceMode) -> Self {
        Self { language, mode }
    }

    /// Whether the service owns an isolated runtime (a virtualenv) that must
    /// be activated before any of its commands run.
    pub fn has_managed_runtime(&self) -> bool {
        matches!(self.language, Language::Python)
    }

    pub fn is_daemon(&self) -> bool {
        self.mode == ServiceMode::Daemon
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.language, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_has_managed_runtime() {
        let kind = ServiceKind::new(Language::Python, ServiceMode::Embedded);
        assert!(kind.has_managed_runtime());
        assert!(!kind.is_daemon());
    }

    #[test]
    fn javascript_daemon() {
        let kind = ServiceKind::new(Language::Javascript, ServiceMode::Daemon);
        assert!(!kind.has_managed_runtime());
        assert!(kind.is_daemon());
        assert_eq!(kind.to_string(), "javascript/daemon");
    }
}
