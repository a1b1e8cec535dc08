//! Drives every service through the lifecycle phases.
//!
//! A phase runs to completion for the whole service list before the next one
//! starts. Only two things abort a phase: a missing required shared-config
//! key and a failure to write the instance-wide environment file. Anything
//! that goes wrong for one service is logged with its artifact, recorded in
//! the [`PhaseReport`], and processing moves on to the next service.

use crate::config::ToolConfig;
use crate::database::bootstrap_commands;
use crate::lifecycle::{validate_sequence, Phase};
use crate::resolver::ConfigResolver;
use crate::CoreError;
use chord_runtime::{
    read_pid_file, shell_quote, terminate, CommandStatus, RuntimeError, ServiceRuntime,
    ShellCommandRenderer, StopOutcome, StopPolicy,
};
use chord_schema::{keys, Artifact, CommandHook, ConfigVars, ServiceDescriptor};
use chord_store::{write_environment_file, EnvFileStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// What happened to one service in one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    Succeeded,
    /// The phase has nothing to do for this service.
    Skipped,
    /// One or more steps failed; each message names the step.
    Failed(Vec<String>),
}

impl ServiceOutcome {
    fn from_failures(failures: Vec<String>) -> Self {
        if failures.is_empty() {
            ServiceOutcome::Succeeded
        } else {
            ServiceOutcome::Failed(failures)
        }
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, ServiceOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub outcomes: Vec<(Artifact, ServiceOutcome)>,
}

impl PhaseReport {
    pub fn failures(&self) -> impl Iterator<Item = (&Artifact, &[String])> {
        self.outcomes.iter().filter_map(|(a, o)| match o {
            ServiceOutcome::Failed(msgs) => Some((a, msgs.as_slice())),
            _ => None,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

pub struct Orchestrator {
    runtime: Box<dyn ServiceRuntime>,
    resolver: ConfigResolver,
    renderer: ShellCommandRenderer,
    stop_policy: StopPolicy,
    fresh_database: bool,
}

impl Orchestrator {
    pub fn new(runtime: Box<dyn ServiceRuntime>, resolver: ConfigResolver) -> Self {
        Self {
            runtime,
            resolver,
            renderer: ShellCommandRenderer::default(),
            stop_policy: StopPolicy::default(),
            fresh_database: false,
        }
    }

    /// Orchestrator over the standard documents under the configured root.
    pub fn from_config(config: &ToolConfig, runtime: Box<dyn ServiceRuntime>) -> Self {
        let resolver = ConfigResolver::for_layout(&config.layout())
            .with_required_shared_keys(config.shared.required_keys.clone());
        Self::new(runtime, resolver)
            .with_renderer(config.command_renderer())
            .with_stop_policy(config.stop_policy())
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: ShellCommandRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    /// Bootstrap each service's database during pre-start.
    #[must_use]
    pub fn with_fresh_database(mut self, fresh: bool) -> Self {
        self.fresh_database = fresh;
        self
    }

    pub fn runtime(&self) -> &dyn ServiceRuntime {
        self.runtime.as_ref()
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Run `phases` in order after checking they follow the lifecycle.
    pub fn run_phases(
        &self,
        phases: &[Phase],
        services: &[ServiceDescriptor],
    ) -> Result<Vec<PhaseReport>, CoreError> {
        validate_sequence(phases)?;
        phases
            .iter()
            .map(|phase| self.run_phase(*phase, services))
            .collect()
    }

    pub fn run_phase(
        &self,
        phase: Phase,
        services: &[ServiceDescriptor],
    ) -> Result<PhaseReport, CoreError> {
        info!("{phase}: {} service(s)", services.len());
        let shared = self.resolver.shared_config()?;
        if phase == Phase::PreStart {
            let path = self.resolver.layout().common_environment();
            // Sourced by login shells, so every value is one quoted word.
            let quoted: ConfigVars = shared
                .iter()
                .map(|(key, value)| (key.clone(), shell_quote(value)))
                .collect();
            write_environment_file(&path, &quoted, EnvFileStyle::Export)?;
            debug!("wrote {}", path.display());
        }

        let outcomes = services
            .iter()
            .map(|service| {
                let outcome = self.run_service(phase, &shared, service);
                if let ServiceOutcome::Failed(msgs) = &outcome {
                    for msg in msgs {
                        error!(artifact = %service.artifact(), "{phase} failed: {msg}");
                    }
                }
                (service.artifact().clone(), outcome)
            })
            .collect();
        Ok(PhaseReport { phase, outcomes })
    }

    pub fn pre_start(&self, services: &[ServiceDescriptor]) -> Result<PhaseReport, CoreError> {
        self.run_phase(Phase::PreStart, services)
    }

    pub fn start(&self, services: &[ServiceDescriptor]) -> Result<PhaseReport, CoreError> {
        self.run_phase(Phase::Start, services)
    }

    pub fn post_start(&self, services: &[ServiceDescriptor]) -> Result<PhaseReport, CoreError> {
        self.run_phase(Phase::PostStart, services)
    }

    pub fn stop(&self, services: &[ServiceDescriptor]) -> Result<PhaseReport, CoreError> {
        self.run_phase(Phase::Stop, services)
    }

    pub fn post_stop(&self, services: &[ServiceDescriptor]) -> Result<PhaseReport, CoreError> {
        self.run_phase(Phase::PostStop, services)
    }

    fn run_service(
        &self,
        phase: Phase,
        shared: &ConfigVars,
        service: &ServiceDescriptor,
    ) -> ServiceOutcome {
        let hook = match phase {
            Phase::PostStart => Some(CommandHook::PostStart),
            Phase::PostStop => Some(CommandHook::PostStop),
            Phase::PreStart | Phase::Start | Phase::Stop => None,
        };
        if matches!(phase, Phase::Start | Phase::Stop) && !service.kind().is_daemon() {
            return ServiceOutcome::Skipped;
        }
        if hook.is_some_and(|h| service.commands(h).is_empty()) {
            return ServiceOutcome::Skipped;
        }

        let vars = match self.resolver.resolve_with(shared, service) {
            Ok(vars) => vars,
            Err(e) => return ServiceOutcome::Failed(vec![format!("config resolution: {e}")]),
        };

        match phase {
            Phase::PreStart => self.pre_start_service(service, &vars),
            Phase::Start => self.start_service(service, &vars),
            Phase::Stop => self.stop_service(service, &vars),
            Phase::PostStart => ServiceOutcome::from_failures(self.run_hook(
                service,
                &vars,
                CommandHook::PostStart,
            )),
            Phase::PostStop => ServiceOutcome::from_failures(self.run_hook(
                service,
                &vars,
                CommandHook::PostStop,
            )),
        }
    }

    fn pre_start_service(&self, service: &ServiceDescriptor, vars: &ConfigVars) -> ServiceOutcome {
        // Directories and the environment file are preconditions for every
        // later step of this service.
        if let Err(e) = prepare_service_files(vars) {
            return ServiceOutcome::Failed(vec![e.to_string()]);
        }

        let mut failures = Vec::new();
        if self.fresh_database {
            failures.extend(self.bootstrap_database(vars));
        }
        failures.extend(self.run_hook(service, vars, CommandHook::PreStart));
        ServiceOutcome::from_failures(failures)
    }

    fn bootstrap_database(&self, vars: &ConfigVars) -> Vec<String> {
        let commands = match bootstrap_commands(vars) {
            Ok(commands) => commands,
            Err(e) => return vec![format!("database bootstrap: {e}")],
        };
        commands
            .into_iter()
            .filter_map(|(program, args)| {
                let result = self.runtime.run_program(program, &args);
                check_status(result).err().map(|e| format!("database bootstrap ({program}): {e}"))
            })
            .collect()
    }

    fn start_service(&self, service: &ServiceDescriptor, vars: &ConfigVars) -> ServiceOutcome {
        let Some(runnable) = service.service_runnable.as_deref() else {
            return ServiceOutcome::Failed(vec!["no service_runnable".to_owned()]);
        };
        let template = daemon_start_template(runnable);
        info!("starting {}", service.artifact());
        match self.run_template(service, vars, &template) {
            Ok(()) => ServiceOutcome::Succeeded,
            Err(e) => ServiceOutcome::Failed(vec![format!("start command: {e}")]),
        }
    }

    fn stop_service(&self, service: &ServiceDescriptor, vars: &ConfigVars) -> ServiceOutcome {
        let pid_path = match pid_file_path(vars) {
            Ok(path) => path,
            Err(e) => return ServiceOutcome::Failed(vec![e.to_string()]),
        };
        let pid = match read_pid_file(&pid_path) {
            Ok(pid) => pid,
            Err(e) => {
                return ServiceOutcome::Failed(vec![format!(
                    "cannot read PID file {}: {e}",
                    pid_path.display()
                )])
            }
        };

        info!("stopping {} (pid {pid})", service.artifact());
        match terminate(self.runtime.as_ref(), pid, &self.stop_policy) {
            Ok(StopOutcome::TimedOut { waited }) => ServiceOutcome::Failed(vec![format!(
                "pid {pid} still running after {}ms",
                waited.as_millis()
            )]),
            Ok(_) => match std::fs::remove_file(&pid_path) {
                Ok(()) => ServiceOutcome::Succeeded,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => ServiceOutcome::Succeeded,
                Err(e) => ServiceOutcome::Failed(vec![format!(
                    "stopped, but cannot remove {}: {e}",
                    pid_path.display()
                )]),
            },
            Err(e) => ServiceOutcome::Failed(vec![e.to_string()]),
        }
    }

    /// Run every command of `hook`, continuing past failures.
    fn run_hook(&self, service: &ServiceDescriptor, vars: &ConfigVars, hook: CommandHook) -> Vec<String> {
        service
            .commands(hook)
            .iter()
            .filter_map(|template| {
                self.run_template(service, vars, template)
                    .err()
                    .map(|e| format!("{hook} command '{template}': {e}"))
            })
            .collect()
    }

    fn run_template(
        &self,
        service: &ServiceDescriptor,
        vars: &ConfigVars,
        template: &str,
    ) -> Result<(), String> {
        let line = self
            .renderer
            .build_full_command(service, vars, template)
            .map_err(|e| e.to_string())?;
        check_status(self.runtime.run_shell(&line))
    }
}

fn check_status(result: Result<CommandStatus, RuntimeError>) -> Result<(), String> {
    match result {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(status.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn var<'a>(vars: &'a ConfigVars, key: &str) -> Result<&'a str, CoreError> {
    vars.get(key)
        .map(String::as_str)
        .ok_or_else(|| RuntimeError::MissingVar(key.to_owned()).into())
}

/// Create the data, log and temp directories, then write the owner-only
/// service environment file. Safe to repeat.
fn prepare_service_files(vars: &ConfigVars) -> Result<(), CoreError> {
    for key in [keys::SERVICE_DATA, keys::SERVICE_LOGS, keys::SERVICE_TEMP] {
        std::fs::create_dir_all(var(vars, key)?)?;
    }
    let env_path = Path::new(var(vars, keys::SERVICE_ENVIRONMENT)?);
    write_environment_file(env_path, vars, EnvFileStyle::Plain)?;
    Ok(())
}

/// Detach `runnable`, send its output to the service log and record its PID.
///
/// The preamble and the runnable form one background list, so `exec` is
/// what makes `$!` the service's own PID rather than a wrapping subshell's.
pub(crate) fn daemon_start_template(runnable: &str) -> String {
    format!(
        "exec nohup {runnable} </dev/null &> {{{log_dir}}}/{{{artifact}}}.log & echo $! > {{{tmp_dir}}}/{{{artifact}}}.pid",
        log_dir = keys::SERVICE_LOGS,
        tmp_dir = keys::SERVICE_TEMP,
        artifact = keys::SERVICE_ARTIFACT,
    )
}

fn pid_file_path(vars: &ConfigVars) -> Result<PathBuf, CoreError> {
    let artifact = var(vars, keys::SERVICE_ARTIFACT)?;
    Ok(Path::new(var(vars, keys::SERVICE_TEMP)?).join(format!("{artifact}.pid")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_template_shape() {
        assert_eq!(
            daemon_start_template("chord-web --port 0"),
            "exec nohup chord-web --port 0 </dev/null &> {SERVICE_LOGS}/{SERVICE_ARTIFACT}.log \
             & echo $! > {SERVICE_TEMP}/{SERVICE_ARTIFACT}.pid"
        );
    }

    #[test]
    fn pid_file_lives_in_service_temp() {
        let mut vars = ConfigVars::new();
        vars.insert(keys::SERVICE_ARTIFACT.into(), "web".into());
        vars.insert(keys::SERVICE_TEMP.into(), "/chord/tmp/data/web".into());
        assert_eq!(
            pid_file_path(&vars).unwrap(),
            PathBuf::from("/chord/tmp/data/web/web.pid")
        );
    }

    #[test]
    fn outcome_from_failures() {
        assert_eq!(ServiceOutcome::from_failures(Vec::new()), ServiceOutcome::Succeeded);
        assert!(ServiceOutcome::from_failures(vec!["x".into()]).is_failure());
        assert!(!ServiceOutcome::Skipped.is_failure());
    }

    #[test]
    fn report_counts_failures() {
        let report = PhaseReport {
            phase: Phase::Stop,
            outcomes: vec![
                ("a".into(), ServiceOutcome::Succeeded),
                ("b".into(), ServiceOutcome::Failed(vec!["boom".into()])),
                ("c".into(), ServiceOutcome::Skipped),
            ],
        };
        assert_eq!(report.failure_count(), 1);
        let (artifact, msgs) = report.failures().next().unwrap();
        assert_eq!(artifact.as_str(), "b");
        assert_eq!(msgs, ["boom"]);
    }
}
