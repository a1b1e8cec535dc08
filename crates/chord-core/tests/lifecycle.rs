use chord_core::{ConfigResolver, CoreError, Orchestrator, Phase, ServiceOutcome};
use chord_runtime::{HostRuntime, Invocation, MockRuntime, ShellCommandRenderer, Signal, StopPolicy};
use chord_schema::{keys, parse_services_str, ServiceDescriptor};
use chord_store::ChordLayout;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MANIFEST: &str = r#"[
  {
    "type": {"artifact": "search", "language": "python"},
    "repository": "https://github.com/c3g/chord_search",
    "python_module": "chord_search.app",
    "python_callable": "application",
    "pre_start_commands": ["echo pre-search {SERVICE_ARTIFACT}"],
    "post_start_commands": ["echo post-search"],
    "post_stop_commands": ["echo stopped-search"]
  },
  {
    "type": {"artifact": "web", "language": "javascript"},
    "repository": "https://github.com/c3g/chord_web",
    "wsgi": false,
    "service_runnable": "chord-web",
    "pre_start_commands": ["echo pre-web"],
    "post_start_commands": ["echo post-web"],
    "post_stop_commands": ["echo stopped-web"]
  },
  {
    "type": {"artifact": "old", "language": "python"},
    "python_module": "x",
    "python_callable": "y",
    "disabled": true
  }
]"#;

struct Instance {
    _dir: tempfile::TempDir,
    layout: ChordLayout,
    services: Vec<ServiceDescriptor>,
}

impl Instance {
    /// A container root whose image has been built: static config exists,
    /// shared config documents are in place, no secrets yet.
    fn new(manifest: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = ChordLayout::new(dir.path().join("chord"));
        std::fs::create_dir_all(layout.data_dir()).unwrap();
        std::fs::write(
            layout.auth_config(),
            r#"{"OIDC_DISCOVERY_URI": "https://auth.local/.well-known/openid-configuration"}"#,
        )
        .unwrap();
        std::fs::write(
            layout.instance_config(),
            r#"{"CHORD_URL": "http://node.local/"}"#,
        )
        .unwrap();

        let services = parse_services_str(manifest).unwrap();
        let build = ConfigResolver::for_layout(&layout);
        for s in &services {
            build.static_config(s).unwrap();
        }
        Self {
            _dir: dir,
            layout,
            services,
        }
    }

    fn orchestrator(&self, mock: &Arc<MockRuntime>) -> Orchestrator {
        Orchestrator::new(
            Box::new(Arc::clone(mock)),
            ConfigResolver::for_layout(&self.layout),
        )
        .with_stop_policy(quick_stop())
    }

    fn service(&self, artifact: &str) -> &ServiceDescriptor {
        self.services
            .iter()
            .find(|s| s.artifact() == artifact)
            .unwrap()
    }

    fn data(&self, artifact: &str) -> PathBuf {
        self.layout.data_dir().join(artifact)
    }

    fn pid_file(&self, artifact: &str) -> PathBuf {
        self.layout
            .tmp_dir()
            .join("data")
            .join(artifact)
            .join(format!("{artifact}.pid"))
    }
}

fn quick_stop() -> StopPolicy {
    StopPolicy {
        signal: Signal::Term,
        poll_interval: Duration::from_millis(20),
        max_wait: Duration::from_millis(300),
    }
}

fn mode(path: &Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o777
}

fn position(lines: &[String], needle: &str) -> usize {
    lines
        .iter()
        .position(|l| l.contains(needle))
        .unwrap_or_else(|| panic!("'{needle}' not run; got {lines:#?}"))
}

#[test]
fn disabled_services_are_not_loaded() {
    let instance = Instance::new(MANIFEST);
    assert_eq!(instance.services.len(), 2);
}

#[test]
fn pre_start_materializes_directories_and_environment() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new());
    let report = instance.orchestrator(&mock).pre_start(&instance.services).unwrap();
    assert_eq!(report.failure_count(), 0);

    let tmp = instance.layout.tmp_dir();
    for dir in [
        instance.data("search"),
        tmp.join("logs").join("search"),
        tmp.join("data").join("search"),
    ] {
        assert!(dir.is_dir(), "{} missing", dir.display());
    }

    let env_file = instance.data("search").join(".environment");
    assert_eq!(mode(&env_file), 0o600);
    let env = std::fs::read_to_string(&env_file).unwrap();
    assert!(env.contains("SERVICE_ARTIFACT=search\n"));
    assert!(env.contains("CHORD_URL=http://node.local/\n"));
    assert!(env.lines().any(|l| l.starts_with("POSTGRES_PASSWORD=")));

    let common = std::fs::read_to_string(instance.layout.common_environment()).unwrap();
    assert!(common.contains("export OIDC_DISCOVERY_URI='https://auth.local/"));
    assert!(common.contains("export CHORD_URL='http://node.local/'\n"));
    assert!(!common.contains("POSTGRES_PASSWORD"));

    assert_eq!(mode(&instance.layout.runtime_config()), 0o600);
    assert_eq!(mode(&instance.layout.static_config()), 0o644);
}

#[test]
fn pre_start_runs_commands_through_renderer() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new());
    instance.orchestrator(&mock).pre_start(&instance.services).unwrap();

    let lines = mock.shell_lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("/bin/bash -c '"));
    assert!(lines[0].contains("/bin/activate"));
    assert!(lines[0].contains("echo pre-search search"));
    assert!(!lines[1].contains("/bin/activate"));
    assert!(lines[1].contains("echo pre-web"));
}

#[test]
fn pre_start_twice_converges() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new());
    let orchestrator = instance.orchestrator(&mock);

    orchestrator.pre_start(&instance.services).unwrap();
    let env_file = instance.data("web").join(".environment");
    let env_first = std::fs::read(&env_file).unwrap();
    let secrets_first = std::fs::read(instance.layout.runtime_config()).unwrap();

    let report = orchestrator.pre_start(&instance.services).unwrap();
    assert_eq!(report.failure_count(), 0);
    assert_eq!(std::fs::read(&env_file).unwrap(), env_first);
    assert_eq!(
        std::fs::read(instance.layout.runtime_config()).unwrap(),
        secrets_first
    );
}

#[test]
fn secrets_for_search_are_generated_once() {
    let instance = Instance::new(MANIFEST);
    assert!(!instance.layout.runtime_config().exists());

    let resolver = ConfigResolver::for_layout(&instance.layout);
    let search = instance.service("search");
    let first = resolver.resolve(search).unwrap();
    let bytes_first = std::fs::read(instance.layout.runtime_config()).unwrap();

    let doc: serde_json::Value = serde_json::from_slice(&bytes_first).unwrap();
    let record = doc["search"].as_object().unwrap();
    assert_eq!(record.len(), 3);

    let second = ConfigResolver::for_layout(&instance.layout).resolve(search).unwrap();
    for key in keys::SECRET_KEYS {
        assert_eq!(first[key], second[key]);
        assert_eq!(record[key], first[key].as_str());
    }
    assert_eq!(
        std::fs::read(instance.layout.runtime_config()).unwrap(),
        bytes_first
    );
}

#[test]
fn phases_run_in_lifecycle_order() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new().with_live_process(4242));
    let orchestrator = instance.orchestrator(&mock);

    let up = orchestrator.run_phases(&Phase::UP, &instance.services).unwrap();
    assert_eq!(up.len(), 3);
    // The mock does not execute the start line, so record the PID by hand.
    std::fs::write(instance.pid_file("web"), "4242\n").unwrap();
    let down = orchestrator.run_phases(&Phase::DOWN, &instance.services).unwrap();
    assert!(down.iter().all(|r| r.failure_count() == 0));

    let lines = mock.lines();
    let pre = position(&lines, "echo pre-web");
    let start = position(&lines, "nohup chord-web");
    let post = position(&lines, "echo post-search");
    let kill = position(&lines, "kill -SIGTERM 4242");
    let post_stop = position(&lines, "echo stopped-web");
    assert!(pre < start && start < post && post < kill && kill < post_stop);
    // Every pre-start command precedes every post-start command.
    assert!(position(&lines, "echo pre-search") < position(&lines, "echo post-web"));
}

#[test]
fn start_only_launches_daemons() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new());
    let orchestrator = instance.orchestrator(&mock);
    orchestrator.pre_start(&instance.services).unwrap();
    let report = orchestrator.start(&instance.services).unwrap();

    let outcomes: Vec<_> = report.outcomes.iter().map(|(a, o)| (a.as_str(), o.clone())).collect();
    assert_eq!(
        outcomes,
        [("search", ServiceOutcome::Skipped), ("web", ServiceOutcome::Succeeded)]
    );
    let start_line = mock.shell_lines().pop().unwrap();
    assert!(start_line.contains("nohup chord-web </dev/null &>"));
    assert!(start_line.contains("/tmp/logs/web/web.log"));
    assert!(start_line.contains("echo $! >"));
    assert!(start_line.contains("/tmp/data/web/web.pid"));
}

#[test]
fn one_failing_service_does_not_stop_the_others() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new().fail_when_contains("pre-search"));
    let report = instance.orchestrator(&mock).pre_start(&instance.services).unwrap();

    assert_eq!(report.failure_count(), 1);
    let (artifact, messages) = report.failures().next().unwrap();
    assert_eq!(artifact.as_str(), "search");
    assert!(messages[0].contains("exit status 1"));
    assert!(mock.shell_lines().iter().any(|l| l.contains("echo pre-web")));
}

#[test]
fn missing_discovery_endpoint_aborts_phase() {
    let instance = Instance::new(MANIFEST);
    std::fs::remove_file(instance.layout.auth_config()).unwrap();
    let mock = Arc::new(MockRuntime::new());

    let err = instance.orchestrator(&mock).pre_start(&instance.services).unwrap_err();
    assert!(matches!(err, CoreError::MissingSharedKey(ref k) if k == "OIDC_DISCOVERY_URI"));
    assert!(mock.invocations().is_empty());
    assert!(!instance.data("search").exists());
}

#[test]
fn service_without_static_config_fails_alone() {
    let instance = Instance::new(MANIFEST);
    let extra = parse_services_str(
        r#"[{"type": {"artifact": "late", "language": "javascript"},
             "wsgi": false, "service_runnable": "late-run"}]"#,
    )
    .unwrap();
    let services: Vec<_> = instance.services.iter().cloned().chain(extra).collect();

    let mock = Arc::new(MockRuntime::new());
    let report = instance.orchestrator(&mock).pre_start(&services).unwrap();
    assert_eq!(report.failure_count(), 1);
    let (artifact, messages) = report.failures().next().unwrap();
    assert_eq!(artifact.as_str(), "late");
    assert!(messages[0].contains("no static config"));
}

#[test]
fn stop_confirms_exit_and_removes_pid_file() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new().with_live_process(77));
    let orchestrator = instance.orchestrator(&mock);
    orchestrator.pre_start(&instance.services).unwrap();
    std::fs::write(instance.pid_file("web"), "77").unwrap();

    let started = Instant::now();
    let report = orchestrator.stop(&instance.services).unwrap();
    assert!(started.elapsed() < quick_stop().max_wait);
    assert_eq!(report.failure_count(), 0);
    assert!(!instance.pid_file("web").exists());
    assert_eq!(
        mock.invocations().last().unwrap(),
        &Invocation::Signal {
            pid: 77,
            signal: Signal::Term
        }
    );
}

#[test]
fn stop_gives_up_at_budget_boundary() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new().with_stubborn_process(88));
    let orchestrator = instance.orchestrator(&mock);
    orchestrator.pre_start(&instance.services).unwrap();
    std::fs::write(instance.pid_file("web"), "88").unwrap();

    let started = Instant::now();
    let report = orchestrator.stop(&instance.services).unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= quick_stop().max_wait);
    assert!(elapsed < Duration::from_secs(5));
    let (artifact, messages) = report.failures().next().unwrap();
    assert_eq!(artifact.as_str(), "web");
    assert!(messages[0].contains("still running"));
    assert!(instance.pid_file("web").exists());
}

#[test]
fn stop_treats_vanished_process_as_stopped() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new());
    let orchestrator = instance.orchestrator(&mock);
    orchestrator.pre_start(&instance.services).unwrap();
    std::fs::write(instance.pid_file("web"), "31337").unwrap();

    let report = orchestrator.stop(&instance.services).unwrap();
    assert_eq!(report.failure_count(), 0);
    assert!(!instance.pid_file("web").exists());
}

#[test]
fn stop_without_pid_file_is_a_failure() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new());
    let orchestrator = instance.orchestrator(&mock);
    orchestrator.pre_start(&instance.services).unwrap();

    let report = orchestrator.stop(&instance.services).unwrap();
    assert_eq!(report.failure_count(), 1);
    assert!(report.failures().next().unwrap().1[0].contains("PID file"));
}

#[test]
fn fresh_database_bootstraps_each_service() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new());
    let orchestrator = instance.orchestrator(&mock).with_fresh_database(true);
    orchestrator.pre_start(&instance.services).unwrap();

    let lines = mock.lines();
    assert!(lines.iter().any(|l| l.starts_with("createuser") && l.ends_with("search_acct")));
    assert!(lines.iter().any(|l| l == "createdb -O web_acct web_db"));
    assert!(lines
        .iter()
        .any(|l| l.contains(r#"REVOKE CONNECT ON DATABASE "search_db" FROM PUBLIC;"#)));
    // Bootstrap happens before the service's own pre-start commands.
    assert!(position(&lines, "createdb -O search_acct") < position(&lines, "echo pre-search"));
}

#[test]
fn no_database_bootstrap_without_flag() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new());
    instance.orchestrator(&mock).pre_start(&instance.services).unwrap();
    assert!(!mock.lines().iter().any(|l| l.starts_with("createuser")));
}

#[test]
fn invalid_sequence_runs_nothing() {
    let instance = Instance::new(MANIFEST);
    let mock = Arc::new(MockRuntime::new());
    let err = instance
        .orchestrator(&mock)
        .run_phases(&[Phase::PostStart, Phase::PreStart], &instance.services)
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidPhaseOrder { .. }));
    assert!(mock.invocations().is_empty());
}

const HOST_MANIFEST: &str = r#"[{
    "type": {"artifact": "echo", "language": "javascript"},
    "wsgi": false,
    "service_runnable": "sleep 30",
    "run_environment": {"QUOTED": "{SERVICE_ARTIFACT}: it's $(not) `expanded`"},
    "pre_start_commands": ["printenv QUOTED > {SERVICE_DATA}/quoted.txt"]
}]"#;

#[test]
fn quoted_value_reaches_real_subprocess() {
    let instance = Instance::new(HOST_MANIFEST);
    let orchestrator = Orchestrator::new(
        Box::new(HostRuntime::new()),
        ConfigResolver::for_layout(&instance.layout),
    )
    .with_renderer(ShellCommandRenderer::new("/bin/bash"));

    let report = orchestrator.pre_start(&instance.services).unwrap();
    assert_eq!(report.failure_count(), 0, "{report:?}");
    assert_eq!(
        std::fs::read_to_string(instance.data("echo").join("quoted.txt")).unwrap(),
        "echo: it's $(not) `expanded`\n"
    );
}

const SHARED_MANIFEST: &str = r#"[{
    "type": {"artifact": "node", "language": "javascript"},
    "wsgi": false,
    "service_runnable": "sleep 30",
    "run_environment": {"N": "{CHORD_NAME}"},
    "pre_start_commands": ["printenv N CHORD_NAME > {SERVICE_DATA}/n.txt"]
}]"#;

#[test]
fn shared_value_with_shell_characters_reaches_real_subprocess() {
    let instance = Instance::new(SHARED_MANIFEST);
    std::fs::write(
        instance.layout.instance_config(),
        r#"{"CHORD_URL": "http://node.local/", "CHORD_NAME": "Bob's node"}"#,
    )
    .unwrap();
    let orchestrator = Orchestrator::new(
        Box::new(HostRuntime::new()),
        ConfigResolver::for_layout(&instance.layout),
    )
    .with_renderer(ShellCommandRenderer::new("/bin/bash"));

    let report = orchestrator.pre_start(&instance.services).unwrap();
    assert_eq!(report.failure_count(), 0, "{report:?}");
    assert_eq!(
        std::fs::read_to_string(instance.data("node").join("n.txt")).unwrap(),
        "Bob's node\nBob's node\n"
    );

    // The instance-wide file is sourced as-is by login shells.
    let common = instance.layout.common_environment();
    let output = std::process::Command::new("/bin/bash")
        .arg("-c")
        .arg(format!(". '{}' && printenv CHORD_NAME", common.display()))
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Bob's node\n");
}

#[test]
fn real_daemon_starts_and_stops() {
    let instance = Instance::new(HOST_MANIFEST);
    let orchestrator = Orchestrator::new(
        Box::new(HostRuntime::new()),
        ConfigResolver::for_layout(&instance.layout),
    )
    .with_stop_policy(StopPolicy {
        max_wait: Duration::from_secs(5),
        ..quick_stop()
    });

    orchestrator.pre_start(&instance.services).unwrap();
    let started = orchestrator.start(&instance.services).unwrap();
    assert_eq!(started.failure_count(), 0, "{started:?}");
    let pid_file = instance.pid_file("echo");
    let pid: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    assert!(chord_runtime::process_alive(pid));

    let stopped = orchestrator.stop(&instance.services).unwrap();
    assert_eq!(stopped.failure_count(), 0, "{stopped:?}");
    assert!(!pid_file.exists());
}
