//! Image-build job: install everything the services need and write their
//! generated configuration. Every failure is fatal.

use crate::config::ToolConfig;
use crate::render::{write_new_file, TemplateRenderer};
use crate::resolver::ConfigResolver;
use crate::CoreError;
use chord_runtime::{shell_quote, CommandStatus, RuntimeError, ServiceRuntime};
use chord_schema::{apt_dependencies, Language, PackageName, ServiceDescriptor};
use chord_store::ChordLayout;
use std::path::PathBuf;
use tracing::info;

const UPSTREAMS_CONF: &str = "chord_upstreams.conf";
const SERVICES_CONF: &str = "chord_services.conf";

pub struct SetupJob {
    runtime: Box<dyn ServiceRuntime>,
    resolver: ConfigResolver,
    renderer: TemplateRenderer,
    layout: ChordLayout,
    nginx_conf_dir: PathBuf,
    interpreter: String,
    python: String,
}

fn step_result(step: &'static str, result: Result<CommandStatus, RuntimeError>) -> Result<(), CoreError> {
    match result {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(CoreError::SetupFailed {
            step,
            reason: status.to_string(),
        }),
        Err(e) => Err(CoreError::SetupFailed {
            step,
            reason: e.to_string(),
        }),
    }
}

impl SetupJob {
    pub fn new(config: &ToolConfig, runtime: Box<dyn ServiceRuntime>, resolver: ConfigResolver) -> Self {
        let layout = config.layout();
        Self {
            runtime,
            resolver,
            renderer: TemplateRenderer::new(config.proxy.clone(), layout.services_dir()),
            layout,
            nginx_conf_dir: config.paths.nginx_conf_dir.clone(),
            interpreter: config.shell.interpreter.clone(),
            python: config.shell.python.clone(),
        }
    }

    pub fn from_config(config: &ToolConfig, runtime: Box<dyn ServiceRuntime>) -> Self {
        let resolver = ConfigResolver::for_layout(&config.layout());
        Self::new(config, runtime, resolver)
    }

    pub fn runtime(&self) -> &dyn ServiceRuntime {
        self.runtime.as_ref()
    }

    /// Run every build step in order; returns the files written.
    pub fn run(&self, services: &[ServiceDescriptor]) -> Result<Vec<PathBuf>, CoreError> {
        info!("installing OS package dependencies");
        self.install_packages(services)?;
        info!("running pre-install commands");
        self.run_pre_install(services)?;
        info!("installing service runtimes");
        for service in services {
            self.install_runtime(service)?;
        }
        info!("generating configuration files");
        self.write_configs(services)
    }

    fn install_packages(&self, services: &[ServiceDescriptor]) -> Result<(), CoreError> {
        let packages = apt_dependencies(services);
        if packages.is_empty() {
            return Ok(());
        }
        let mut args = vec!["install".to_owned(), "-y".to_owned()];
        args.extend(packages.into_iter().map(PackageName::into_inner));
        step_result("apt dependencies", self.runtime.run_program("apt-get", &args))
    }

    fn run_pre_install(&self, services: &[ServiceDescriptor]) -> Result<(), CoreError> {
        for command in services.iter().flat_map(|s| &s.pre_install_commands) {
            info!("  {command}");
            step_result("pre-install command", self.runtime.run_shell(command))?;
        }
        Ok(())
    }

    fn install_runtime(&self, service: &ServiceDescriptor) -> Result<(), CoreError> {
        let artifact = service.artifact();
        let dir = self.layout.service_install_dir(artifact);
        std::fs::create_dir_all(&dir)?;

        let Some(repository) = service.repository.as_deref() else {
            return Err(CoreError::SetupFailed {
                step: "service runtime",
                reason: format!("'{artifact}' has no repository"),
            });
        };
        let dir = shell_quote(&dir.to_string_lossy());
        let chain = match service.language() {
            Language::Python => {
                let python = shell_quote(&self.python);
                format!(
                    "cd {dir} && {python} -m virtualenv --system-site-packages -p {python} env \
                     && source env/bin/activate \
                     && pip install --no-cache-dir {} && deactivate",
                    shell_quote(&format!("git+{repository}"))
                )
            }
            Language::Javascript => {
                format!("cd {dir} && npm install -g {}", shell_quote(repository))
            }
        };
        info!("  {artifact}");
        let line = format!("{} -c {}", self.interpreter, shell_quote(&chain));
        step_result("service runtime", self.runtime.run_shell(&line))
    }

    fn write_configs(&self, services: &[ServiceDescriptor]) -> Result<Vec<PathBuf>, CoreError> {
        let mut written = Vec::new();
        let mut upstreams = String::new();
        let mut locations = String::new();

        for service in services {
            let vars = self.resolver.static_config(service)?;
            let rendered = self.renderer.render(service, &vars)?;
            if let Some(vassal) = rendered.vassal {
                let path = self.layout.vassal_path(service.artifact());
                write_new_file(&path, &vassal)?;
                written.push(path);
            }
            upstreams.push_str(&rendered.upstream);
            locations.push_str(&rendered.location);
        }

        for (name, content) in [(UPSTREAMS_CONF, upstreams), (SERVICES_CONF, locations)] {
            let path = self.nginx_conf_dir.join(name);
            write_new_file(&path, &content)?;
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chord_runtime::MockRuntime;

    #[test]
    fn step_result_maps_status() {
        assert!(step_result("x", Ok(CommandStatus::SUCCESS)).is_ok());
        let err = step_result("apt dependencies", Ok(CommandStatus::failed(100))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "setup step 'apt dependencies' failed: exit status 100"
        );
    }

    #[test]
    fn setup_without_services_writes_empty_proxy_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ToolConfig::default().with_root(dir.path().join("chord"));
        config.paths.nginx_conf_dir = dir.path().join("nginx");
        let job = SetupJob::from_config(&config, Box::new(MockRuntime::new()));
        let written = job.run(&[]).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.exists()));
    }
}
