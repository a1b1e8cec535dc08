//! Process-manager and reverse-proxy configuration for each service.
//!
//! Rendering is pure; [`write_new_file`] is the only I/O and refuses to
//! replace anything already on disk.

use crate::CoreError;
use chord_runtime::{format_env_pair, format_template, resolve_run_environment};
use chord_schema::{keys, ConfigVars, Language, ServiceDescriptor, ServiceMode};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Timeouts and limits written into the rendered configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyPolicy {
    pub socket_timeout_secs: u32,
    /// Worker recycle timeout; kept above the socket timeout.
    pub harakiri_secs: u32,
    pub buffer_size: u32,
    pub proxy_timeout_secs: u32,
    pub client_max_body_size: String,
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        Self {
            socket_timeout_secs: 600,
            harakiri_secs: 610,
            buffer_size: 32768,
            proxy_timeout_secs: 630,
            client_max_body_size: "200m".to_owned(),
        }
    }
}

/// Everything rendered for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedService {
    /// uWSGI vassal; only embedded services have one.
    pub vassal: Option<String>,
    pub upstream: String,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    policy: ProxyPolicy,
    services_dir: PathBuf,
}

fn var<'a>(vars: &'a ConfigVars, key: &str) -> Result<&'a str, CoreError> {
    vars.get(key)
        .map(String::as_str)
        .ok_or_else(|| chord_runtime::RuntimeError::MissingVar(key.to_owned()).into())
}

impl TemplateRenderer {
    pub fn new(policy: ProxyPolicy, services_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            services_dir: services_dir.into(),
        }
    }

    pub fn render(
        &self,
        descriptor: &ServiceDescriptor,
        vars: &ConfigVars,
    ) -> Result<RenderedService, CoreError> {
        let kind = descriptor.kind();
        let vassal = match (kind.language, kind.mode) {
            (Language::Python, ServiceMode::Embedded) => Some(self.vassal(descriptor, vars)?),
            _ => None,
        };
        Ok(RenderedService {
            vassal,
            upstream: self.upstream(vars)?,
            location: self.location(kind.mode, vars)?,
        })
    }

    fn vassal(&self, descriptor: &ServiceDescriptor, vars: &ConfigVars) -> Result<String, CoreError> {
        let artifact = var(vars, keys::SERVICE_ARTIFACT)?;
        let module = descriptor.python_module.as_deref().unwrap_or_default();
        let callable = descriptor.python_callable.as_deref().unwrap_or_default();
        let p = &self.policy;

        let mut out = String::new();
        let _ = writeln!(out, "[uwsgi]");
        let _ = writeln!(out, "vhost = true");
        let _ = writeln!(out, "manage-script-name = true");
        let _ = writeln!(out, "enable-threads = true");
        let _ = writeln!(out, "socket-timeout = {}", p.socket_timeout_secs);
        let _ = writeln!(out, "harakiri = {}", p.harakiri_secs);
        let _ = writeln!(out, "lazy-apps = true");
        let _ = writeln!(out, "buffer-size = {}", p.buffer_size);
        let _ = writeln!(out, "socket = {}", var(vars, keys::SERVICE_SOCKET)?);
        let _ = writeln!(out, "venv = {}", var(vars, keys::SERVICE_VENV)?);
        let _ = writeln!(out, "chdir = {}", self.services_dir.join(artifact).display());
        let _ = writeln!(
            out,
            "mount = {}={module}:{callable}",
            var(vars, keys::SERVICE_URL_BASE_PATH)?
        );
        let _ = writeln!(out, "vacuum = true");
        let _ = writeln!(out, "logto = {}/{artifact}.log", var(vars, keys::SERVICE_LOGS)?);
        let _ = writeln!(out, "wsgi-disable-file-wrapper = true");
        if let Some(args) = &descriptor.python_args {
            let args = args
                .iter()
                .map(|a| format_template(a, vars))
                .collect::<Result<Vec<_>, _>>()?;
            let _ = writeln!(out, "pyargv = {}", args.join(" "));
        }
        // Every line of the service environment file becomes a uWSGI env entry.
        let _ = writeln!(out, "for-readline = {}", var(vars, keys::SERVICE_ENVIRONMENT)?);
        let _ = writeln!(out, "  env = %(_)");
        let _ = writeln!(out, "endfor =");
        for (key, value) in resolve_run_environment(descriptor, vars)? {
            let _ = writeln!(out, "env = {}", format_env_pair(&key, &value, false));
        }
        Ok(out)
    }

    fn upstream(&self, vars: &ConfigVars) -> Result<String, CoreError> {
        Ok(format!(
            "\nupstream chord_{} {{\n  server unix:{};\n}}\n",
            var(vars, keys::SERVICE_ARTIFACT)?,
            var(vars, keys::SERVICE_SOCKET)?
        ))
    }

    fn location(&self, mode: ServiceMode, vars: &ConfigVars) -> Result<String, CoreError> {
        let artifact = var(vars, keys::SERVICE_ARTIFACT)?;
        let base = var(vars, keys::SERVICE_URL_BASE_PATH)?;
        let timeout = self.policy.proxy_timeout_secs;
        let body = &self.policy.client_max_body_size;

        let mut out = format!("\nlocation = {base} {{\n  rewrite ^ {base}/;\n}}\n");
        let _ = writeln!(out, "\nlocation {base} {{");
        match mode {
            ServiceMode::Embedded => {
                let _ = writeln!(out, "  include              uwsgi_params;");
                let _ = writeln!(out, "  uwsgi_pass           chord_{artifact};");
                let _ = writeln!(out, "  uwsgi_read_timeout   {timeout}s;");
                let _ = writeln!(out, "  uwsgi_send_timeout   {timeout}s;");
            }
            ServiceMode::Daemon => {
                let _ = writeln!(out, "  proxy_http_version   1.1;");
                let _ = writeln!(out);
                let _ = writeln!(out, "  proxy_pass_header    Server;");
                let _ = writeln!(out, "  proxy_set_header     Upgrade           $http_upgrade;");
                let _ = writeln!(out, "  proxy_set_header     Connection        \"upgrade\";");
                let _ = writeln!(out, "  proxy_pass_header    Host;");
                let _ = writeln!(out, "  proxy_pass_header    X-Real-IP;");
                let _ = writeln!(
                    out,
                    "  proxy_set_header     X-Forwarded-For   $proxy_add_x_forwarded_for;"
                );
                let _ = writeln!(out, "  proxy_pass_header    X-Forwarded-Proto;");
                let _ = writeln!(out, "  proxy_pass_header    X-CHORD-Internal;");
                let _ = writeln!(out);
                let _ = writeln!(out, "  proxy_pass           http://chord_{artifact};");
                let _ = writeln!(out);
                let _ = writeln!(out, "  proxy_read_timeout   {timeout}s;");
                let _ = writeln!(out, "  proxy_send_timeout   {timeout}s;");
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "  client_body_timeout  {timeout}s;");
        let _ = writeln!(out, "  client_max_body_size {body};");
        let _ = writeln!(out, "  send_timeout         {timeout}s;");
        let _ = writeln!(out, "}}");
        Ok(out)
    }
}

/// Write `content` to a file that must not exist yet.
pub fn write_new_file(path: &Path, content: &str) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(CoreError::TargetExists(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    Ok(())
}
