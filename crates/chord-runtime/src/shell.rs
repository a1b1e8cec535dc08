//! Shell command rendering.
//!
//! Every piece of user-supplied text (manifest commands, resolved config
//! values, paths) that lands in a shell line passes through
//! [`escape_single_quotes`]; nothing else in the workspace quotes for the shell.

use crate::placeholder::format_template;
use crate::RuntimeError;
use chord_schema::{keys, ConfigVars, ServiceDescriptor, ServiceKind};

pub const DEFAULT_INTERPRETER: &str = "/bin/bash";

/// Make `v` safe inside a single-quoted shell word: `'` becomes `'\''`.
pub fn escape_single_quotes(v: &str) -> String {
    v.replace('\'', "'\\''")
}

/// `v` as one single-quoted shell word.
pub fn shell_quote(v: &str) -> String {
    format!("'{}'", escape_single_quotes(v))
}

/// `KEY=value` for process-manager directives, or `KEY='value'` for a shell line.
pub fn format_env_pair(key: &str, value: &str, escaped: bool) -> String {
    if escaped {
        format!("{key}={}", shell_quote(value))
    } else {
        format!("{key}={value}")
    }
}

/// Resolve each `run_environment` template against the service's config.
pub fn resolve_run_environment(
    descriptor: &ServiceDescriptor,
    vars: &ConfigVars,
) -> Result<Vec<(String, String)>, RuntimeError> {
    descriptor
        .run_environment
        .iter()
        .map(|(key, template)| Ok((key.clone(), format_template(template, vars)?)))
        .collect()
}

/// Space-joined `run_environment` assignments, quoted when `escape` is set.
pub fn render_environment_assignments(
    descriptor: &ServiceDescriptor,
    vars: &ConfigVars,
    escape: bool,
) -> Result<String, RuntimeError> {
    Ok(resolve_run_environment(descriptor, vars)?
        .iter()
        .map(|(k, v)| format_env_pair(k, v, escape))
        .collect::<Vec<_>>()
        .join(" "))
}

fn var<'a>(vars: &'a ConfigVars, key: &str) -> Result<&'a str, RuntimeError> {
    vars.get(key)
        .map(String::as_str)
        .ok_or_else(|| RuntimeError::MissingVar(key.to_owned()))
}

/// Load the service environment file and export every `KEY=value` it declares.
///
/// The file is unquoted for uWSGI's `for-readline`, so each line is handed to
/// `export` as one word instead of being parsed by `source`. Shell characters
/// in values stay literal.
fn environment_preamble(vars: &ConfigVars) -> Result<Vec<String>, RuntimeError> {
    let env_file = shell_quote(var(vars, keys::SERVICE_ENVIRONMENT)?);
    Ok(vec![format!(
        "while IFS= read -r l || [ -n \"$l\" ]; do export \"$l\"; done < {env_file}"
    )])
}

fn managed_runtime_preamble(vars: &ConfigVars) -> Result<Vec<String>, RuntimeError> {
    let activate = format!("{}/bin/activate", var(vars, keys::SERVICE_VENV)?);
    let mut commands = vec![format!("source {}", shell_quote(&activate))];
    commands.extend(environment_preamble(vars)?);
    Ok(commands)
}

/// Renders manifest command templates into self-contained interpreter invocations.
#[derive(Debug, Clone)]
pub struct ShellCommandRenderer {
    interpreter: String,
}

impl Default for ShellCommandRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER)
    }
}

impl ShellCommandRenderer {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    #[inline]
    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Commands that set up the service's environment before its own command.
    pub fn preamble(
        &self,
        kind: ServiceKind,
        vars: &ConfigVars,
    ) -> Result<Vec<String>, RuntimeError> {
        if kind.has_managed_runtime() {
            managed_runtime_preamble(vars)
        } else {
            environment_preamble(vars)
        }
    }

    /// The `&&`-joined chain run by the interpreter: preamble, then the
    /// formatted template prefixed with the service's run environment.
    pub fn command_chain(
        &self,
        descriptor: &ServiceDescriptor,
        vars: &ConfigVars,
        template: &str,
    ) -> Result<String, RuntimeError> {
        let mut commands = self.preamble(descriptor.kind(), vars)?;
        let assignments = render_environment_assignments(descriptor, vars, true)?;
        let command = format_template(template, vars)?;
        commands.push(if assignments.is_empty() {
            command
        } else {
            format!("{assignments} {command}")
        });
        Ok(commands.join(" && "))
    }

    /// `<interpreter> -c '<chain>'`: one line whose exit status is the first
    /// failing link of the chain, or the final command's.
    pub fn build_full_command(
        &self,
        descriptor: &ServiceDescriptor,
        vars: &ConfigVars,
        template: &str,
    ) -> Result<String, RuntimeError> {
        let chain = self.command_chain(descriptor, vars, template)?;
        Ok(format!("{} -c {}", self.interpreter, shell_quote(&chain)))
    }
}
