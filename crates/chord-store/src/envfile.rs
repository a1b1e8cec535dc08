use crate::{fsync_dir, StoreError};
use chord_schema::ConfigVars;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::NamedTempFile;

const ENV_FILE_MODE: u32 = 0o600;

/// Line format of an environment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFileStyle {
    /// `KEY=value`, read line-by-line by uWSGI and sourced by service shells.
    Plain,
    /// `export KEY=value`, for the instance-wide file sourced by login shells.
    /// Values are written as given, so callers pass them already shell-quoted.
    Export,
}

fn is_env_name(key: &str) -> bool {
    let mut bytes = key.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn render(vars: &ConfigVars, style: EnvFileStyle) -> Result<String, StoreError> {
    let prefix = match style {
        EnvFileStyle::Plain => "",
        EnvFileStyle::Export => "export ",
    };
    let mut out = String::new();
    for (key, value) in vars {
        if !is_env_name(key) {
            return Err(StoreError::InvalidEnvironment {
                key: key.clone(),
                reason: "not a valid variable name",
            });
        }
        if value.contains('\n') {
            return Err(StoreError::InvalidEnvironment {
                key: key.clone(),
                reason: "value contains a newline",
            });
        }
        let _ = writeln!(out, "{prefix}{key}={value}");
    }
    Ok(out)
}

/// Write `vars` as an owner-only environment file, one unquoted entry per line.
///
/// Rewriting identical vars produces byte-identical content.
pub fn write_environment_file(
    path: &Path,
    vars: &ConfigVars,
    style: EnvFileStyle,
) -> Result<(), StoreError> {
    let content = render(vars, style)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;

    fs::set_permissions(path, fs::Permissions::from_mode(ENV_FILE_MODE))?;
    Ok(())
}
