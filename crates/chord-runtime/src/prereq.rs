use std::fmt;
use std::path::Path;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    if name.contains('/') {
        return Path::new(name).is_file();
    }
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check the interpreter that lifecycle commands run under.
pub fn check_shell_prereqs(interpreter: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if !command_exists(interpreter) {
        missing.push(MissingPrereq {
            name: interpreter.to_owned(),
            purpose: "running service lifecycle commands",
            install_hint: "apt-get install bash, or set [shell] interpreter in the config file",
        });
    }
    missing
}

/// Check the PostgreSQL client tools used to bootstrap service databases.
pub fn check_database_prereqs() -> Vec<MissingPrereq> {
    ["createuser", "createdb", "psql"]
        .into_iter()
        .filter(|tool| !command_exists(tool))
        .map(|tool| MissingPrereq {
            name: tool.to_owned(),
            purpose: "bootstrapping service databases",
            install_hint: "apt-get install postgresql-client",
        })
        .collect()
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nchord-container needs these tools inside the container.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "psql".to_owned(),
            purpose: "bootstrapping service databases",
            install_hint: "apt-get install postgresql-client",
        };
        let s = m.to_string();
        assert!(s.contains("psql"));
        assert!(s.contains("postgresql-client"));
    }

    #[test]
    fn format_missing_lists_every_item() {
        let missing = vec![
            MissingPrereq {
                name: "createdb".to_owned(),
                purpose: "p",
                install_hint: "h",
            },
            MissingPrereq {
                name: "psql".to_owned(),
                purpose: "p",
                install_hint: "h",
            },
        ];
        let msg = format_missing(&missing);
        assert!(msg.starts_with("missing prerequisites:"));
        assert!(msg.contains("createdb"));
        assert!(msg.contains("psql"));
    }

    #[test]
    fn system_shell_is_present() {
        assert!(check_shell_prereqs("/bin/sh").is_empty());
        assert_eq!(check_shell_prereqs("/nonexistent/shell").len(), 1);
    }
}
