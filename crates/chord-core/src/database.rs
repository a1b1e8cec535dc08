use crate::CoreError;
use chord_runtime::RuntimeError;
use chord_schema::{keys, ConfigVars};

fn var(vars: &ConfigVars, key: &str) -> Result<String, CoreError> {
    vars.get(key)
        .cloned()
        .ok_or_else(|| RuntimeError::MissingVar(key.to_owned()).into())
}

/// `name` as a quoted SQL identifier. Artifacts may carry `-` or uppercase,
/// which bare identifiers reject or fold.
fn sql_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The PostgreSQL commands that give a service its own user and database,
/// as `(program, args)` pairs run without a shell.
///
/// Creates the user, creates a database it owns, revokes public connect
/// rights, then sets the user's password from the secret layer.
pub fn bootstrap_commands(vars: &ConfigVars) -> Result<Vec<(&'static str, Vec<String>)>, CoreError> {
    let socket_dir = var(vars, keys::POSTGRES_SOCKET_DIR)?;
    let port = var(vars, keys::POSTGRES_PORT)?;
    let user = var(vars, keys::POSTGRES_USER)?;
    let database = var(vars, keys::POSTGRES_DATABASE)?;
    let password = var(vars, keys::POSTGRES_PASSWORD)?;

    let s = |v: &str| v.to_owned();
    Ok(vec![
        (
            "createuser",
            vec![s("-D"), s("-R"), s("-S"), s("-h"), socket_dir, s("-p"), port, user.clone()],
        ),
        ("createdb", vec![s("-O"), user.clone(), database.clone()]),
        (
            "psql",
            vec![
                s("-d"),
                database.clone(),
                s("-c"),
                format!(
                    "REVOKE CONNECT ON DATABASE {} FROM PUBLIC;",
                    sql_identifier(&database)
                ),
            ],
        ),
        (
            "psql",
            vec![
                s("-d"),
                database,
                s("-c"),
                // SQL literal: embedded quotes are doubled.
                format!(
                    "ALTER USER {} ENCRYPTED PASSWORD '{}'",
                    sql_identifier(&user),
                    password.replace('\'', "''")
                ),
            ],
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chord_store::{static_template, ChordLayout, SecretGenerator};

    fn vars() -> ConfigVars {
        let mut vars = static_template(&ChordLayout::default(), &"search".into());
        vars.extend(SecretGenerator::seeded(9).secret_record());
        vars
    }

    #[test]
    fn bootstrap_sequence() {
        let vars = vars();
        let commands = bootstrap_commands(&vars).unwrap();
        let programs: Vec<_> = commands.iter().map(|(p, _)| *p).collect();
        assert_eq!(programs, ["createuser", "createdb", "psql", "psql"]);

        assert_eq!(
            commands[0].1,
            ["-D", "-R", "-S", "-h", "/chord/tmp/postgresql", "-p", "5432", "search_acct"]
        );
        assert_eq!(commands[1].1, ["-O", "search_acct", "search_db"]);
        assert_eq!(
            commands[2].1[3],
            r#"REVOKE CONNECT ON DATABASE "search_db" FROM PUBLIC;"#
        );
        let password = &vars[keys::POSTGRES_PASSWORD];
        assert_eq!(
            commands[3].1[3],
            format!(r#"ALTER USER "search_acct" ENCRYPTED PASSWORD '{password}'"#)
        );
    }

    #[test]
    fn quote_in_password_is_doubled() {
        let mut vars = vars();
        vars.insert(keys::POSTGRES_PASSWORD.to_owned(), "a'b".to_owned());
        let commands = bootstrap_commands(&vars).unwrap();
        assert!(commands[3].1[3].ends_with("PASSWORD 'a''b'"));
    }

    #[test]
    fn identifiers_keep_hyphens_and_case() {
        let mut vars = static_template(&ChordLayout::default(), &"Drop-Box".into());
        vars.extend(SecretGenerator::seeded(9).secret_record());
        let commands = bootstrap_commands(&vars).unwrap();
        assert_eq!(commands[0].1[7], "Drop-Box_acct");
        assert_eq!(commands[1].1, ["-O", "Drop-Box_acct", "Drop-Box_db"]);
        assert_eq!(
            commands[2].1[3],
            r#"REVOKE CONNECT ON DATABASE "Drop-Box_db" FROM PUBLIC;"#
        );
        assert!(commands[3].1[3].starts_with(r#"ALTER USER "Drop-Box_acct" ENCRYPTED"#));
    }

    #[test]
    fn quote_in_identifier_is_doubled() {
        assert_eq!(sql_identifier(r#"a"b"#), r#""a""b""#);
    }

    #[test]
    fn missing_key_is_reported() {
        let mut vars = vars();
        vars.remove(keys::POSTGRES_USER);
        assert!(bootstrap_commands(&vars).is_err());
    }
}
