use crate::RuntimeError;
use chord_schema::ConfigVars;

/// Substitute `{KEY}` placeholders from `vars`.
///
/// `{{` and `}}` produce literal braces. Unknown keys and unbalanced braces
/// are errors rather than being passed through, so a typo in a manifest
/// never reaches a shell.
pub fn format_template(template: &str, vars: &ConfigVars) -> Result<String, RuntimeError> {
    let malformed = |reason| RuntimeError::MalformedTemplate {
        template: template.to_owned(),
        reason,
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => return Err(malformed("nested '{'")),
                        Some(ch) => name.push(ch),
                        None => return Err(malformed("unterminated '{'")),
                    }
                }
                if name.is_empty() {
                    return Err(malformed("empty placeholder"));
                }
                let value = vars
                    .get(&name)
                    .ok_or_else(|| RuntimeError::UnknownPlaceholder {
                        placeholder: name.clone(),
                        template: template.to_owned(),
                    })?;
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(malformed("single '}'")),
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> ConfigVars {
        let mut v = ConfigVars::new();
        v.insert("SERVICE_LOGS".to_owned(), "/chord/tmp/logs/search".to_owned());
        v.insert("SERVICE_ARTIFACT".to_owned(), "search".to_owned());
        v
    }

    #[test]
    fn substitutes_known_keys() {
        let out = format_template("{SERVICE_LOGS}/{SERVICE_ARTIFACT}.log", &vars()).unwrap();
        assert_eq!(out, "/chord/tmp/logs/search/search.log");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        assert_eq!(format_template("echo hi", &vars()).unwrap(), "echo hi");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let out = format_template("awk '{{print $1}}' {SERVICE_ARTIFACT}", &vars()).unwrap();
        assert_eq!(out, "awk '{print $1}' search");
    }

    #[test]
    fn unknown_key_is_an_error() {
        let err = format_template("{NOPE}", &vars()).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::UnknownPlaceholder { ref placeholder, .. } if placeholder == "NOPE"
        ));
        assert!(err.to_string().contains("{NOPE}"));
    }

    #[test]
    fn unbalanced_braces_are_errors() {
        assert!(format_template("{SERVICE_LOGS", &vars()).is_err());
        assert!(format_template("a } b", &vars()).is_err());
        assert!(format_template("{}", &vars()).is_err());
        assert!(format_template("{a{b}}", &vars()).is_err());
    }

    #[test]
    fn substituted_values_are_not_reexpanded() {
        let mut v = ConfigVars::new();
        v.insert("A".to_owned(), "{B}".to_owned());
        assert_eq!(format_template("{A}", &v).unwrap(), "{B}");
    }
}
