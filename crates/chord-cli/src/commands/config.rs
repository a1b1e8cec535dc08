use super::{json_pretty, GlobalOpts, Session, EXIT_SUCCESS};
use chord_core::{ConfigResolver, CoreError, JobKind};
use chord_schema::{keys, ConfigVars};

const MASK: &str = "********";

/// Print the resolved config of one service. Like any runtime job, this
/// generates the service's secrets if they do not exist yet.
pub fn run(opts: &GlobalOpts, artifact: &str, show_secrets: bool) -> Result<u8, CoreError> {
    let session = Session::open(opts, JobKind::Runtime)?;
    let descriptor = session
        .services
        .iter()
        .find(|s| s.artifact() == artifact)
        .ok_or_else(|| CoreError::UnknownService(artifact.to_owned()))?;

    let resolver = ConfigResolver::for_layout(&session.config.layout())
        .with_required_shared_keys(session.config.shared.required_keys.clone());
    let mut vars = resolver.resolve(descriptor)?;
    if !show_secrets {
        mask_secrets(&mut vars);
    }

    if opts.json {
        println!("{}", json_pretty(&vars)?);
    } else {
        for (key, value) in &vars {
            println!("{key}={value}");
        }
    }
    Ok(EXIT_SUCCESS)
}

fn mask_secrets(vars: &mut ConfigVars) {
    for (key, value) in vars.iter_mut() {
        if keys::is_secret(key) {
            MASK.clone_into(value);
        }
    }
}
