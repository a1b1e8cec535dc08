use super::{json_pretty, GlobalOpts, Session, EXIT_SUCCESS};
use chord_core::{CoreError, JobKind, SetupJob};

pub fn run(opts: &GlobalOpts) -> Result<u8, CoreError> {
    let session = Session::open(opts, JobKind::Build)?;
    let job = SetupJob::from_config(&session.config, Session::runtime(opts)?);
    let written = job.run(&session.services)?;

    if opts.json {
        let payload = serde_json::json!({
            "services": session.services.iter().map(|s| s.artifact()).collect::<Vec<_>>(),
            "written": written,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for path in &written {
            println!("wrote {}", path.display());
        }
        println!("set up {} service(s)", session.services.len());
    }
    Ok(EXIT_SUCCESS)
}
