use super::{json_pretty, GlobalOpts, Session, EXIT_FAILURE, EXIT_SUCCESS};
use chord_core::{fresh_database_requested, CoreError, JobKind, Orchestrator, Phase, PhaseReport, ServiceOutcome};
use chord_runtime::{check_database_prereqs, check_shell_prereqs, format_missing};
use tracing::warn;

/// Run `phases` for every service. Per-service failures are reported, not
/// turned into a failing exit status.
pub fn run(opts: &GlobalOpts, phases: &[Phase]) -> Result<u8, CoreError> {
    let session = Session::open(opts, JobKind::Runtime)?;
    let fresh = fresh_database_requested(|var| std::env::var(var).ok());

    if opts.runtime == "host" {
        let missing = check_shell_prereqs(&session.config.shell.interpreter);
        if !missing.is_empty() {
            eprintln!("error: {}", format_missing(&missing));
            return Ok(EXIT_FAILURE);
        }
        if fresh && phases.contains(&Phase::PreStart) {
            let missing = check_database_prereqs();
            if !missing.is_empty() {
                warn!("{}", format_missing(&missing));
            }
        }
    }

    let orchestrator = Orchestrator::from_config(&session.config, Session::runtime(opts)?)
        .with_fresh_database(fresh);
    let reports = orchestrator.run_phases(phases, &session.services)?;

    if opts.json {
        let payload: Vec<_> = reports.iter().map(report_json).collect();
        println!("{}", json_pretty(&payload)?);
    } else {
        for report in &reports {
            println!("{}", summary(report));
        }
    }
    Ok(EXIT_SUCCESS)
}

fn summary(report: &PhaseReport) -> String {
    let count = |f: fn(&ServiceOutcome) -> bool| report.outcomes.iter().filter(|(_, o)| f(o)).count();
    format!(
        "{}: {} succeeded, {} skipped, {} failed",
        report.phase,
        count(|o| *o == ServiceOutcome::Succeeded),
        count(|o| *o == ServiceOutcome::Skipped),
        report.failure_count()
    )
}

fn report_json(report: &PhaseReport) -> serde_json::Value {
    let services: Vec<_> = report
        .outcomes
        .iter()
        .map(|(artifact, outcome)| {
            let (status, messages) = match outcome {
                ServiceOutcome::Succeeded => ("succeeded", Vec::new()),
                ServiceOutcome::Skipped => ("skipped", Vec::new()),
                ServiceOutcome::Failed(msgs) => ("failed", msgs.clone()),
            };
            serde_json::json!({
                "artifact": artifact,
                "status": status,
                "messages": messages,
            })
        })
        .collect();
    serde_json::json!({
        "phase": report.phase.to_string(),
        "services": services,
    })
}
