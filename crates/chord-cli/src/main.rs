mod commands;

use chord_core::{CoreError, Phase};
use clap::{Parser, Subcommand};
use commands::{exit_code, GlobalOpts};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "chord-container",
    version,
    about = "Build-time setup and service lifecycle for CHORD containers"
)]
struct Cli {
    /// Container root every other path derives from (overrides the config file).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Tool config file (TOML). Falls back to $CHORD_CONTAINER_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where commands run: "host", or "mock" to only record them.
    #[arg(long, default_value = "host", global = true)]
    runtime: String,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Image build: install dependencies and write generated configuration.
    Setup,
    /// Prepare directories, environment files and run pre-start commands.
    PreStart,
    /// Launch every daemon service in the background.
    Start,
    /// Run post-start commands.
    PostStart,
    /// Stop every daemon service and wait for it to exit.
    Stop,
    /// Run post-stop commands.
    PostStop,
    /// pre-start, start and post-start in one invocation.
    Up,
    /// stop and post-stop in one invocation.
    Down,
    /// Print the resolved configuration of one service.
    Config {
        /// Service artifact.
        artifact: String,
        /// Print secret values instead of masking them.
        #[arg(long, default_value_t = false)]
        show_secrets: bool,
    },
}

const USAGE: &str = "usage: chord-container <COMMAND>; run inside a CHORD container \
                     (or image build) so SINGULARITY_* or CHORD_DOCKER_BUILD is set";

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe") || msg.contains("failed printing to stdout") {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CHORD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let opts = GlobalOpts {
        root: cli.root,
        config: cli.config,
        runtime: cli.runtime,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Setup => commands::setup::run(&opts),
        Commands::PreStart => commands::lifecycle::run(&opts, &[Phase::PreStart]),
        Commands::Start => commands::lifecycle::run(&opts, &[Phase::Start]),
        Commands::PostStart => commands::lifecycle::run(&opts, &[Phase::PostStart]),
        Commands::Stop => commands::lifecycle::run(&opts, &[Phase::Stop]),
        Commands::PostStop => commands::lifecycle::run(&opts, &[Phase::PostStop]),
        Commands::Up => commands::lifecycle::run(&opts, &Phase::UP),
        Commands::Down => commands::lifecycle::run(&opts, &Phase::DOWN),
        Commands::Config {
            artifact,
            show_secrets,
        } => commands::config::run(&opts, &artifact, show_secrets),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            if matches!(err, CoreError::OutsideContainer { .. }) {
                eprintln!("{USAGE}");
            }
            ExitCode::from(exit_code(&err))
        }
    }
}
