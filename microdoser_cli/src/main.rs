mod app;
mod cli;
mod error_fmt;
mod logging;

use app::{App, ClockOverride};
use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use eyre::Result;

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = microdoser_config::load_file(&cli.config)?;
    logging::init(cli.json, &cli.log_level, &cfg.logging);
    tracing::debug!(config = %cli.config.display(), pumps = cfg.pumps.len(), "config loaded");

    let clock = cli
        .at
        .as_deref()
        .map(|at| ClockOverride::parse(at, cli.day.unwrap_or(1)))
        .transpose()?;
    let app = App::build(&cfg, clock, cli.json)?;

    match cli.cmd {
        Commands::Run { passes } => {
            let shutdown = app::install_ctrlc()?;
            app.run(passes, &shutdown)
        }
        Commands::Check => app.check(),
        Commands::Prime { pump } => {
            app.select(pump.as_deref());
            app.prime()
        }
        Commands::Calibrate { pump } => {
            app.select(pump.as_deref());
            app.calibrate()
        }
        Commands::ApplyCalibration { pump, measured } => {
            app.select(pump.as_deref());
            app.apply_calibration(measured)
        }
        Commands::Status => app.status(),
        Commands::SelfCheck => app.self_check(),
    }
}
