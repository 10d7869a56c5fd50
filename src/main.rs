use std::process::ExitCode;

use clap::Parser;

use rom_organizer::actions::{emit_summary, run};
use rom_organizer::cli::Cli;
use rom_organizer::config::Config;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::try_from(cli)?;
    let report = run(&config)?;

    emit_summary(&report, config.verbose);
    if config.print_summary {
        let serialized = serde_json::to_string_pretty(&report)?;
        println!("{}", serialized);
    }

    Ok(if report.summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
