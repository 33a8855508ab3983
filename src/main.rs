use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use temporalpaint::cli::{self, CliArgs};
use temporalpaint::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    logger::init(if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    log::info!("replaying script {}", args.script.display());
    cli::run(args)
}
