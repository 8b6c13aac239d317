use std::process::ExitCode;

use clap::Parser;
use pmig::cli::{self, CliArgs};
use pmig::logger::{self, Level};

fn main() -> ExitCode {
    // Session log (overwrites previous session log)
    logger::init();

    let args = CliArgs::parse();
    if args.verbose
        && let Some(path) = logger::log_path()
    {
        println!("log: {}", path.display());
    }
    logger::write(Level::Info, &format!("pmig {} started", env!("CARGO_PKG_VERSION")));

    let code = cli::run(args);
    logger::write(Level::Info, "pmig finished");
    code
}
