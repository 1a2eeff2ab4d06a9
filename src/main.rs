use clap::Parser;
use sigtrader::cli::{run, Cli};
use sigtrader::logging::{init_logging, LogFormat};

fn main() -> std::process::ExitCode {
    init_logging(LogFormat::from_env());
    run(Cli::parse())
}
