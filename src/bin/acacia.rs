// src/bin/acacia.rs

use std::process::ExitCode;

use clap::Parser;

use acacia::cli::{Cli, build_config};
use acacia::compiler::compile_file;
use acacia::errors::render_to_stderr;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::from(2);
        }
    };

    if config.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("acacia=debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let output = match compile_file(&cli.file, &config) {
        Ok(output) => output,
        Err(failure) => {
            let report = failure.into_report();
            render_to_stderr(report.as_ref());
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = output.write(&cli.out, &config.function_folder, config.override_old) {
        eprintln!("Acacia: error: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
