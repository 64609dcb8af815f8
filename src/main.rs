// src/main.rs

use std::process::ExitCode;

use clap::Parser;

use taskle::errors::TaskleError;
use taskle::{cli, logging, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::CliArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    if args.mode != cli::Mode::Version {
        if let Err(err) = logging::init_logging(args.debug, args.log.as_ref()) {
            eprintln!("taskle: failed to initialise logging: {err}");
            return ExitCode::from(3);
        }
    }

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(err @ (TaskleError::Load(_) | TaskleError::Io(_))) => {
            tracing::error!(error = %err, "startup failed");
            eprintln!("taskle: {err}");
            ExitCode::from(1)
        }
        Err(err) => {
            tracing::error!(error = %err, "internal failure");
            eprintln!("taskle: {err}");
            ExitCode::from(3)
        }
    }
}
