use clap::Parser;

use covlens_core::error::CovlensError;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "covlens",
    version,
    about = "Aggregate JVM test coverage into banded, per-package reports"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Map an error to a process exit code.
///
///   0   — success
///   1   — general/unknown error
///   2   — configuration error
///   3   — path not found
///   4   — execution record could not be loaded
///   5   — render or write failure
///   130 — cancelled
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<CovlensError>() {
            return match e {
                CovlensError::Config(_) => 2,
                CovlensError::RecordLoad(_) => 4,
                CovlensError::Render(_) => 5,
                CovlensError::Cancelled => 130,
                CovlensError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => 3,
                CovlensError::ArtifactParse(_) | CovlensError::Io(_) => 1,
            };
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::NotFound {
                return 3;
            }
        }
    }
    1
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command, cli.quiet)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use covlens_core::error::{ConfigError, RecordLoadError, RenderError};

    fn wrapped(err: CovlensError) -> anyhow::Error {
        Err::<(), _>(err).context("Analysis failed").unwrap_err()
    }

    #[test]
    fn exit_code_config() {
        let err = wrapped(ConfigError::Invalid("threshold".into()).into());
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_path_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Err::<(), _>(io)
            .context("Cannot resolve path: /nope")
            .unwrap_err();
        assert_eq!(classify_exit_code(&err), 3);
    }

    #[test]
    fn exit_code_record_load() {
        let err = wrapped(RecordLoadError::InvalidHeader.into());
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_render() {
        let err = wrapped(RenderError::UnknownFormat("pdf".into()).into());
        assert_eq!(classify_exit_code(&err), 5);
    }

    #[test]
    fn exit_code_cancelled() {
        assert_eq!(classify_exit_code(&wrapped(CovlensError::Cancelled)), 130);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Something unexpected happened");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
