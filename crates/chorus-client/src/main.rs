//! Chorus client binary.
//!
//! Relayed messages go to stdout; logs go to stderr.

use std::{
    io::{self, BufReader},
    process::ExitCode,
};

use chorus_client::{ClientError, DEFAULT_HOST, DEFAULT_PORT, Session, connect};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chorus relay client
#[derive(Parser, Debug)]
#[command(name = "chorus-client")]
#[command(about = "Send stdin lines to a Chorus relay and print what others say")]
#[command(version)]
struct Args {
    /// Relay port
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Relay host name or address
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Name shown before each of your lines
    #[arg(short, long)]
    name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "session failed");
            ExitCode::FAILURE
        },
    }
}

fn run(args: Args) -> Result<(), ClientError> {
    let stream = connect(&args.host, args.port)?;
    Session::new(stream, args.name).run(BufReader::new(io::stdin()), io::stdout())
}
