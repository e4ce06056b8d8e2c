//! Chorus relay binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (9001) on every local address
//! chorus-server
//!
//! # Small room on a chosen port, refusing quietly when full
//! chorus-server 7000 --capacity 4 --no-refusal
//! ```

use std::{net::IpAddr, process::ExitCode, time::Duration};

use chorus_server::{
    DEFAULT_BACKLOG, DEFAULT_BUFFER_SIZE, DEFAULT_CAPACITY, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_OUTBOX_LIMIT, DEFAULT_PORT, DEFAULT_REFUSAL, DEFAULT_WELCOME, EventLoop, IdlePolicy,
    RelayConfig, RelayError, SendFailurePolicy, install_signal_handler,
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// What to do with a peer that cannot be written to
#[derive(Debug, Clone, Copy, ValueEnum)]
enum SendFailure {
    /// Close it and free its slot
    Disconnect,
    /// Log and keep it
    Skip,
}

/// Chorus fan-out relay
#[derive(Parser, Debug)]
#[command(name = "chorus-server")]
#[command(about = "TCP relay that fans every message out to all other peers")]
#[command(version)]
struct Args {
    /// Port to listen on (defaults to 9001)
    port: Option<u16>,

    /// Bind a single address instead of every local address
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Client slots, the listener's included
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Bytes per read; one read is relayed as one message
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Pending-connection queue depth
    #[arg(long, default_value_t = DEFAULT_BACKLOG)]
    backlog: i32,

    /// Seconds without activity before the idle policy applies (0 disables)
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs())]
    idle_timeout_secs: u64,

    /// Exit with an error after the idle timeout instead of waiting on
    #[arg(long)]
    exit_on_idle: bool,

    /// Handling of peers whose send fails
    #[arg(long, value_enum, default_value_t = SendFailure::Disconnect)]
    send_failure: SendFailure,

    /// Bytes queued for a slow peer before it counts as failed
    #[arg(long, default_value_t = DEFAULT_OUTBOX_LIMIT)]
    outbox_limit: usize,

    /// Text sent to every admitted peer
    #[arg(long)]
    welcome: Option<String>,

    /// Send no welcome text
    #[arg(long, conflicts_with = "welcome")]
    no_welcome: bool,

    /// Text sent to peers turned away when the relay is full
    #[arg(long)]
    refusal: Option<String>,

    /// Close refused peers without sending anything
    #[arg(long, conflicts_with = "refusal")]
    no_refusal: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        let port = self.port.unwrap_or_else(|| {
            tracing::warn!("no port given, defaulting to {DEFAULT_PORT}");
            DEFAULT_PORT
        });

        RelayConfig {
            bind_address: self.bind,
            port,
            capacity: self.capacity,
            buffer_size: self.buffer_size,
            backlog: self.backlog,
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
            idle_policy: if self.exit_on_idle { IdlePolicy::Exit } else { IdlePolicy::KeepWaiting },
            send_failure: match self.send_failure {
                SendFailure::Disconnect => SendFailurePolicy::Disconnect,
                SendFailure::Skip => SendFailurePolicy::Skip,
            },
            outbox_limit: self.outbox_limit,
            welcome: (!self.no_welcome)
                .then(|| self.welcome.unwrap_or_else(|| DEFAULT_WELCOME.to_string())),
            refusal: (!self.no_refusal)
                .then(|| self.refusal.unwrap_or_else(|| DEFAULT_REFUSAL.to_string())),
            ..RelayConfig::default()
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match run(args) {
        Ok(()) => {
            tracing::info!("relay closed peacefully");
            ExitCode::SUCCESS
        },
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            ExitCode::FAILURE
        },
    }
}

fn run(args: Args) -> Result<(), RelayError> {
    let relay = EventLoop::bind(args.into_config())?;
    tracing::info!("Chorus relay listening on {}", relay.local_addr()?);

    // The signal thread parks in `sigwait` for the life of the process.
    let _signals = install_signal_handler(relay.shutdown_handle())?;

    relay.run()
}
