//! Relaychat relay binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default 127.0.0.1:1234
//! relaychat-relay
//!
//! # Listen on all interfaces, hide the join notice from the newcomer
//! relaychat-relay --bind 0.0.0.0:1234 --join-notice exclude-sender
//! ```

use clap::{Parser, ValueEnum};
use relaychat_server::{
    BroadcastPolicy, DEFAULT_BACKLOG, DEFAULT_BIND_ADDRESS, DriverConfig, Server,
    ServerRuntimeConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Relaychat relay server
#[derive(Parser, Debug)]
#[command(name = "relaychat-relay")]
#[command(about = "Encrypted line-based chat relay")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
    bind: String,

    /// Accept backlog
    #[arg(long, default_value_t = DEFAULT_BACKLOG)]
    backlog: u32,

    /// Who sees the "(name entered...)" notice
    #[arg(long, value_enum, default_value_t = JoinNotice::IncludeSender)]
    join_notice: JoinNotice,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum JoinNotice {
    /// Everyone, the newcomer included
    IncludeSender,
    /// Everyone but the newcomer
    ExcludeSender,
}

impl From<JoinNotice> for BroadcastPolicy {
    fn from(value: JoinNotice) -> Self {
        match value {
            JoinNotice::IncludeSender => Self::IncludeSender,
            JoinNotice::ExcludeSender => Self::ExcludeSender,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Relaychat relay starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        backlog: args.backlog,
        driver: DriverConfig { join_notice: args.join_notice.into() },
    };

    let server = Server::bind(config)?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested, relay stopping");
        },
    }

    Ok(())
}
