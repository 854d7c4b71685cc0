//! Relaychat endpoint binary.
//!
//! Reads chat lines from stdin and prints what the relay sends back.
//!
//! # Usage
//!
//! ```bash
//! relaychat --port 1234 --name Alice
//! relaychat --host 10.0.0.5 --port 1234
//! ```

use std::io::BufRead;

use clap::Parser;
use relaychat_client::{DEFAULT_HOST, Endpoint, EndpointConfig};
use tokio::{io::AsyncWriteExt, sync::mpsc};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Lines buffered between the console and the relay loop.
const LINE_BUFFER: usize = 32;

/// Relaychat endpoint
#[derive(Parser, Debug)]
#[command(name = "relaychat")]
#[command(about = "Encrypted line-based chat client")]
#[command(version)]
struct Args {
    /// Relay host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Relay port
    #[arg(short, long)]
    port: u16,

    /// Display name (default "Anon - <unix-millis>")
    #[arg(short, long)]
    name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout carries the chat itself
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = EndpointConfig::new(args.port);
    config.host = args.host;
    if let Some(name) = args.name {
        config.display_name = name;
    }

    tracing::info!("Connecting to {}:{} as '{}'", config.host, config.port, config.display_name);

    let endpoint =
        Endpoint::connect((config.host.as_str(), config.port), config.display_name).await?;

    let (input_tx, input_rx) = mpsc::channel(LINE_BUFFER);
    let (output_tx, mut output_rx) = mpsc::channel::<String>(LINE_BUFFER);

    // Blocking stdin on its own thread so a pending read never holds up exit
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if input_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let session = tokio::spawn(endpoint.run(input_rx, output_tx));

    let mut stdout = tokio::io::stdout();
    while let Some(line) = output_rx.recv().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    session.await??;

    Ok(())
}
