use clap::Parser;
use server::network::Server;
use std::time::Duration;

/// Authoritative synchronization server for shared stopwatches and countdowns
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick interval in milliseconds
    #[clap(short, long, default_value = "100")]
    tick_ms: u64,
    /// Maximum number of concurrent sessions
    #[clap(short, long, default_value = "64")]
    max_sessions: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let mut server = Server::new(
        &address,
        Duration::from_millis(args.tick_ms),
        args.max_sessions,
    )
    .await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
            Ok(())
        }
    }
}
