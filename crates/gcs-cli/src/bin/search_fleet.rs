//! CLI tool to find vehicles listening on the command port.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use gcs_link::{discover, DEFAULT_COMMAND_PORT};

/// Broadcast a discovery probe and list the vehicles that answer
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Probe destination (broadcast by default)
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::BROADCAST))]
    target: IpAddr,

    /// Vehicle command port
    #[arg(long, default_value_t = DEFAULT_COMMAND_PORT)]
    port: u16,

    /// Listen window in milliseconds
    #[arg(long, default_value_t = 1000)]
    window_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let target = SocketAddr::new(args.target, args.port);
    println!("Probing {} for {} ms...", target, args.window_ms);
    let found = discover(target, Duration::from_millis(args.window_ms)).await?;

    if found.is_empty() {
        println!("No vehicles answered");
    }
    for ip in &found {
        println!("  - {}:{}", ip, args.port);
    }
    Ok(())
}
