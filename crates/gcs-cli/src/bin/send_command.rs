//! CLI tool to send one command to vehicles.

use std::net::IpAddr;

use clap::{Parser, Subcommand};
use gcs_core::models::{Command, Vec3};
use gcs_core::rules::CommandLimits;
use gcs_link::{CommandChannel, Uplink, DEFAULT_COMMAND_PORT, DEFAULT_DATA_PORT};

/// Send a command datagram to one or more vehicles
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Target vehicle addresses, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    ip: Vec<IpAddr>,

    /// Vehicle command port
    #[arg(long, default_value_t = DEFAULT_COMMAND_PORT)]
    port: u16,

    #[command(subcommand)]
    verb: Verb,
}

#[derive(Subcommand, Debug)]
enum Verb {
    Takeoff {
        #[arg(long)]
        alt: f64,
    },
    Land,
    Stop,
    Flytopoint {
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
        #[arg(long, allow_hyphen_values = true)]
        z: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let command = match args.verb {
        Verb::Takeoff { alt } => Command::takeoff(alt),
        Verb::Land => Command::land(),
        Verb::Stop => Command::stop(),
        Verb::Flytopoint { x, y, z } => Command::fly_to(Vec3::new(x, y, z)),
    };

    let channel = CommandChannel::bind(args.port, DEFAULT_DATA_PORT, CommandLimits::default()).await?;
    channel.send_command(&args.ip, &command).await?;
    println!("Sent {} to {:?}", command.verb(), args.ip);
    Ok(())
}
