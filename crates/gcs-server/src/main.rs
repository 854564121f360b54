//! GCS Server - fleet ground control over UDP

use std::sync::Arc;

use anyhow::{Context, Result};
use gcs_link::CommandChannel;
use gcs_server::console::{parse_line, Console};
use gcs_server::loops::receive_loop::run_receive_loop;
use gcs_server::{Config, Coordinator, FleetState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("gcs_server=debug".parse()?)
            .add_directive("gcs_link=info".parse()?))
        .init();

    tracing::info!("Starting GCS Server...");

    let config = Config::from_env();
    let fleet = Arc::new(FleetState::new());

    let telemetry_addr = config.telemetry_bind();
    let telemetry_socket = match UdpSocket::bind(telemetry_addr).await {
        Ok(socket) => Arc::new(socket),
        Err(err) => {
            tracing::error!("Cannot bind telemetry socket on {}: {}", telemetry_addr, err);
            return Err(err).with_context(|| format!("binding telemetry socket {telemetry_addr}"));
        }
    };
    let channel = CommandChannel::bind(
        config.command_port,
        config.data_port,
        config.maneuvers.limits.clone(),
    )
    .await
    .context("binding command socket")?;

    // Start background loops
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let telemetry_task = tokio::spawn(run_receive_loop(
        "telemetry",
        fleet.clone(),
        telemetry_socket,
        shutdown_tx.subscribe(),
    ));
    let reply_task = tokio::spawn(run_receive_loop(
        "reply",
        fleet.clone(),
        channel.socket(),
        shutdown_tx.subscribe(),
    ));

    let coordinator = Arc::new(Coordinator::new(channel, fleet, config.maneuvers.clone()));
    let mut console = Console::new(coordinator, &config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tracing::info!("Console ready, type a command (e.g. `search`, `fleet`)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(command) => match console.execute(command).await {
                        Ok(outcome) => println!("{}", outcome.trim_end()),
                        Err(err) => println!("error: {err:#}"),
                    },
                    Err(err) => println!("{}", err.render()),
                }
            }
        }
    }

    let _ = shutdown_tx.send(());
    let _ = tokio::join!(telemetry_task, reply_task);
    tracing::info!("GCS Server stopped");
    Ok(())
}
