//! CLI tool that runs a simulated vehicle.
//!
//! Answers discovery probes and commands on the command port, collects
//! chunked transfers on the data port and streams `state` telemetry to the
//! ground station.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use gcs_cli::sim::{SimEvent, SimVehicle};
use gcs_core::models::Vec3;
use gcs_link::{
    decode_datagram, encode_control, encode_telemetry, ArrayBlob, Chunk, ControlMessage, Inbound,
    Reassembler, DEFAULT_COMMAND_PORT, DEFAULT_DATA_PORT, DEFAULT_TELEMETRY_PORT,
};
use tokio::net::UdpSocket;
use tokio::time;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Simulated vehicle speaking the fleet protocol
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Ground station address receiving telemetry
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    gcs: IpAddr,

    /// Local address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    #[arg(long, default_value_t = DEFAULT_COMMAND_PORT)]
    command_port: u16,

    #[arg(long, default_value_t = DEFAULT_DATA_PORT)]
    data_port: u16,

    #[arg(long, default_value_t = DEFAULT_TELEMETRY_PORT)]
    telemetry_port: u16,

    /// Start position x
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    x: f64,

    /// Start position y
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    y: f64,

    /// Speed in m/s
    #[arg(long, default_value_t = 5.0)]
    speed: f64,

    /// Update rate in Hz
    #[arg(long, default_value_t = 5.0)]
    rate: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("sim_vehicle=debug".parse()?))
        .init();

    let args = Args::parse();
    let command_socket = UdpSocket::bind(SocketAddr::new(args.bind, args.command_port))
        .await
        .with_context(|| format!("binding command port {}", args.command_port))?;
    command_socket.set_broadcast(true)?;
    let data_socket = UdpSocket::bind(SocketAddr::new(args.bind, args.data_port))
        .await
        .with_context(|| format!("binding data port {}", args.data_port))?;
    let gcs_addr = SocketAddr::new(args.gcs, args.telemetry_port);

    let mut vehicle = SimVehicle::new(Vec3::new(args.x, args.y, 0.0), args.speed);
    let mut reassembler = Reassembler::default();
    let period = Duration::from_secs_f64(1.0 / args.rate.max(0.1));
    let mut ticker = time::interval(period);
    let mut cmd_buf = vec![0u8; 2048];
    let mut data_buf = vec![0u8; 2048];

    tracing::info!(%gcs_addr, "Simulated vehicle up at ({}, {})", args.x, args.y);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Simulated vehicle shutting down");
                break;
            }
            received = command_socket.recv_from(&mut cmd_buf) => {
                let (len, from) = received?;
                match decode_datagram(&cmd_buf[..len]) {
                    Ok(Inbound::Control(ControlMessage::Ping)) => {
                        command_socket
                            .send_to(&encode_control(ControlMessage::MessageReceived), from)
                            .await?;
                    }
                    Ok(Inbound::Command(command)) => {
                        tracing::info!(%from, verb = command.verb(), "Command received");
                        vehicle.apply(&command);
                        command_socket
                            .send_to(&encode_control(ControlMessage::CommandReceived), from)
                            .await?;
                    }
                    Ok(other) => tracing::debug!(%from, ?other, "Ignored"),
                    Err(err) => tracing::warn!(%from, "Bad datagram: {}", err),
                }
            }
            received = data_socket.recv_from(&mut data_buf) => {
                let (len, from) = received?;
                let chunk = match Chunk::decode(&data_buf[..len]) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::warn!(%from, "Bad chunk: {}", err);
                        continue;
                    }
                };
                let transfer_id = chunk.transfer_id;
                if let Some(payload) = reassembler.ingest(chunk) {
                    match ArrayBlob::decode(&payload) {
                        Ok(blob) => {
                            tracing::info!(transfer_id, tag = %blob.tag, shape = ?blob.shape, "Transfer complete");
                            vehicle.accept_blob(transfer_id, blob);
                        }
                        Err(err) => tracing::warn!(transfer_id, "Bad blob: {}", err),
                    }
                }
            }
            _ = ticker.tick() => {
                for event in vehicle.step(period.as_secs_f64(), Utc::now()) {
                    match event {
                        SimEvent::Reached(point) => {
                            tracing::info!(?point, "Waypoint reached");
                            command_socket
                                .send_to(&encode_control(ControlMessage::WaypointReached), gcs_addr)
                                .await?;
                        }
                        SimEvent::Landed => tracing::info!("Landed"),
                        SimEvent::MissionStarted { waypoints } => {
                            tracing::info!(waypoints, "Mission started");
                        }
                    }
                }
                command_socket
                    .send_to(&encode_telemetry(&vehicle.telemetry()), gcs_addr)
                    .await?;
            }
        }
    }
    Ok(())
}
