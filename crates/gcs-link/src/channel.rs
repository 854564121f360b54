//! UDP command channel to the fleet.
//!
//! Commands and blobs are fire-and-forget: vehicles acknowledge on their
//! own and the acks are consumed by whoever listens on the reply socket.

use std::collections::BTreeSet;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use gcs_core::models::Command;
use gcs_core::rules::{CommandError, CommandLimits};
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::blob::{ArrayBlob, BlobError};
use crate::transport::{fragment, next_transfer_id};
use crate::wire::{decode_datagram, encode_command, encode_control, ControlMessage, Inbound, WireError};

pub const DEFAULT_COMMAND_PORT: u16 = 9999;
pub const DEFAULT_DATA_PORT: u16 = 10000;
pub const DEFAULT_TELEMETRY_PORT: u16 = 10001;
pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_secs(1);

const RECV_BUFFER: usize = 2048;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("command rejected: {0}")]
    Rejected(#[from] CommandError),
}

/// Outbound surface used by maneuvers.
pub trait Uplink: Send + Sync {
    /// Validate `command` and send it once to every target.
    fn send_command(
        &self,
        targets: &[IpAddr],
        command: &Command,
    ) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Send `blob` to every target as one chunked transfer and return its id.
    fn send_blob(
        &self,
        targets: &[IpAddr],
        blob: &ArrayBlob,
    ) -> impl Future<Output = Result<u32, LinkError>> + Send;
}

/// Sends every chunk of a payload to each target's data port.
#[derive(Debug, Clone)]
pub struct PacketSender {
    socket: Arc<UdpSocket>,
    port: u16,
}

impl PacketSender {
    pub fn new(socket: Arc<UdpSocket>, port: u16) -> Self {
        Self { socket, port }
    }

    pub async fn send(&self, targets: &[IpAddr], payload: &[u8]) -> Result<u32, LinkError> {
        let transfer_id = next_transfer_id();
        let chunks = fragment(transfer_id, payload);
        for ip in targets {
            let addr = SocketAddr::new(*ip, self.port);
            for chunk in &chunks {
                self.socket.send_to(&chunk.encode(), addr).await?;
            }
            tracing::debug!(%addr, transfer_id, chunks = chunks.len(), "Transfer sent");
        }
        Ok(transfer_id)
    }
}

pub struct CommandChannel {
    socket: Arc<UdpSocket>,
    command_port: u16,
    packets: PacketSender,
    limits: CommandLimits,
}

impl CommandChannel {
    /// Bind an ephemeral broadcast-capable socket.
    pub async fn bind(
        command_port: u16,
        data_port: u16,
        limits: CommandLimits,
    ) -> Result<Self, LinkError> {
        let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await?;
        socket.set_broadcast(true)?;
        let socket = Arc::new(socket);
        Ok(Self {
            packets: PacketSender::new(socket.clone(), data_port),
            socket,
            command_port,
            limits,
        })
    }

    pub fn limits(&self) -> &CommandLimits {
        &self.limits
    }

    /// The sending socket. Vehicles answer commands here.
    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.socket.local_addr()?)
    }
}

impl Uplink for CommandChannel {
    async fn send_command(&self, targets: &[IpAddr], command: &Command) -> Result<(), LinkError> {
        if targets.is_empty() {
            return Err(CommandError::NoTargets.into());
        }
        command.validate(&self.limits)?;

        let bytes = encode_command(command)?;
        for ip in targets {
            let addr = SocketAddr::new(*ip, self.command_port);
            self.socket.send_to(&bytes, addr).await?;
            tracing::info!(%addr, verb = command.verb(), "Command sent");
        }
        Ok(())
    }

    async fn send_blob(&self, targets: &[IpAddr], blob: &ArrayBlob) -> Result<u32, LinkError> {
        if targets.is_empty() {
            return Err(CommandError::NoTargets.into());
        }
        let payload = blob.encode()?;
        self.packets.send(targets, &payload).await
    }
}

/// Probe `target` (usually a broadcast address) and collect the vehicles
/// that answer within `window`. Returns distinct addresses in sorted order.
pub async fn discover(target: SocketAddr, window: Duration) -> Result<Vec<IpAddr>, LinkError> {
    let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await?;
    socket.set_broadcast(true)?;
    socket
        .send_to(&encode_control(ControlMessage::Ping), target)
        .await?;
    tracing::debug!(%target, "Discovery probe sent");

    let deadline = tokio::time::Instant::now() + window;
    let mut found = BTreeSet::new();
    let mut buf = [0u8; RECV_BUFFER];
    loop {
        let (len, from) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(received) => received?,
            Err(_) => break,
        };
        match decode_datagram(&buf[..len]) {
            Ok(Inbound::Control(ControlMessage::MessageReceived)) => {
                if found.insert(from.ip()) {
                    tracing::info!(ip = %from.ip(), "Vehicle answered probe");
                }
            }
            Ok(other) => tracing::debug!(%from, ?other, "Ignoring datagram during discovery"),
            Err(err) => tracing::debug!(%from, error = %err, "Undecodable discovery reply"),
        }
    }

    Ok(found.into_iter().collect())
}
