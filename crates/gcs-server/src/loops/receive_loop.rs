//! Inbound datagram loop.
//!
//! Runs on the telemetry socket and on the command socket (where vehicles
//! send their acknowledgements), folding everything into fleet state.

use std::net::SocketAddr;
use std::sync::Arc;

use gcs_link::{decode_datagram, ControlMessage, Inbound};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use crate::state::FleetState;

const RECV_BUFFER: usize = 2048;

pub async fn run_receive_loop(
    label: &'static str,
    fleet: Arc<FleetState>,
    socket: Arc<UdpSocket>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; RECV_BUFFER];
    tracing::info!(
        "{} loop listening on {:?}",
        label,
        socket.local_addr().ok()
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("{} loop shutting down", label);
                break;
            }
            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((len, from)) => handle_datagram(&fleet, from, &buf[..len]),
                    Err(err) => tracing::warn!("{} loop receive failed: {}", label, err),
                }
            }
        }
    }
}

/// Apply one datagram to fleet state. Malformed input is logged and dropped.
pub fn handle_datagram(fleet: &FleetState, from: SocketAddr, datagram: &[u8]) {
    let ip = from.ip();
    match decode_datagram(datagram) {
        Ok(Inbound::Telemetry(telemetry)) => fleet.update_telemetry(ip, telemetry),
        Ok(Inbound::Control(ControlMessage::WaypointReached)) => fleet.mark_reached(ip),
        Ok(Inbound::Control(ControlMessage::CommandReceived)) => {
            fleet.record_ack(ip);
            tracing::debug!(%ip, "Command acknowledged");
        }
        Ok(Inbound::Control(other)) => {
            tracing::debug!(%ip, ?other, "Ignoring control message");
        }
        Ok(Inbound::Command(command)) => {
            tracing::warn!(%ip, verb = command.verb(), "Unexpected command from vehicle");
        }
        Err(err) => tracing::warn!(%from, "Dropping malformed datagram: {}", err),
    }
}
