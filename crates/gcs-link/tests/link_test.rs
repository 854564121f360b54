//! Loopback tests for the command channel, chunked transfers and discovery.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use gcs_core::models::Command;
use gcs_core::rules::{CommandError, CommandLimits};
use gcs_link::{
    decode_datagram, discover, encode_control, ArrayBlob, Chunk, CommandChannel, ControlMessage,
    Inbound, LinkError, Reassembler, Uplink,
};
use tokio::net::UdpSocket;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

async fn vehicle_socket() -> UdpSocket {
    UdpSocket::bind(SocketAddr::new(LOCALHOST, 0)).await.unwrap()
}

#[tokio::test]
async fn valid_commands_reach_the_vehicle() {
    let vehicle = vehicle_socket().await;
    let port = vehicle.local_addr().unwrap().port();
    let channel = CommandChannel::bind(port, port, CommandLimits::default())
        .await
        .unwrap();

    channel
        .send_command(&[LOCALHOST], &Command::takeoff(20.0))
        .await
        .unwrap();

    let mut buf = [0u8; 2048];
    let (len, _) = tokio::time::timeout(Duration::from_secs(1), vehicle.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        decode_datagram(&buf[..len]).unwrap(),
        Inbound::Command(Command::takeoff(20.0))
    );
}

#[tokio::test]
async fn out_of_range_commands_never_leave_the_host() {
    let vehicle = vehicle_socket().await;
    let port = vehicle.local_addr().unwrap().port();
    let channel = CommandChannel::bind(port, port, CommandLimits::default())
        .await
        .unwrap();

    let err = channel
        .send_command(&[LOCALHOST], &Command::takeoff(150.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LinkError::Rejected(CommandError::OutOfRange { .. })
    ));

    let err = channel.send_command(&[], &Command::land()).await.unwrap_err();
    assert!(matches!(err, LinkError::Rejected(CommandError::NoTargets)));

    let mut buf = [0u8; 2048];
    let received =
        tokio::time::timeout(Duration::from_millis(200), vehicle.recv_from(&mut buf)).await;
    assert!(received.is_err(), "nothing should have been sent");
}

#[tokio::test]
async fn blobs_arrive_as_one_transfer() {
    let vehicle = vehicle_socket().await;
    let port = vehicle.local_addr().unwrap().port();
    let channel = CommandChannel::bind(port, port, CommandLimits::default())
        .await
        .unwrap();

    let rows: Vec<Vec<f64>> = (0..200)
        .map(|i| vec![114.0 + i as f64 * 1e-4, 30.5, 250.0])
        .collect();
    let blob = ArrayBlob::from_rows("path", &rows).unwrap();
    let transfer_id = channel.send_blob(&[LOCALHOST], &blob).await.unwrap();

    let mut rx = Reassembler::default();
    let mut buf = [0u8; 2048];
    let payload = loop {
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), vehicle.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let chunk = Chunk::decode(&buf[..len]).unwrap();
        assert_eq!(chunk.transfer_id, transfer_id);
        if let Some(payload) = rx.ingest(chunk) {
            break payload;
        }
    };

    assert_eq!(ArrayBlob::decode(&payload).unwrap().rows(), rows);
}

#[tokio::test]
async fn discovery_coalesces_duplicate_replies() {
    let vehicle = vehicle_socket().await;
    let target = vehicle.local_addr().unwrap();

    let responder = tokio::spawn(async move {
        let mut buf = [0u8; 256];
        let (len, from) = vehicle.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"message ping");
        let reply = encode_control(ControlMessage::MessageReceived);
        vehicle.send_to(&reply, from).await.unwrap();
        vehicle.send_to(&reply, from).await.unwrap();
        vehicle.send_to(b"noise", from).await.unwrap();
    });

    let found = discover(target, Duration::from_millis(300)).await.unwrap();
    responder.await.unwrap();
    assert_eq!(found, vec![LOCALHOST]);
}

#[tokio::test]
async fn discovery_with_no_vehicles_is_empty() {
    // Bound but silent.
    let silent = vehicle_socket().await;
    let found = discover(silent.local_addr().unwrap(), Duration::from_millis(100))
        .await
        .unwrap();
    assert!(found.is_empty());
}
