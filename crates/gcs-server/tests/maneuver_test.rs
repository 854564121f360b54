//! Maneuver behavior against a recording uplink.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gcs_core::models::{
    Attitude, Command, CommandType, MissionPath, Telemetry, Vec3, VerticalAxis,
};
use gcs_link::{ArrayBlob, LinkError, Uplink};
use gcs_server::{Coordinator, FleetState, ManeuverConfig, ManeuverError, Signal};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Command(IpAddr, Command),
    Blob(IpAddr, ArrayBlob),
}

struct RecordingUplink {
    tx: mpsc::UnboundedSender<Sent>,
    next_transfer: AtomicU32,
}

impl RecordingUplink {
    fn new() -> (Self, mpsc::UnboundedReceiver<Sent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                next_transfer: AtomicU32::new(1),
            },
            rx,
        )
    }
}

impl Uplink for RecordingUplink {
    async fn send_command(&self, targets: &[IpAddr], command: &Command) -> Result<(), LinkError> {
        for ip in targets {
            let _ = self.tx.send(Sent::Command(*ip, command.clone()));
        }
        Ok(())
    }

    async fn send_blob(&self, targets: &[IpAddr], blob: &ArrayBlob) -> Result<u32, LinkError> {
        for ip in targets {
            let _ = self.tx.send(Sent::Blob(*ip, blob.clone()));
        }
        Ok(self.next_transfer.fetch_add(1, Ordering::SeqCst))
    }
}

fn vehicle(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
}

fn report(fleet: &FleetState, ip: IpAddr, position: Vec3) {
    fleet.update_telemetry(
        ip,
        Telemetry {
            position,
            attitude: Attitude::default(),
            battery_pct: 80.0,
        },
    );
}

fn fast_config() -> ManeuverConfig {
    ManeuverConfig {
        arrival_wait: Duration::from_millis(400),
        follow_period: Duration::from_millis(100),
        poll_tick: Duration::from_millis(20),
        ..ManeuverConfig::default()
    }
}

fn setup(config: ManeuverConfig) -> (
    Arc<Coordinator<RecordingUplink>>,
    Arc<FleetState>,
    mpsc::UnboundedReceiver<Sent>,
) {
    let (uplink, rx) = RecordingUplink::new();
    let fleet = Arc::new(FleetState::new());
    let coordinator = Arc::new(Coordinator::new(uplink, fleet.clone(), config));
    (coordinator, fleet, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Sent>) -> Vec<Sent> {
    let mut out = Vec::new();
    while let Ok(sent) = rx.try_recv() {
        out.push(sent);
    }
    out
}

fn square_path() -> MissionPath {
    MissionPath {
        waypoints: vec![
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::new(10.0, 10.0, 10.0),
        ],
        capture_times_s: vec![0.0, 5.0, 10.0],
    }
}

#[tokio::test]
async fn out_of_range_takeoff_sends_nothing() {
    let (coordinator, _fleet, mut rx) = setup(fast_config());
    let err = coordinator.takeoff(&[vehicle(2)], 150.0).await.unwrap_err();
    assert!(matches!(err, ManeuverError::Rejected(_)));
    assert!(drain(&mut rx).is_empty());

    coordinator.takeoff(&[vehicle(2)], 20.0).await.unwrap();
    assert_eq!(
        drain(&mut rx),
        vec![Sent::Command(vehicle(2), Command::takeoff(20.0))]
    );
}

#[tokio::test]
async fn mission_aborts_when_a_vehicle_never_arrives() {
    let (coordinator, fleet, mut rx) = setup(fast_config());
    let (a, b) = (vehicle(2), vehicle(3));
    report(&fleet, a, Vec3::new(50.0, 50.0, 0.0));
    report(&fleet, b, Vec3::new(60.0, 60.0, 0.0));

    let offsets = [Vec3::default(), Vec3::new(5.0, 0.0, 0.0)];
    let mover = {
        let fleet = fleet.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            // Only the first vehicle reaches its start point.
            report(&fleet, a, Vec3::new(0.05, 0.0, 10.0));
        })
    };

    let outcome = coordinator
        .run_mission(&[a, b], &square_path(), &offsets)
        .await
        .unwrap();
    mover.await.unwrap();

    assert!(!outcome.started());
    assert_eq!(outcome.confirmed, vec![a]);
    assert_eq!(outcome.unconfirmed, vec![b]);
    assert_eq!(
        drain(&mut rx),
        vec![
            Sent::Command(a, Command::fly_to(Vec3::new(0.0, 0.0, 10.0))),
            Sent::Command(b, Command::fly_to(Vec3::new(5.0, 0.0, 10.0))),
        ]
    );
}

#[tokio::test]
async fn arrival_counts_even_if_the_vehicle_drifts_off() {
    let (coordinator, fleet, mut rx) = setup(fast_config());
    let (a, b) = (vehicle(2), vehicle(3));
    let offsets = [Vec3::default(), Vec3::new(5.0, 0.0, 0.0)];

    let mover = {
        let fleet = fleet.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            report(&fleet, a, Vec3::new(0.05, 0.0, 10.0));
            tokio::time::sleep(Duration::from_millis(100)).await;
            // Hover jitter carries it back outside the threshold.
            report(&fleet, a, Vec3::new(0.3, 0.0, 10.0));
        })
    };

    let outcome = coordinator
        .run_mission(&[a, b], &square_path(), &offsets)
        .await
        .unwrap();
    mover.await.unwrap();

    assert!(!outcome.started());
    assert_eq!(outcome.confirmed, vec![a]);
    assert_eq!(outcome.unconfirmed, vec![b]);
    assert_eq!(drain(&mut rx).len(), 2);
}

#[tokio::test]
async fn staggered_arrivals_still_start_the_mission() {
    let (coordinator, fleet, mut rx) = setup(fast_config());
    let (a, b) = (vehicle(2), vehicle(3));
    let offsets = [Vec3::default(), Vec3::new(5.0, 0.0, 0.0)];

    let mover = {
        let fleet = fleet.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            report(&fleet, a, Vec3::new(0.0, 0.0, 10.0));
            tokio::time::sleep(Duration::from_millis(60)).await;
            report(&fleet, a, Vec3::new(1.0, 0.0, 10.0));
            tokio::time::sleep(Duration::from_millis(60)).await;
            report(&fleet, b, Vec3::new(5.1, 0.0, 10.0));
        })
    };

    let outcome = coordinator
        .run_mission(&[a, b], &square_path(), &offsets)
        .await
        .unwrap();
    mover.await.unwrap();

    assert!(outcome.started());
    assert_eq!(outcome.confirmed, vec![a, b]);
    assert!(outcome.unconfirmed.is_empty());
    assert_eq!(drain(&mut rx).len(), 8);
}

#[tokio::test]
async fn stale_position_at_target_does_not_confirm() {
    let (coordinator, fleet, mut rx) = setup(fast_config());
    let a = vehicle(2);
    // Already at the start point, but reported before the mission began.
    report(&fleet, a, Vec3::new(0.0, 0.0, 10.0));

    let outcome = coordinator
        .run_mission(&[a], &square_path(), &[])
        .await
        .unwrap();
    assert_eq!(outcome.unconfirmed, vec![a]);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn mission_starts_when_everyone_arrives() {
    let (coordinator, fleet, mut rx) = setup(fast_config());
    let (a, b) = (vehicle(2), vehicle(3));
    let offsets = [Vec3::default(), Vec3::new(0.0, 3.0, 0.0)];

    let mover = {
        let fleet = fleet.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            report(&fleet, a, Vec3::new(0.0, 0.1, 10.0));
            report(&fleet, b, Vec3::new(0.0, 3.0, 10.1));
        })
    };

    let before = Utc::now();
    let outcome = coordinator
        .run_mission(&[a, b], &square_path(), &offsets)
        .await
        .unwrap();
    mover.await.unwrap();

    assert!(outcome.started());
    assert_eq!(outcome.confirmed, vec![a, b]);
    let start = outcome.start_time.unwrap();
    assert!(start >= before + chrono::Duration::seconds(19));

    let sent = drain(&mut rx);
    // Two start points, then per vehicle: path blob, capture blob, flymission.
    assert_eq!(sent.len(), 8);

    let Sent::Blob(ip, path) = &sent[5] else {
        panic!("expected path blob, got {:?}", sent[5]);
    };
    assert_eq!(*ip, b);
    assert_eq!(path.tag, "path");
    assert_eq!(path.rows(), vec![vec![10.0, 3.0, 10.0], vec![10.0, 13.0, 10.0]]);

    let Sent::Blob(_, captures) = &sent[6] else {
        panic!("expected capture blob");
    };
    assert_eq!(captures.values, vec![5.0, 10.0]);

    let Sent::Command(ip, command) = &sent[7] else {
        panic!("expected flymission");
    };
    assert_eq!(*ip, b);
    match &command.kind {
        CommandType::FlyMission {
            waypoints,
            start_time,
            ..
        } => {
            assert_eq!(*waypoints, 2);
            assert_eq!(*start_time, start);
        }
        other => panic!("expected flymission, got {other:?}"),
    }
}

#[tokio::test]
async fn mission_rejects_large_offsets() {
    let (coordinator, _fleet, mut rx) = setup(fast_config());
    let err = coordinator
        .run_mission(&[vehicle(2)], &square_path(), &[Vec3::new(60.0, 0.0, 0.0)])
        .await
        .unwrap_err();
    assert!(matches!(err, ManeuverError::Rejected(_)));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn return_home_steps_wait_for_reached() {
    let (coordinator, fleet, mut rx) = setup(fast_config());
    let ip = vehicle(4);
    report(&fleet, ip, Vec3::new(0.0, 0.0, 0.0));
    report(&fleet, ip, Vec3::new(10.0, 5.0, 3.0));

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.return_home(ip, 20.0).await })
    };

    let mut sent = Vec::new();
    while sent.len() < 4 {
        let next = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("maneuver stalled")
            .unwrap();
        if let Sent::Command(_, command) = &next {
            if matches!(command.kind, CommandType::FlyToPoint { .. }) {
                // Nothing else may go out until the vehicle reports in.
                tokio::time::sleep(Duration::from_millis(30)).await;
                assert!(rx.try_recv().is_err());
                fleet.mark_reached(ip);
            }
        }
        sent.push(next);
    }
    task.await.unwrap().unwrap();

    assert_eq!(
        sent,
        vec![
            Sent::Command(ip, Command::fly_to(Vec3::new(10.0, 5.0, 23.0))),
            Sent::Command(ip, Command::fly_to(Vec3::new(0.0, 0.0, 22.0))),
            Sent::Command(ip, Command::fly_to(Vec3::new(0.0, 0.0, 0.0))),
            Sent::Command(ip, Command::land()),
        ]
    );
}

#[tokio::test]
async fn return_home_times_out_when_configured() {
    let config = ManeuverConfig {
        return_timeout: Some(Duration::from_millis(50)),
        ..fast_config()
    };
    let (coordinator, fleet, mut rx) = setup(config);
    let ip = vehicle(5);
    report(&fleet, ip, Vec3::new(1.0, 1.0, 0.0));

    let err = coordinator.return_home(ip, 10.0).await.unwrap_err();
    assert!(matches!(err, ManeuverError::Timeout { step: "climb", .. }));
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn return_home_needs_telemetry() {
    let (coordinator, _fleet, _rx) = setup(fast_config());
    let err = coordinator.return_home(vehicle(9), 10.0).await.unwrap_err();
    assert!(matches!(err, ManeuverError::UnknownVehicle(_)));
}

#[tokio::test]
async fn followers_stack_above_the_leader() {
    let (coordinator, fleet, mut rx) = setup(fast_config());
    let leader = vehicle(10);
    let followers = [vehicle(11), vehicle(12)];
    report(&fleet, leader, Vec3::new(3.0, 4.0, 10.0));

    let stop = Arc::new(Signal::new());
    let task = {
        let coordinator = coordinator.clone();
        let stop = stop.clone();
        tokio::spawn(async move { coordinator.follow(leader, &followers, 2.0, &stop).await })
    };

    let first = [
        rx.recv().await.unwrap(),
        rx.recv().await.unwrap(),
    ];
    assert_eq!(
        first,
        [
            Sent::Command(followers[0], Command::fly_to(Vec3::new(3.0, 4.0, 12.0))),
            Sent::Command(followers[1], Command::fly_to(Vec3::new(3.0, 4.0, 14.0))),
        ]
    );

    report(&fleet, leader, Vec3::new(6.0, 4.0, 10.0));
    let moved = loop {
        let sent = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        if sent == Sent::Command(followers[0], Command::fly_to(Vec3::new(6.0, 4.0, 12.0))) {
            break sent;
        }
    };
    assert!(matches!(moved, Sent::Command(..)));

    stop.raise();
    let rounds = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(rounds >= 2);
}

#[tokio::test]
async fn follow_rejects_bad_offset() {
    let (coordinator, _fleet, _rx) = setup(fast_config());
    let stop = Signal::new();
    let err = coordinator
        .follow(vehicle(1), &[vehicle(2)], 5.0, &stop)
        .await
        .unwrap_err();
    assert!(matches!(err, ManeuverError::Rejected(_)));
}

#[tokio::test]
async fn down_axis_frames_climb_towards_negative_z() {
    let config = ManeuverConfig {
        vertical: VerticalAxis::Down,
        return_timeout: Some(Duration::from_millis(50)),
        ..fast_config()
    };
    let (coordinator, fleet, mut rx) = setup(config);
    let ip = vehicle(6);
    report(&fleet, ip, Vec3::new(0.0, 0.0, 0.0));
    report(&fleet, ip, Vec3::new(10.0, 5.0, -3.0));

    let err = coordinator.return_home(ip, 20.0).await.unwrap_err();
    assert!(matches!(err, ManeuverError::Timeout { step: "climb", .. }));
    assert_eq!(
        drain(&mut rx),
        vec![Sent::Command(ip, Command::fly_to(Vec3::new(10.0, 5.0, -23.0)))]
    );

    let leader = vehicle(10);
    let followers = [vehicle(11), vehicle(12)];
    report(&fleet, leader, Vec3::new(3.0, 4.0, -10.0));
    let stop = Arc::new(Signal::new());
    let task = {
        let coordinator = coordinator.clone();
        let stop = stop.clone();
        tokio::spawn(async move { coordinator.follow(leader, &followers, 2.0, &stop).await })
    };

    let first = [rx.recv().await.unwrap(), rx.recv().await.unwrap()];
    assert_eq!(
        first,
        [
            Sent::Command(followers[0], Command::fly_to(Vec3::new(3.0, 4.0, -12.0))),
            Sent::Command(followers[1], Command::fly_to(Vec3::new(3.0, 4.0, -14.0))),
        ]
    );

    stop.raise();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
