//! Leader-follow relay.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use gcs_core::rules::CommandError;
use gcs_link::Uplink;
use tokio::time::Instant;

use super::{Coordinator, ManeuverError};
use crate::signal::Signal;

impl<U: Uplink> Coordinator<U> {
    /// Keep `followers` stacked above `leader` until `stop` is raised.
    ///
    /// Follower `k` is sent `(k + 1) * offset` metres above the leader's
    /// position. Targets are re-sent on every leader report and at
    /// least once per follow period. Returns the number of relay rounds.
    pub async fn follow(
        &self,
        leader: IpAddr,
        followers: &[IpAddr],
        offset: f64,
        stop: &Signal,
    ) -> Result<usize, ManeuverError> {
        self.config.limits.check_follow_offset(offset)?;
        if followers.is_empty() {
            return Err(CommandError::NoTargets.into());
        }
        if followers.contains(&leader) {
            return Err(CommandError::Invalid(format!("{leader} cannot follow itself")).into());
        }

        tracing::info!(%leader, followers = followers.len(), offset, "Follow started");
        let mut rounds = 0;
        let mut relayed: Option<DateTime<Utc>> = None;
        let mut next_tick = Instant::now();

        loop {
            let fleet = &self.fleet;
            let tick = self.config.follow_period;
            let stopped = tokio::select! {
                _ = stop.wait_take() => true,
                _ = fleet.wait_until(Some(next_tick), tick, |f| {
                    f.get(&leader).is_some_and(|v| Some(v.last_update) != relayed)
                }) => false,
            };
            if stopped {
                break;
            }

            let Some(leader_state) = self.fleet.get(&leader) else {
                tracing::debug!(%leader, "No leader telemetry yet");
                next_tick = Instant::now() + tick;
                continue;
            };

            for (k, follower) in followers.iter().enumerate() {
                let target = self
                    .config
                    .vertical
                    .lift(&leader_state.position, (k + 1) as f64 * offset);
                self.fly_to(std::slice::from_ref(follower), target).await?;
            }
            relayed = Some(leader_state.last_update);
            next_tick = Instant::now() + tick;
            rounds += 1;
        }

        tracing::info!(%leader, rounds, "Follow stopped");
        Ok(rounds)
    }
}
