//! Presence reporting on the write half of a session.
//!
//! Every session opens with one full status report, followed by a `ping` per
//! heartbeat interval until the session's cancellation token fires. Nothing
//! is written while the connectivity flag is down, and send failures never
//! end the session: that is left to the read half.

use std::time::Duration;

use futures_util::{Sink, SinkExt};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};
use tokio_util::sync::CancellationToken;

use crate::{config::Timing, connectivity::Connectivity, protocol::PING};

#[derive(Clone, Debug)]
pub struct Heartbeat {
    connectivity: Connectivity,
    report: Utf8Bytes,
    interval: Duration,
    retry_delay: Duration,
    attempts: u32,
}

impl Heartbeat {
    /// Creates a heartbeat that opens with the serialized status `report`.
    #[must_use]
    pub fn new(connectivity: Connectivity, report: String, timing: &Timing) -> Self {
        Self {
            connectivity,
            report: report.into(),
            interval: timing.heartbeat_interval,
            retry_delay: timing.status_retry_delay,
            attempts: timing.status_attempts,
        }
    }

    /// Drives `sink` until `cancel` fires, then hands it back for closing.
    pub async fn run<S>(self, mut sink: S, cancel: CancellationToken) -> S
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        let cancelled = tokio::select! {
            biased;
            () = cancel.cancelled() => true,
            () = self.send_status(&mut sink) => false,
        };
        if cancelled {
            return sink;
        }

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.send_ping(&mut sink) => {}
            }
        }

        trace!("heartbeat stopped");
        sink
    }

    async fn send_status<S>(&self, sink: &mut S)
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        for attempt in 1..=self.attempts {
            if !self.connectivity.is_online() {
                debug!("offline; status report not sent");
                return;
            }

            match sink.send(Message::Text(self.report.clone())).await {
                Ok(()) => {
                    info!("status report sent");
                    return;
                }
                Err(e) => warn!(
                    "status report attempt {attempt}/{} failed: {e}",
                    self.attempts
                ),
            }

            if attempt < self.attempts {
                time::sleep(self.retry_delay).await;
            }
        }

        error!("giving up on status report after {} attempts", self.attempts);
    }

    async fn send_ping<S>(&self, sink: &mut S)
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        if !self.connectivity.is_online() {
            return;
        }

        match sink.send(Message::text(PING)).await {
            Ok(()) => trace!("ping sent"),
            Err(e) => warn!("ping failed: {e}"),
        }
    }
}
