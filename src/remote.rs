//! Session loop with the control server.
//!
//! The [`Controller`] keeps exactly one session open at a time: it dials,
//! starts the heartbeat on the write half, dispatches the read half until it
//! ends, tears the session down and dials again after a fixed delay. It only
//! returns once its shutdown token is cancelled.

use std::net::{IpAddr, Ipv4Addr};

use futures_util::{Sink, SinkExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    config::{Config, DeviceProfile, Timing},
    connectivity::Connectivity,
    dispatcher::{self, CommandHandler},
    error::Result,
    heartbeat::Heartbeat,
    identity::DeviceId,
    protocol::{DeviceStatus, Report},
    session::{Dialer, State},
};

pub struct Controller<D, H> {
    endpoint: Url,
    profile: DeviceProfile,
    device_id: DeviceId,
    timing: Timing,

    dialer: D,
    handler: H,

    connectivity: Connectivity,
    state: State,
}

impl<D, H> Controller<D, H>
where
    D: Dialer,
    H: CommandHandler,
{
    #[must_use]
    pub fn new(config: &Config, device_id: DeviceId, dialer: D, handler: H) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            profile: config.device.clone(),
            device_id,
            timing: config.timing,
            dialer,
            handler,
            connectivity: Connectivity::new(),
            state: State::default(),
        }
    }

    /// Handle to the flag that is up while a session is open.
    #[must_use]
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    fn transition(&mut self, state: State) {
        debug!("{} -> {state}", self.state);
        self.state = state;
    }

    /// Runs sessions back to back until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        loop {
            self.transition(State::Connecting);
            info!("connecting to {}", self.endpoint);

            let dialed = tokio::select! {
                biased;
                () = shutdown.cancelled() => None,
                result = self.dialer.dial(&self.endpoint) => Some(result),
            };

            match dialed {
                Some(Ok((sink, stream))) => self.serve(sink, stream, &shutdown).await,
                Some(Err(e)) => {
                    self.connectivity.set_offline();
                    warn!("could not connect to {}: {e}", self.endpoint);
                }
                None => {}
            }

            self.transition(State::Disconnected);
            if shutdown.is_cancelled() {
                break;
            }

            info!(
                "reconnecting in {:.1}s",
                self.timing.reconnect_delay.as_secs_f32()
            );
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.timing.reconnect_delay) => {}
            }
        }

        self.connectivity.set_offline();
        info!("session loop stopped");
    }

    /// Runs one session until it ends or `shutdown` is cancelled.
    async fn serve(
        &mut self,
        sink: D::Sink,
        mut stream: D::Stream,
        shutdown: &CancellationToken,
    ) {
        let report = match self.status_report() {
            Ok(report) => report,
            Err(e) => {
                error!("could not build status report: {e}");
                self.close(sink).await;
                return;
            }
        };

        self.connectivity.set_online();
        self.transition(State::Connected);
        info!("connected to {}", self.endpoint);

        let heartbeat = Heartbeat::new(self.connectivity.clone(), report, &self.timing);
        let session_token = shutdown.child_token();
        let task = tokio::spawn(heartbeat.run(sink, session_token.clone()));

        tokio::select! {
            biased;
            () = shutdown.cancelled() => info!("closing session for shutdown"),
            disconnect = dispatcher::dispatch(&mut stream, &self.connectivity, &mut self.handler) => {
                if disconnect.is_abnormal() {
                    warn!("session ended abnormally: {disconnect}");
                } else {
                    info!("session ended: {disconnect}");
                }
            }
        }

        self.connectivity.set_offline();
        self.transition(State::Closing);

        session_token.cancel();
        match task.await {
            Ok(sink) => self.close(sink).await,
            Err(e) => error!("heartbeat task failed: {e}"),
        }
    }

    fn status_report(&self) -> Result<String> {
        let device_ip = local_ip_address::local_ip().unwrap_or_else(|e| {
            warn!("could not determine local address: {e}");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });

        let status = DeviceStatus::new(&self.profile, device_ip, &self.device_id);
        Report::Device(status).to_text()
    }

    async fn close<S>(&self, mut sink: S)
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        match tokio::time::timeout(self.timing.close_timeout, sink.close()).await {
            Ok(Ok(())) => trace!("write half closed"),
            Ok(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {}
            Ok(Err(e)) => debug!("closing write half failed: {e}"),
            Err(_) => debug!("closing write half timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{stream, StreamExt};
    use tokio::time;

    use super::*;
    use crate::test_fixtures::{
        Dial, RecordingHandler, RecordingSink, ScriptedDialer, ScriptedStream,
    };

    const PLAY: &str = r#"{"data":{"type":"play","audio":"http://x/y/clip.mp3"}}"#;

    fn controller(
        dialer: &ScriptedDialer,
        handler: &RecordingHandler,
    ) -> Controller<ScriptedDialer, RecordingHandler> {
        let device_id: DeviceId = "0042123456781700000000".parse().unwrap();
        let controller =
            Controller::new(&Config::default(), device_id, dialer.clone(), handler.clone());
        dialer.watch(controller.connectivity().clone());
        controller
    }

    /// Delivers `messages`, stays open for `open_for`, then fails the read.
    fn session(messages: Vec<Message>, open_for: Duration) -> ScriptedStream {
        let end = stream::once(async move {
            time::sleep(open_for).await;
            Err::<Message, _>(WsError::ConnectionClosed)
        });
        stream::iter(messages.into_iter().map(Ok)).chain(end).boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn failed_dials_stay_offline() {
        let dialer = ScriptedDialer::new([Dial::Refused, Dial::Refused, Dial::Refused]);
        let handler = RecordingHandler::new();
        let mut controller = controller(&dialer, &handler);
        let connectivity = controller.connectivity().clone();

        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(12)).await;
            cancel.cancel();
        });
        controller.run(shutdown).await;

        // Dials at 0s, 5s and 10s.
        assert_eq!(dialer.online_at_dial(), [false, false, false]);
        assert!(!connectivity.is_online());
        assert_eq!(controller.state(), State::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn session_reports_then_plays() {
        let sink = RecordingSink::new();
        let stream = session(vec![Message::text(PLAY)], Duration::from_secs(1));
        let dialer = ScriptedDialer::new([Dial::Accept(sink.clone(), stream)]);
        let handler = RecordingHandler::new();
        let mut controller = controller(&dialer, &handler);

        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(3)).await;
            cancel.cancel();
        });
        controller.run(shutdown).await;

        let texts = sink.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with(r#"{"event":"device","data":{"#));
        assert!(texts[0].contains(r#""mac_address":"0042123456781700000000""#));
        assert!(sink.is_closed());
        assert_eq!(
            handler.played(),
            [Url::parse("http://x/y/clip.mp3").unwrap()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn flag_is_down_before_each_redial() {
        let first = RecordingSink::new();
        let second = RecordingSink::new();
        let dialer = ScriptedDialer::new([
            Dial::Accept(first.clone(), session(vec![], Duration::from_secs(40))),
            Dial::Refused,
            Dial::Accept(second.clone(), session(vec![], Duration::from_secs(1))),
        ]);
        let handler = RecordingHandler::new();
        let mut controller = controller(&dialer, &handler);

        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            // First session 0s to 40s, refused at 45s, second session at 50s.
            time::sleep(Duration::from_secs(100)).await;
            cancel.cancel();
        });
        controller.run(shutdown).await;

        assert!(dialer.dials() >= 3);
        assert!(dialer.online_at_dial().iter().all(|online| !online));
        assert!(!controller.connectivity().is_online());

        // Status at 0s and one ping at 30s; nothing after the session ended.
        assert_eq!(first.texts().len(), 2);
        assert_eq!(first.texts()[1], "ping");
        assert!(first.is_closed());
        assert_eq!(second.texts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_open_session() {
        let sink = RecordingSink::new();
        let stream = session(vec![], Duration::from_secs(3600));
        let dialer = ScriptedDialer::new([Dial::Accept(sink.clone(), stream)]);
        let handler = RecordingHandler::new();
        let mut controller = controller(&dialer, &handler);
        let connectivity = controller.connectivity().clone();

        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        });
        controller.run(shutdown).await;

        assert_eq!(dialer.dials(), 1);
        assert!(sink.is_closed());
        assert!(!connectivity.is_online());
    }
}
