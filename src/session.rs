//! Websocket sessions with the control server.
//!
//! A session is one websocket connection, split into halves right after the
//! handshake: the write half goes to the [`Heartbeat`](crate::heartbeat::Heartbeat)
//! task, the read half to the [dispatcher](crate::dispatcher::dispatch).
//! Opening sessions goes through the [`Dialer`] trait, so the session loop
//! can run against something other than a real socket.

use std::{fmt, future::Future, time::Duration};

use futures_util::{
    stream::{SplitSink, SplitStream},
    Sink, Stream, StreamExt,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::error::Result;

pub type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WebSocket, Message>;
pub type WsSource = SplitStream<WebSocket>;

/// Opens sessions.
pub trait Dialer {
    type Sink: Sink<Message, Error = WsError> + Send + Unpin + 'static;
    type Stream: Stream<Item = std::result::Result<Message, WsError>> + Unpin;

    /// Connects to `endpoint` and returns the write and read halves.
    fn dial(&self, endpoint: &Url) -> impl Future<Output = Result<(Self::Sink, Self::Stream)>>;
}

/// Dials over TCP, with TLS for `wss` endpoints.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WebSocketDialer {
    connect_timeout: Option<Duration>,
}

impl WebSocketDialer {
    /// Creates a dialer that gives up on handshakes taking longer than
    /// `connect_timeout`.
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

impl Dialer for WebSocketDialer {
    type Sink = WsSink;
    type Stream = WsSource;

    async fn dial(&self, endpoint: &Url) -> Result<(WsSink, WsSource)> {
        let handshake = tokio_tungstenite::connect_async(endpoint.as_str());
        let (socket, response) = match self.connect_timeout {
            Some(duration) => tokio::time::timeout(duration, handshake).await??,
            None => handshake.await?,
        };

        debug!("{endpoint} accepted websocket upgrade ({})", response.status());
        Ok(socket.split())
    }
}

/// Lifecycle of the session loop.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum State {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Tearing down the heartbeat and the write half.
    Closing,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Closing => write!(f, "closing"),
        }
    }
}
