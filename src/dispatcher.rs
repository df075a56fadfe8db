//! Handling of inbound frames on the read half of a session.

use std::{fmt, future::Future, io};

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{
    error::ProtocolError,
    protocol::{frame::coding::CloseCode, CloseFrame},
    Error as WsError, Message,
};
use url::Url;

use crate::{
    cache::MediaCache,
    connectivity::Connectivity,
    error::{Error, Result},
    player::Player,
    protocol::Command,
};

/// Frames larger than this are skipped without decoding.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Executes decoded commands.
pub trait CommandHandler {
    /// Fetches the media at `audio` and plays it to completion.
    fn play(&mut self, audio: &Url) -> impl Future<Output = Result<()>>;
}

/// Fetches media through the cache and plays it with the local player.
#[derive(Clone, Debug)]
pub struct MediaPipeline {
    cache: MediaCache,
    player: Player,
}

impl MediaPipeline {
    #[must_use]
    pub fn new(cache: MediaCache, player: Player) -> Self {
        Self { cache, player }
    }
}

impl CommandHandler for MediaPipeline {
    async fn play(&mut self, audio: &Url) -> Result<()> {
        let path = self.cache.fetch(audio).await?;
        self.player.play(&path).await
    }
}

/// Why [`dispatch`] returned.
#[derive(Debug)]
pub enum Disconnect {
    /// The server sent a close frame.
    Closed(Option<CloseFrame>),
    /// The peer vanished without a close handshake.
    Lost(Error),
    /// Any other receive error.
    Failed(Error),
    /// The stream ended.
    Ended,
}

impl Disconnect {
    /// Whether the session ended abnormally: a close code other than
    /// `1000 Normal`, or a lost transport.
    #[must_use]
    pub fn is_abnormal(&self) -> bool {
        match self {
            Self::Closed(Some(frame)) => frame.code != CloseCode::Normal,
            Self::Lost(_) => true,
            Self::Closed(None) | Self::Failed(_) | Self::Ended => false,
        }
    }

    fn from_error(e: WsError) -> Self {
        let lost = match &e {
            WsError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
            _ => false,
        };

        if lost {
            Self::Lost(e.into())
        } else {
            Self::Failed(e.into())
        }
    }
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(Some(frame)) if frame.reason.is_empty() => {
                write!(f, "closed by server ({})", frame.code)
            }
            Self::Closed(Some(frame)) => {
                write!(f, "closed by server ({}: {})", frame.code, frame.reason)
            }
            Self::Closed(None) => write!(f, "closed by server"),
            Self::Lost(e) => write!(f, "connection lost: {e}"),
            Self::Failed(e) => write!(f, "receive failed: {e}"),
            Self::Ended => write!(f, "stream ended"),
        }
    }
}

/// Reads frames from `stream` and executes the commands they carry until the
/// session ends.
///
/// Commands run inline: the next frame is read only after `handler` has
/// finished with the current one. On abnormal closure `connectivity` is
/// lowered before returning.
pub async fn dispatch<St, H>(
    stream: &mut St,
    connectivity: &Connectivity,
    handler: &mut H,
) -> Disconnect
where
    St: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    H: CommandHandler,
{
    let disconnect = loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => break Disconnect::from_error(e),
            None => break Disconnect::Ended,
        };

        let text = match message {
            Message::Text(ref text) => text.as_str(),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(text) => text,
                Err(e) => {
                    debug!("ignoring binary frame that is not UTF-8: {e}");
                    continue;
                }
            },
            Message::Close(frame) => break Disconnect::Closed(frame),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        if text.len() > MAX_MESSAGE_SIZE {
            warn!("ignoring oversized message of {} bytes", text.len());
            continue;
        }

        trace!("received: {text}");
        match Command::decode(text) {
            Ok(Command::Play { audio }) => {
                info!("play {audio}");
                if let Err(e) = handler.play(&audio).await {
                    error!("could not play {audio}: {e}");
                }
            }
            Ok(Command::Unrecognized) => debug!("ignoring message: {text}"),
            Err(e) => warn!("malformed message: {e}"),
        }
    };

    if disconnect.is_abnormal() && connectivity.set_offline() {
        debug!("offline after abnormal closure");
    }

    disconnect
}
