//! Doubles for the session halves and the command handler.

use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};

use futures_util::{stream::BoxStream, Sink};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

use crate::{
    connectivity::Connectivity,
    dispatcher::CommandHandler,
    error::{Error, Result},
    session::Dialer,
};

type SendResult = std::result::Result<(), WsError>;

/// Write half that records every message it is asked to send.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<Message>>>,
    failures: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose first `failures` sends fail.
    pub fn failing(failures: usize) -> Self {
        let sink = Self::default();
        sink.failures.store(failures, Ordering::SeqCst);
        sink
    }

    /// Text of every attempted send, failed ones included.
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|message| message.to_text().unwrap().to_owned())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Sink<Message> for RecordingSink {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<SendResult> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> SendResult {
        self.sent.lock().unwrap().push(item);

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(WsError::AlreadyClosed)
        } else {
            Ok(())
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<SendResult> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<SendResult> {
        self.closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// Command handler that records the audio URLs it is asked to play.
#[derive(Clone, Debug, Default)]
pub struct RecordingHandler {
    played: Arc<Mutex<Vec<Url>>>,
    fail: bool,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that records and then fails every command.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<Url> {
        self.played.lock().unwrap().clone()
    }
}

impl CommandHandler for RecordingHandler {
    async fn play(&mut self, audio: &Url) -> Result<()> {
        self.played.lock().unwrap().push(audio.clone());
        if self.fail {
            Err(Error::unavailable("player exited with status 1"))
        } else {
            Ok(())
        }
    }
}

pub type ScriptedStream = BoxStream<'static, std::result::Result<Message, WsError>>;

/// Outcome of one scripted dial.
pub enum Dial {
    Refused,
    Accept(RecordingSink, ScriptedStream),
}

/// Dialer replaying a script of outcomes; refuses once the script runs out.
#[derive(Clone, Default)]
pub struct ScriptedDialer {
    script: Arc<Mutex<VecDeque<Dial>>>,
    connectivity: Arc<Mutex<Option<Connectivity>>>,
    online_at_dial: Arc<Mutex<Vec<bool>>>,
}

impl ScriptedDialer {
    pub fn new(script: impl IntoIterator<Item = Dial>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Watches `connectivity`, recording its value at every dial.
    pub fn watch(&self, connectivity: Connectivity) {
        *self.connectivity.lock().unwrap() = Some(connectivity);
    }

    /// Flag values observed at each dial so far.
    pub fn online_at_dial(&self) -> Vec<bool> {
        self.online_at_dial.lock().unwrap().clone()
    }

    pub fn dials(&self) -> usize {
        self.online_at_dial.lock().unwrap().len()
    }
}

impl Dialer for ScriptedDialer {
    type Sink = RecordingSink;
    type Stream = ScriptedStream;

    async fn dial(&self, _: &Url) -> Result<(RecordingSink, ScriptedStream)> {
        let online = self
            .connectivity
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(Connectivity::is_online);
        self.online_at_dial.lock().unwrap().push(online);

        match self.script.lock().unwrap().pop_front() {
            Some(Dial::Accept(sink, stream)) => Ok((sink, stream)),
            Some(Dial::Refused) | None => Err(Error::unavailable("connection refused")),
        }
    }
}

/// Serves `status` with `body` to every connection on a loopback port;
/// returns the base URL and a counter of requests served.
pub async fn serve(status: &'static str, body: &'static [u8]) -> (Url, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let requests = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);

            let mut request = vec![0; 4096];
            let _ = socket.read(&mut request).await;

            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body).await;
            let _ = socket.shutdown().await;
        }
    });

    (base, requests)
}
