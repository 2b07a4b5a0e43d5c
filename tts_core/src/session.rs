//! One streaming synthesis session over a websocket.
//!
//! The connection is split once it is open: a [`SessionSender`] owns the
//! outbound half and a [`SessionReceiver`] the inbound half, so one writer and
//! one reader can make progress independently. Both halves share the session
//! state, which only ever moves forward:
//! `Connecting -> Open -> SendClosed -> Closed`.
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::SynthesisConfig;
use crate::error::{Result, TtsError};
use crate::protocol::{is_auth_failure, InboundMessage, OutboundMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Connecting,
    Open,
    SendClosed,
    Closed,
}

#[derive(Debug)]
struct SharedState(watch::Sender<SessionState>);

impl SharedState {
    fn new() -> Self {
        Self(watch::Sender::new(SessionState::Connecting))
    }

    fn get(&self) -> SessionState {
        *self.0.borrow()
    }

    /// Moves forward to `to`; never moves back. Returns the previous state.
    fn advance(&self, to: SessionState) -> SessionState {
        let mut previous = to;
        self.0.send_if_modified(|state| {
            previous = *state;
            if to > *state {
                *state = to;
                true
            } else {
                false
            }
        });
        previous
    }

    /// Resolves once the session is closed.
    async fn closed(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
    }
}

/// Outbound half of a session.
pub struct SessionSender {
    sink: SplitSink<WsStream, Message>,
    state: Arc<SharedState>,
    closed: bool,
}

impl SessionSender {
    async fn send_message(&mut self, msg: OutboundMessage<'_>) -> Result<()> {
        let json = msg.to_json()?;
        if let Err(e) = self.sink.send(Message::Text(json.into())).await {
            self.state.advance(SessionState::Closed);
            return Err(TtsError::ConnectionLost(format!("send failed: {e}")));
        }
        Ok(())
    }

    /// Send one text frame, asking the service to start generating.
    pub async fn send_frame(&mut self, frame: &str) -> Result<()> {
        match self.state.get() {
            SessionState::Open => {}
            state => {
                return Err(TtsError::SessionClosed(format!(
                    "cannot send a frame in state {state:?}"
                )))
            }
        }
        debug!(len = frame.len(), "Sending text frame");
        self.send_message(OutboundMessage::frame(frame)).await
    }

    /// Signal that no more text follows. Calling it again is a no-op.
    pub async fn close_send(&mut self) -> Result<()> {
        if self.state.advance(SessionState::SendClosed) != SessionState::Open {
            return Ok(());
        }
        debug!("Closing send side");
        self.send_message(OutboundMessage::end_of_input()).await
    }

    /// Send a websocket close frame. Idempotent, never fails.
    pub async fn close(&mut self) {
        self.state.advance(SessionState::Closed);
        if self.closed {
            return;
        }
        self.closed = true;
        match self.sink.close().await {
            Ok(()) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {}
            Err(e) => debug!("Error while closing websocket: {e}"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Resolves once the session reaches `Closed`, from either half.
    pub async fn closed(&self) {
        self.state.closed().await
    }
}

/// Inbound half of a session.
pub struct SessionReceiver {
    stream: SplitStream<WsStream>,
    state: Arc<SharedState>,
    idle_timeout: Duration,
}

impl SessionReceiver {
    /// Lazily decoded audio frames, ending after the final message.
    ///
    /// A closed session yields nothing.
    pub fn frames(&mut self) -> impl Stream<Item = Result<Vec<u8>>> + Send + '_ {
        try_stream! {
            while self.state.get() != SessionState::Closed {
                match self.next_event().await? {
                    Inbound::Message(msg) => {
                        if let Some(audio) = msg.audio_bytes()? {
                            yield audio;
                        }
                        if msg.is_final() {
                            debug!("Received final message");
                            break;
                        }
                    }
                    Inbound::Control => {}
                    Inbound::Closed => {
                        debug!("Remote closed the session normally");
                        break;
                    }
                }
            }
            self.state.advance(SessionState::Closed);
        }
    }

    async fn next_event(&mut self) -> Result<Inbound> {
        let result = self.read().await;
        if result.is_err() {
            self.state.advance(SessionState::Closed);
        }
        result
    }

    async fn read(&mut self) -> Result<Inbound> {
        let next = tokio::time::timeout(self.idle_timeout, self.stream.next())
            .await
            .map_err(|_| TtsError::Stall(self.idle_timeout))?;

        match next {
            None => Err(TtsError::ConnectionLost(
                "connection dropped before the final message".into(),
            )),
            Some(Err(e)) => Err(TtsError::ConnectionLost(e.to_string())),
            Some(Ok(Message::Text(text))) => {
                let msg = InboundMessage::parse(&text)?;
                match msg.remote_error() {
                    Some(err) => Err(err),
                    None => Ok(Inbound::Message(msg)),
                }
            }
            Some(Ok(Message::Close(frame))) => close_event(frame),
            Some(Ok(_)) => Ok(Inbound::Control),
        }
    }
}

enum Inbound {
    Message(InboundMessage),
    /// Ping, pong or binary frames.
    Control,
    /// Orderly close initiated by the remote.
    Closed,
}

fn close_event(frame: Option<CloseFrame>) -> Result<Inbound> {
    let Some(frame) = frame else {
        return Err(TtsError::ConnectionLost("closed without a close code".into()));
    };
    let code = u16::from(frame.code);
    let reason = frame.reason.as_str();
    if frame.code == CloseCode::Normal {
        return Ok(Inbound::Closed);
    }
    if frame.code == CloseCode::Policy && is_auth_failure(Some(code), reason) {
        return Err(TtsError::Auth(reason.to_string()));
    }
    Err(TtsError::ConnectionLost(format!("closed with code {code}: {reason}")))
}

fn connect_error(e: tungstenite::Error) -> TtsError {
    match e {
        tungstenite::Error::Http(response)
            if response.status() == StatusCode::UNAUTHORIZED
                || response.status() == StatusCode::FORBIDDEN =>
        {
            TtsError::Auth(format!("endpoint answered {}", response.status()))
        }
        other => TtsError::Connection(other.to_string()),
    }
}

/// Handle to one synthesis session.
pub struct SessionHandle {
    voice_id: String,
    sender: SessionSender,
    receiver: SessionReceiver,
}

impl SessionHandle {
    /// Connect to the streaming endpoint for `voice_id` and send the handshake.
    pub async fn open(voice_id: &str, config: &SynthesisConfig) -> Result<Self> {
        let url = config.stream_url(voice_id);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TtsError::Connection(format!("invalid endpoint {url}: {e}")))?;
        if !config.api_key.is_empty() {
            let key = HeaderValue::from_str(&config.api_key)
                .map_err(|_| TtsError::Auth("API key is not a valid header value".into()))?;
            request.headers_mut().insert("xi-api-key", key);
        }

        let state = Arc::new(SharedState::new());
        info!(voice_id, model_id = %config.model_id, "Opening synthesis session");

        let (ws, _response) = tokio::time::timeout(config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                TtsError::Connection(format!("connect timed out after {:?}", config.connect_timeout))
            })?
            .map_err(connect_error)?;

        let (sink, stream) = ws.split();
        let mut sender = SessionSender {
            sink,
            state: state.clone(),
            closed: false,
        };

        let handshake = OutboundMessage::handshake(config.voice_settings, &config.api_key);
        if let Err(e) = sender.send_message(handshake).await {
            warn!("Handshake failed: {e}");
            sender.close().await;
            return Err(TtsError::Connection(format!("handshake failed: {e}")));
        }
        state.advance(SessionState::Open);

        Ok(Self {
            voice_id: voice_id.to_string(),
            sender,
            receiver: SessionReceiver {
                stream,
                state,
                idle_timeout: config.idle_timeout,
            },
        })
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    pub fn state(&self) -> SessionState {
        self.sender.state()
    }

    /// Borrow both halves at once so they can be driven concurrently.
    pub fn split(&mut self) -> (&mut SessionSender, &mut SessionReceiver) {
        (&mut self.sender, &mut self.receiver)
    }

    pub async fn send_frame(&mut self, frame: &str) -> Result<()> {
        self.sender.send_frame(frame).await
    }

    pub async fn close_send(&mut self) -> Result<()> {
        self.sender.close_send().await
    }

    pub fn receive(&mut self) -> impl Stream<Item = Result<Vec<u8>>> + Send + '_ {
        self.receiver.frames()
    }

    /// Close the connection. Safe to call in any state, any number of times.
    pub async fn close(&mut self) {
        self.sender.close().await;
    }
}
