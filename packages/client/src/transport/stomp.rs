//! WebSocket 上の STOMP 1.2
//!
//! ## 責務
//!
//! - フレームのエンコード・デコード (`StompFrame::encode` / `StompFrame::decode`) とヘッダのエスケープ
//! - CONNECT / CONNECTED のやり取りによる heart-beat 間隔の合意
//! - `StompTransport`: STOMP フレームを運ぶ 1 本の WebSocket セッション

use std::collections::VecDeque;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::HeartbeatConfig;
use crate::error::{ParseError, TransportError};

use super::{HeartbeatTerms, Inbound, Transport};

const ACCEPT_VERSION: &str = "1.1,1.2";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl FromStr for StompCommand {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" | "STOMP" => Ok(Self::Connect),
            "CONNECTED" => Ok(Self::Connected),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "DISCONNECT" => Ok(Self::Disconnect),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            other => Err(ParseError::Frame(format!("unknown command '{}'", other))),
        }
    }
}

impl std::fmt::Display for StompCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header. Repeated headers keep the first occurrence.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn destination(&self) -> Option<&str> {
        self.header_value("destination")
    }

    pub fn subscription(&self) -> Option<&str> {
        self.header_value("subscription")
    }

    pub fn connect(host: &str, heartbeat: &HeartbeatConfig) -> Self {
        Self::new(StompCommand::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header(
                "heart-beat",
                format!(
                    "{},{}",
                    heartbeat.outgoing.as_millis(),
                    heartbeat.incoming.as_millis()
                ),
            )
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).header("id", id)
    }

    /// SEND with a JSON body
    pub fn send_json(destination: &str, body: String) -> Self {
        Self::new(StompCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", body.len().to_string())
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }

    /// Serialize including the trailing NUL.
    pub fn encode(&self) -> String {
        let escaped = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escaped {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one frame (NUL already stripped).
    ///
    /// Returns `Ok(None)` for a heart-beat (nothing but end-of-line characters).
    pub fn decode(raw: &str) -> Result<Option<Self>, ParseError> {
        let text = raw.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        let (command_line, mut rest) =
            take_line(text).ok_or_else(|| ParseError::Frame("missing header block".into()))?;
        let command: StompCommand = command_line.parse()?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, tail) =
                take_line(rest).ok_or_else(|| ParseError::Frame("unterminated headers".into()))?;
            rest = tail;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ParseError::Frame(format!("invalid header line '{}'", line)))?;
            if escaped {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Self {
            command,
            headers,
            body: String::new(),
        };
        frame.body = match frame.header_value("content-length") {
            Some(length) => {
                let length: usize = length
                    .trim()
                    .parse()
                    .map_err(|_| ParseError::Frame(format!("bad content-length '{}'", length)))?;
                rest.get(..length)
                    .ok_or_else(|| ParseError::Frame("body shorter than content-length".into()))?
                    .to_string()
            }
            None => rest.to_string(),
        };
        Ok(Some(frame))
    }
}

fn take_line(input: &str) -> Option<(&str, &str)> {
    let end = input.find('\n')?;
    let line = &input[..end];
    Some((line.strip_suffix('\r').unwrap_or(line), &input[end + 1..]))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(ParseError::Frame(format!(
                    "invalid escape sequence '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

/// Agree on heart-beat intervals.
///
/// `server` is the `heart-beat` header of CONNECTED (`sx,sy`). A direction is
/// enabled only if both sides want it, at the slower of the two intervals.
pub fn negotiate(requested: &HeartbeatConfig, server: Option<&str>) -> HeartbeatTerms {
    let (sx, sy) = server.and_then(parse_heart_beat).unwrap_or((0, 0));
    let cx = requested.outgoing.as_millis() as u64;
    let cy = requested.incoming.as_millis() as u64;
    HeartbeatTerms {
        outgoing: agree(cx, sy),
        incoming: agree(cy, sx),
    }
}

fn agree(ours: u64, theirs: u64) -> Option<Duration> {
    (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
}

fn parse_heart_beat(value: &str) -> Option<(u64, u64)> {
    let (x, y) = value.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handshake = BoxFuture<'static, Result<(Socket, HeartbeatTerms), TransportError>>;

/// WebSocket upgrade followed by CONNECT, up to the broker's CONNECTED.
async fn handshake(
    url: String,
    host: String,
    heartbeat: HeartbeatConfig,
) -> Result<(Socket, HeartbeatTerms), TransportError> {
    let (mut socket, _response) = connect_async(url.as_str()).await?;
    let connect = StompFrame::connect(&host, &heartbeat);
    socket.send(Message::Text(connect.encode().into())).await?;

    loop {
        let message = socket.next().await.ok_or(TransportError::Closed)??;
        let text = match message {
            Message::Text(text) => text.as_str().to_string(),
            Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
            Message::Close(_) => return Err(TransportError::Closed),
            _ => continue,
        };
        for raw in text.split('\0') {
            let frame = match StompFrame::decode(raw) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => return Err(TransportError::HandshakeRejected(e.to_string())),
            };
            match frame.command {
                StompCommand::Connected => {
                    let terms = negotiate(&heartbeat, frame.header_value("heart-beat"));
                    tracing::debug!(
                        "STOMP session established (version {}, heart-beat {:?})",
                        frame.header_value("version").unwrap_or("?"),
                        terms
                    );
                    return Ok((socket, terms));
                }
                StompCommand::Error => {
                    let reason = frame
                        .header_value("message")
                        .map(str::to_string)
                        .unwrap_or(frame.body);
                    return Err(TransportError::HandshakeRejected(reason));
                }
                other => tracing::debug!("Ignoring {} before CONNECTED", other),
            }
        }
    }
}

/// STOMP session over a WebSocket connection.
pub struct StompTransport {
    url: String,
    host: String,
    heartbeat: HeartbeatConfig,
    handshake: Option<Handshake>,
    socket: Option<Socket>,
    pending: VecDeque<StompFrame>,
}

impl StompTransport {
    pub fn new(url: impl Into<String>, heartbeat: HeartbeatConfig) -> Self {
        let url = url.into();
        let host = url
            .parse::<Uri>()
            .ok()
            .and_then(|uri| uri.host().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string());
        Self {
            url,
            host,
            heartbeat,
            handshake: None,
            socket: None,
            pending: VecDeque::new(),
        }
    }

    /// Decode every frame of one WebSocket message. Returns how many were queued.
    fn queue_frames(&mut self, text: &str) -> usize {
        let mut queued = 0;
        for raw in text.split('\0') {
            match StompFrame::decode(raw) {
                Ok(Some(frame)) => {
                    self.pending.push_back(frame);
                    queued += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Dropping malformed STOMP frame: {}", e),
            }
        }
        queued
    }
}

#[async_trait]
impl Transport for StompTransport {
    type Frame = StompFrame;
    type Outbound = StompFrame;

    async fn open(&mut self) -> Result<HeartbeatTerms, TransportError> {
        if self.handshake.is_none() {
            self.close().await;
            self.handshake = Some(
                handshake(self.url.clone(), self.host.clone(), self.heartbeat).boxed(),
            );
        }

        let result = match self.handshake.as_mut() {
            Some(handshake) => handshake.await,
            None => Err(TransportError::Closed),
        };
        self.handshake = None;
        let (socket, terms) = result?;
        self.socket = Some(socket);
        Ok(terms)
    }

    async fn recv(&mut self) -> Result<Inbound<StompFrame>, TransportError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Inbound::Frame(frame));
            }
            let socket = self.socket.as_mut().ok_or(TransportError::Closed)?;
            let message = socket.next().await.ok_or(TransportError::Closed)??;
            let queued = match message {
                Message::Text(text) => self.queue_frames(text.as_str()),
                Message::Binary(data) => self.queue_frames(&String::from_utf8_lossy(&data)),
                Message::Close(reason) => {
                    tracing::debug!("Broker closed the WebSocket: {:?}", reason);
                    self.socket = None;
                    return Err(TransportError::Closed);
                }
                _ => 0,
            };
            // EOL-only or undecodable traffic still proves the peer is alive
            if queued == 0 {
                return Ok(Inbound::Heartbeat);
            }
        }
    }

    async fn send(&mut self, frame: StompFrame) -> Result<(), TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::Closed)?;
        socket.send(Message::Text(frame.encode().into())).await?;
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<(), TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::Closed)?;
        socket.send(Message::Text("\n".into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        self.handshake = None;
        self.pending.clear();
        if let Some(mut socket) = self.socket.take() {
            let goodbye = async {
                socket
                    .send(Message::Text(StompFrame::disconnect().encode().into()))
                    .await?;
                socket.close(None).await
            };
            match tokio::time::timeout(CLOSE_TIMEOUT, goodbye).await {
                Ok(Ok(())) => tracing::debug!("STOMP session closed"),
                Ok(Err(e)) => tracing::debug!("STOMP session closed uncleanly: {}", e),
                Err(_) => tracing::debug!("STOMP session close timed out"),
            }
        }
    }
}
