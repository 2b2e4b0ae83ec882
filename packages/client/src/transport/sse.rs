//! Server-sent events over HTTP.
//!
//! The parser follows the EventSource line rules: `data` lines are joined with
//! `\n`, an empty line dispatches, lines starting with `:` are comments, and
//! `\n`, `\r\n` and `\r` all end a line. `SseTransport` keeps the last event id
//! and sends it back as `Last-Event-ID` when it reopens the stream.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};

use crate::error::TransportError;

use super::{HeartbeatTerms, Inbound, Transport};

const EVENT_STREAM: &str = "text/event-stream";

/// One dispatched event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name, `None` for unnamed events
    pub event: Option<String>,
    pub data: String,
    /// Last event id seen when this event was dispatched
    pub id: Option<String>,
    /// Reconnection hint sent by the server
    pub retry: Option<Duration>,
}

impl SseEvent {
    /// Unnamed events and events named `message` carry the default payload.
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    Event(SseEvent),
    Comment(String),
}

/// Incremental parser. Feed it raw body chunks in arrival order.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Option<String>,
    retry: Option<Duration>,
    last_event_id: Option<String>,
    /// The previous chunk ended in `\r`; a leading `\n` belongs to that line end
    skip_lf: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseItem> {
        if chunk.is_empty() {
            return Vec::new();
        }
        let skip_lf = std::mem::take(&mut self.skip_lf);
        let chunk = match chunk.split_first() {
            Some((b'\n', rest)) if skip_lf => rest,
            _ => chunk,
        };
        self.buffer.extend_from_slice(chunk);
        let mut items = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| matches!(b, b'\n' | b'\r')) {
            let terminator = if self.buffer[pos] == b'\r' {
                match self.buffer.get(pos + 1) {
                    Some(b'\n') => 2,
                    Some(_) => 1,
                    None => {
                        self.skip_lf = true;
                        1
                    }
                }
            } else {
                1
            };
            let line: Vec<u8> = self.buffer.drain(..pos + terminator).take(pos).collect();
            if let Some(item) = self.process_line(&String::from_utf8_lossy(&line)) {
                items.push(item);
            }
        }

        items
    }

    fn process_line(&mut self, line: &str) -> Option<SseItem> {
        if line.is_empty() {
            return self.dispatch().map(SseItem::Event);
        }
        if let Some(comment) = line.strip_prefix(':') {
            return Some(SseItem::Comment(comment.trim_start().to_string()));
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "event" => self.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(millis));
                }
            }
            other => tracing::trace!("Ignoring SSE field '{}'", other),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let retry = self.retry.take();
        let data = self.data.take()?;
        Some(SseEvent {
            event,
            data,
            id: self.last_event_id.clone(),
            retry,
        })
    }
}

type PendingRequest = BoxFuture<'static, Result<reqwest::Response, reqwest::Error>>;

/// One-way event stream over a long-lived HTTP GET.
pub struct SseTransport {
    client: reqwest::Client,
    url: String,
    idle_timeout: Duration,
    request: Option<PendingRequest>,
    response: Option<reqwest::Response>,
    parser: SseParser,
    queue: VecDeque<SseEvent>,
    last_event_id: Option<String>,
}

impl SseTransport {
    /// `idle_timeout` of zero disables the silence watchdog.
    pub fn new(url: impl Into<String>, idle_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            idle_timeout,
            request: None,
            response: None,
            parser: SseParser::new(),
            queue: VecDeque::new(),
            last_event_id: None,
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    type Frame = SseEvent;
    type Outbound = Infallible;

    async fn open(&mut self) -> Result<HeartbeatTerms, TransportError> {
        if self.request.is_none() {
            self.close().await;
            let mut request = self
                .client
                .get(&self.url)
                .header(ACCEPT, EVENT_STREAM)
                .header(CACHE_CONTROL, "no-cache");
            if let Some(id) = &self.last_event_id {
                request = request.header("Last-Event-ID", id.as_str());
            }
            self.request = Some(request.send().boxed());
        }

        let result = match self.request.as_mut() {
            Some(request) => request.await,
            None => return Err(TransportError::Closed),
        };
        self.request = None;
        let response = result?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HandshakeRejected(format!("HTTP {}", status)));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with(EVENT_STREAM) {
            return Err(TransportError::HandshakeRejected(format!(
                "unexpected content type '{}'",
                content_type
            )));
        }

        tracing::debug!("Event stream opened: {}", self.url);
        self.parser = SseParser::new();
        self.response = Some(response);
        Ok(HeartbeatTerms {
            outgoing: None,
            incoming: (!self.idle_timeout.is_zero()).then_some(self.idle_timeout),
        })
    }

    async fn recv(&mut self) -> Result<Inbound<SseEvent>, TransportError> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Ok(Inbound::Frame(event));
            }

            let response = self.response.as_mut().ok_or(TransportError::Closed)?;
            let Some(chunk) = response.chunk().await? else {
                tracing::debug!("Event stream ended by server");
                self.response = None;
                return Err(TransportError::Closed);
            };

            for item in self.parser.feed(&chunk) {
                let SseItem::Event(event) = item else {
                    continue;
                };
                if event.id.is_some() {
                    self.last_event_id = event.id.clone();
                }
                if let Some(retry) = event.retry {
                    tracing::debug!("Server suggested retry interval {:?}", retry);
                }
                if event.is_message() {
                    self.queue.push_back(event);
                } else {
                    tracing::debug!("Ignoring '{}' event", event.event.unwrap_or_default());
                }
            }

            // Comments and partial lines still count as peer activity
            if self.queue.is_empty() {
                return Ok(Inbound::Heartbeat);
            }
        }
    }

    async fn send(&mut self, frame: Infallible) -> Result<(), TransportError> {
        match frame {}
    }

    async fn send_heartbeat(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self) {
        self.request = None;
        self.queue.clear();
        if self.response.take().is_some() {
            tracing::debug!("Event stream closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(items: Vec<SseItem>) -> Vec<SseEvent> {
        items
            .into_iter()
            .filter_map(|item| match item {
                SseItem::Event(event) => Some(event),
                SseItem::Comment(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_single_event() {
        // テスト項目: data 行と空行で 1 件のイベントが確定する
        // given (前提条件):
        let mut parser = SseParser::new();

        // when (操作):
        let parsed = events(parser.feed(b"data: {\"timestamp\":1}\n\n"));

        // then (期待する結果):
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].data, "{\"timestamp\":1}");
        assert!(parsed[0].is_message());
    }

    #[test]
    fn test_multiple_data_lines_are_joined() {
        // テスト項目: 複数の data 行は改行で連結される
        // given (前提条件):
        let mut parser = SseParser::new();

        // when (操作):
        let parsed = events(parser.feed(b"data:first\ndata: second\n\n"));

        // then (期待する結果):
        assert_eq!(parsed[0].data, "first\nsecond");
    }

    #[test]
    fn test_event_split_across_chunks() {
        // テスト項目: チャンク境界をまたぐイベント (CRLF の途中、UTF-8 の途中を含む) を復元する
        // given (前提条件):
        let mut parser = SseParser::new();
        let bytes = "data: héllo\r\n\r\n".as_bytes();
        let split_utf8 = 8; // inside 'é'
        let split_crlf = bytes.len() - 3; // between '\r' and '\n'

        // when (操作):
        let mut parsed = events(parser.feed(&bytes[..split_utf8]));
        parsed.extend(events(parser.feed(&bytes[split_utf8..split_crlf])));
        parsed.extend(events(parser.feed(&bytes[split_crlf..])));

        // then (期待する結果):
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].data, "héllo");
    }

    #[test]
    fn test_comment_lines_are_reported() {
        // テスト項目: コロンで始まる行はコメントとして扱われイベントにならない
        // given (前提条件):
        let mut parser = SseParser::new();

        // when (操作):
        let items = parser.feed(b": keep-alive\n\n");

        // then (期待する結果):
        assert_eq!(items, vec![SseItem::Comment("keep-alive".to_string())]);
    }

    #[test]
    fn test_named_event_and_id_are_tracked() {
        // テスト項目: event 名と id が保持され、id は後続イベントにも引き継がれる
        // given (前提条件):
        let mut parser = SseParser::new();

        // when (操作):
        let parsed = events(parser.feed(
            b"event: status\nid: 42\nretry: 3000\ndata: up\n\ndata: next\n\n",
        ));

        // then (期待する結果):
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].event.as_deref(), Some("status"));
        assert!(!parsed[0].is_message());
        assert_eq!(parsed[0].retry, Some(Duration::from_millis(3000)));
        assert_eq!(parsed[1].event, None);
        assert_eq!(parsed[1].id.as_deref(), Some("42"));
    }

    #[test]
    fn test_blank_line_without_data_dispatches_nothing() {
        // テスト項目: data 行のないブロックはイベントを発行しない
        // given (前提条件):
        let mut parser = SseParser::new();

        // when (操作):
        let parsed = events(parser.feed(b"event: ping\n\n\n"));

        // then (期待する結果):
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_incomplete_event_waits_for_blank_line() {
        // テスト項目: 空行が届くまでイベントは確定しない
        // given (前提条件):
        let mut parser = SseParser::new();

        // when (操作):
        let before = events(parser.feed(b"data: partial\n"));
        let after = events(parser.feed(b"\n"));

        // then (期待する結果):
        assert!(before.is_empty());
        assert_eq!(after[0].data, "partial");
    }

    #[test]
    fn test_cr_only_stream_dispatches_without_waiting() {
        // テスト項目: CR だけで区切られたストリームは、チャンク末尾の空行で即座にイベントが確定する
        // given (前提条件):
        let mut parser = SseParser::new();

        // when (操作):
        let parsed = events(parser.feed(b"data: x\r\r"));

        // then (期待する結果):
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].data, "x");
    }

    #[test]
    fn test_lf_after_trailing_cr_is_not_a_blank_line() {
        // テスト項目: チャンク末尾の CR に続く次チャンク先頭の LF は同じ改行として扱われる
        // given (前提条件):
        let mut parser = SseParser::new();

        // when (操作):
        let first = events(parser.feed(b"data: a\r"));
        let second = events(parser.feed(b"\ndata: b\r\n\r\n"));

        // then (期待する結果):
        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].data, "a\nb");
    }
}
