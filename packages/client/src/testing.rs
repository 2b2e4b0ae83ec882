//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::transport::{HeartbeatTerms, Inbound, Transport};

type InboundItem<F> = Result<Inbound<F>, TransportError>;

#[derive(Debug)]
struct Script<O> {
    opens: usize,
    closes: usize,
    heartbeats: usize,
    sent: Vec<O>,
    open_results: VecDeque<Result<HeartbeatTerms, TransportError>>,
    fail_sends: bool,
}

impl<O> Default for Script<O> {
    fn default() -> Self {
        Self {
            opens: 0,
            closes: 0,
            heartbeats: 0,
            sent: Vec::new(),
            open_results: VecDeque::new(),
            fail_sends: false,
        }
    }
}

/// Transport half owned by the code under test
pub(crate) struct FakeTransport<F, O> {
    script: Arc<Mutex<Script<O>>>,
    inbound: mpsc::UnboundedReceiver<InboundItem<F>>,
}

/// Test half: feeds inbound items and inspects what was sent
pub(crate) struct FakeRemote<F, O> {
    script: Arc<Mutex<Script<O>>>,
    inbound: mpsc::UnboundedSender<InboundItem<F>>,
}

pub(crate) fn fake_transport<F, O>() -> (FakeTransport<F, O>, FakeRemote<F, O>) {
    let script = Arc::new(Mutex::new(Script::default()));
    let (tx, rx) = mpsc::unbounded_channel();
    (
        FakeTransport {
            script: Arc::clone(&script),
            inbound: rx,
        },
        FakeRemote {
            script,
            inbound: tx,
        },
    )
}

impl<F, O: Clone> FakeRemote<F, O> {
    pub(crate) fn push_frame(&self, frame: F) {
        self.inbound.send(Ok(Inbound::Frame(frame))).unwrap();
    }

    pub(crate) fn push_heartbeat(&self) {
        self.inbound.send(Ok(Inbound::Heartbeat)).unwrap();
    }

    /// Make the next read fail, simulating a dropped connection
    pub(crate) fn push_error(&self, error: TransportError) {
        self.inbound.send(Err(error)).unwrap();
    }

    /// Script the result of the next `open` (default is success, no heartbeats)
    pub(crate) fn next_open(&self, result: Result<HeartbeatTerms, TransportError>) {
        self.script.lock().unwrap().open_results.push_back(result);
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.script.lock().unwrap().fail_sends = fail;
    }

    pub(crate) fn opens(&self) -> usize {
        self.script.lock().unwrap().opens
    }

    pub(crate) fn closes(&self) -> usize {
        self.script.lock().unwrap().closes
    }

    pub(crate) fn heartbeats(&self) -> usize {
        self.script.lock().unwrap().heartbeats
    }

    pub(crate) fn sent(&self) -> Vec<O> {
        self.script.lock().unwrap().sent.clone()
    }

    pub(crate) fn clear_sent(&self) {
        self.script.lock().unwrap().sent.clear();
    }
}

#[async_trait]
impl<F: Send + 'static, O: Send + 'static> Transport for FakeTransport<F, O> {
    type Frame = F;
    type Outbound = O;

    async fn open(&mut self) -> Result<HeartbeatTerms, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.opens += 1;
        script
            .open_results
            .pop_front()
            .unwrap_or(Ok(HeartbeatTerms::none()))
    }

    async fn recv(&mut self) -> Result<Inbound<F>, TransportError> {
        self.inbound
            .recv()
            .await
            .unwrap_or(Err(TransportError::Closed))
    }

    async fn send(&mut self, frame: O) -> Result<(), TransportError> {
        let mut script = self.script.lock().unwrap();
        if script.fail_sends {
            return Err(TransportError::Closed);
        }
        script.sent.push(frame);
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<(), TransportError> {
        self.script.lock().unwrap().heartbeats += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.script.lock().unwrap().closes += 1;
    }
}
