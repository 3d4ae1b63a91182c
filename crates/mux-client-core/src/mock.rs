//! Scripted in-memory transport for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use bytes::{Bytes, BytesMut};
use mux_proto::Headers;
use tokio::sync::mpsc;

use crate::authority::Authority;
use crate::event::{SessionEvent, SessionEvents, StreamEvent, StreamEvents};
use crate::transport::{
    Connector, StreamHandle, StreamSink, TransportError, TransportSession, TransportStream, Written,
};

/// How every stream opened on a mock session behaves.
#[derive(Debug, Clone)]
pub enum Script {
    /// Respond with `headers` and `chunks` regardless of the request.
    Respond { headers: Headers, chunks: Vec<Bytes> },
    /// Once the request is ended, respond with the bytes written.
    Echo,
    /// Never respond.
    Silent,
    /// Fail the stream with this error.
    Fail(TransportError),
}

#[derive(Clone)]
pub struct MockConnector {
    auto_connect: bool,
    ready_immediately: bool,
    stall_writes: bool,
    refuse_streams: bool,
    script: Script,
    sessions: Arc<Mutex<Vec<MockSession>>>,
}

impl MockConnector {
    /// Sessions connect as soon as they are created; streams stay silent.
    pub fn new() -> Self {
        Self::build(true, Script::Silent)
    }

    /// Sessions stay connecting until the test emits an event.
    pub fn manual() -> Self {
        Self::build(false, Script::Silent)
    }

    pub fn with_script(script: Script) -> Self {
        Self::build(true, script)
    }

    /// Streams get their id at open time instead of via a `Ready` event.
    pub fn ready_immediately(mut self) -> Self {
        self.ready_immediately = true;
        self
    }

    /// Writes are never accepted, as if the peer stopped reading.
    pub fn stall_writes(mut self) -> Self {
        self.stall_writes = true;
        self
    }

    /// Opening a stream fails as if the session closed in the meantime.
    pub fn refuse_streams(mut self) -> Self {
        self.refuse_streams = true;
        self
    }

    fn build(auto_connect: bool, script: Script) -> Self {
        Self {
            auto_connect,
            ready_immediately: false,
            stall_writes: false,
            refuse_streams: false,
            script,
            sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> MockSession {
        self.sessions.lock().unwrap()[index].clone()
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    fn connect(&self, _authority: &Authority) -> (MockSession, SessionEvents) {
        let mut sessions = self.sessions.lock().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        if self.auto_connect {
            let _ = tx.send(SessionEvent::Connected);
        }

        let session = MockSession {
            shared: Arc::new(SessionShared {
                serial: sessions.len(),
                closed: AtomicBool::new(false),
                events: tx,
                streams: Mutex::new(Vec::new()),
                script: self.script.clone(),
                ready_immediately: self.ready_immediately,
                stall_writes: self.stall_writes,
                refuse_streams: self.refuse_streams,
            }),
        };
        sessions.push(session.clone());
        (session, rx)
    }
}

#[derive(Clone)]
pub struct MockSession {
    shared: Arc<SessionShared>,
}

struct SessionShared {
    serial: usize,
    closed: AtomicBool,
    events: mpsc::UnboundedSender<SessionEvent>,
    streams: Mutex<Vec<Arc<Mutex<StreamLog>>>>,
    script: Script,
    ready_immediately: bool,
    stall_writes: bool,
    refuse_streams: bool,
}

/// What happened on one mock stream.
#[derive(Debug, Clone, Default)]
pub struct StreamLog {
    pub headers: Headers,
    pub written: BytesMut,
    pub ended: bool,
    pub closed: bool,
}

impl MockSession {
    pub fn serial(&self) -> usize {
        self.shared.serial
    }

    /// Deliver a session event as the transport would.
    pub fn emit(&self, event: SessionEvent) {
        if event.is_terminal() {
            self.shared.closed.store(true, Ordering::SeqCst);
        }
        let _ = self.shared.events.send(event);
    }

    pub fn stream_count(&self) -> usize {
        self.shared.streams.lock().unwrap().len()
    }

    pub fn stream_log(&self, index: usize) -> StreamLog {
        self.shared.streams.lock().unwrap()[index].lock().unwrap().clone()
    }
}

impl TransportSession for MockSession {
    type Stream = MockStream;

    fn open_stream(&self, headers: &Headers) -> Result<(MockStream, StreamEvents), TransportError> {
        if self.is_closed() || self.shared.refuse_streams {
            return Err(TransportError::NotConnected);
        }

        let log = Arc::new(Mutex::new(StreamLog {
            headers: headers.clone(),
            ..StreamLog::default()
        }));
        let id = {
            let mut streams = self.shared.streams.lock().unwrap();
            streams.push(Arc::clone(&log));
            (streams.len() as u64 - 1) * 4
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let stream = MockStream {
            id: Arc::new(OnceLock::new()),
            log,
            events: tx.clone(),
            script: self.shared.script.clone(),
            stall_writes: self.shared.stall_writes,
        };

        if self.shared.ready_immediately {
            let _ = stream.id.set(id);
            play(&self.shared.script, &tx);
        } else {
            let cell = Arc::clone(&stream.id);
            let script = self.shared.script.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                let _ = cell.set(id);
                let _ = tx.send(StreamEvent::Ready { id });
                play(&script, &tx);
            });
        }

        Ok((stream, rx))
    }

    fn destroy(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

/// Events a script produces as soon as the stream is usable.
fn play(script: &Script, tx: &mpsc::UnboundedSender<StreamEvent>) {
    match script {
        Script::Respond { headers, chunks } => {
            let _ = tx.send(StreamEvent::Response(headers.clone()));
            for chunk in chunks {
                let _ = tx.send(StreamEvent::Data(chunk.clone()));
            }
            let _ = tx.send(StreamEvent::Ended);
        }
        Script::Fail(err) => {
            let _ = tx.send(StreamEvent::Errored(err.clone()));
        }
        Script::Echo | Script::Silent => {}
    }
}

pub struct MockStream {
    id: Arc<OnceLock<u64>>,
    log: Arc<Mutex<StreamLog>>,
    events: mpsc::UnboundedSender<StreamEvent>,
    script: Script,
    stall_writes: bool,
}

impl StreamHandle for MockStream {
    fn id(&self) -> Option<u64> {
        self.id.get().copied()
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closed = true;
    }

    fn is_closed(&self) -> bool {
        self.log.lock().unwrap().closed
    }
}

impl TransportStream for MockStream {
    type Sink = MockSink;

    fn sink(&mut self) -> MockSink {
        MockSink {
            log: Arc::clone(&self.log),
            events: self.events.clone(),
            script: self.script.clone(),
            stall_writes: self.stall_writes,
        }
    }
}

pub struct MockSink {
    log: Arc<Mutex<StreamLog>>,
    events: mpsc::UnboundedSender<StreamEvent>,
    script: Script,
    stall_writes: bool,
}

impl StreamSink for MockSink {
    fn write(&mut self, chunk: Bytes) -> Written {
        if self.stall_writes {
            return Box::pin(std::future::pending::<Result<(), TransportError>>());
        }
        let mut log = self.log.lock().unwrap();
        if log.closed || log.ended {
            return Box::pin(std::future::ready(Err(TransportError::StreamClosed)));
        }
        log.written.extend_from_slice(&chunk);
        Box::pin(std::future::ready(Ok(())))
    }

    fn end(&mut self) -> Result<(), TransportError> {
        let written = {
            let mut log = self.log.lock().unwrap();
            if log.closed {
                return Err(TransportError::StreamClosed);
            }
            log.ended = true;
            log.written.clone().freeze()
        };

        if let Script::Echo = self.script {
            let _ = self
                .events
                .send(StreamEvent::Response(Headers::from([(":status", "200")])));
            if !written.is_empty() {
                let _ = self.events.send(StreamEvent::Data(written));
            }
            let _ = self.events.send(StreamEvent::Ended);
        }
        Ok(())
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
