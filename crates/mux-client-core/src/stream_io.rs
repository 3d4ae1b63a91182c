//! Request streams over quinn bidirectional streams.
//!
//! Each [`QuicStream`] is backed by a driver task that owns the quinn
//! stream halves. Its [`QuicSink`] forwards writes and the half-close as
//! commands; the driver decodes inbound frames into [`StreamEvent`]s.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use mux_proto::Headers;
use mux_proto::codec::{self, Decoded, FrameDecoder};
use mux_proto::error::code;
use quinn::{RecvStream, SendStream};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace};

use crate::event::{StreamEvent, StreamEvents};
use crate::transport::{StreamHandle, StreamSink, TransportError, TransportStream, Written};

/// Largest chunk pulled from the receive side at once.
const READ_CHUNK: usize = 64 * 1024;

type Ack = oneshot::Sender<Result<(), TransportError>>;

enum Command {
    Data(Bytes, Ack),
    End,
}

/// Handle to one request stream.
///
/// The stream id is unknown until the driver has opened the quinn stream;
/// a [`StreamEvent::Ready`] announces it. Dropping the handle aborts the
/// stream unless both directions already finished.
pub struct QuicStream {
    id: Arc<OnceLock<u64>>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    cancel: watch::Sender<bool>,
}

/// Send half of a [`QuicStream`].
pub struct QuicSink {
    commands: Option<mpsc::UnboundedSender<Command>>,
    cancel: watch::Receiver<bool>,
    ended: bool,
}

/// Open a request stream on `connection` carrying `headers`.
pub(crate) fn open(connection: quinn::Connection, headers: Headers) -> (QuicStream, StreamEvents) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let id = Arc::new(OnceLock::new());

    tokio::spawn(drive_stream(
        connection,
        headers,
        Arc::clone(&id),
        commands_rx,
        cancel_rx,
        events_tx,
    ));

    let stream = QuicStream {
        id,
        commands: Some(commands_tx),
        cancel: cancel_tx,
    };
    (stream, events_rx)
}

impl StreamHandle for QuicStream {
    fn id(&self) -> Option<u64> {
        self.id.get().copied()
    }

    fn close(&mut self) {
        if !self.cancel.send_replace(true) {
            debug!(stream_id = ?self.id(), "closing stream");
        }
    }

    fn is_closed(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl TransportStream for QuicStream {
    type Sink = QuicSink;

    fn sink(&mut self) -> QuicSink {
        QuicSink {
            commands: self.commands.take(),
            cancel: self.cancel.subscribe(),
            ended: false,
        }
    }
}

impl QuicSink {
    fn is_closed(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl StreamSink for QuicSink {
    fn write(&mut self, chunk: Bytes) -> Written {
        if self.ended || self.is_closed() {
            return Box::pin(std::future::ready(Err(TransportError::StreamClosed)));
        }
        let (ack, accepted) = oneshot::channel();
        let queued = self
            .commands
            .as_ref()
            .is_some_and(|commands| commands.send(Command::Data(chunk, ack)).is_ok());
        if !queued {
            return Box::pin(std::future::ready(Err(TransportError::StreamClosed)));
        }
        Box::pin(async move { accepted.await.unwrap_or(Err(TransportError::StreamClosed)) })
    }

    fn end(&mut self) -> Result<(), TransportError> {
        if self.ended {
            return Ok(());
        }
        if self.is_closed() {
            return Err(TransportError::StreamClosed);
        }
        self.ended = true;
        self.commands
            .as_ref()
            .ok_or(TransportError::StreamClosed)?
            .send(Command::End)
            .map_err(|_| TransportError::StreamClosed)
    }
}

async fn drive_stream(
    connection: quinn::Connection,
    headers: Headers,
    id: Arc<OnceLock<u64>>,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    let mut cancelled = cancel.clone();
    let opened = tokio::select! {
        opened = open_bi(&connection, &headers) => opened,
        _ = cancelled.wait_for(|closed| *closed) => return,
    };

    let (send, recv) = match opened {
        Ok(halves) => halves,
        Err(err) => {
            let _ = events.send(StreamEvent::Errored(err));
            return;
        }
    };

    let stream_id = send.id().index();
    let _ = id.set(stream_id);
    trace!(stream_id, "stream ready");
    let _ = events.send(StreamEvent::Ready { id: stream_id });

    tokio::join!(
        pump_writes(send, commands, cancel.clone()),
        pump_reads(recv, cancel, events),
    );
}

/// Open a bidirectional stream and send the request headers on it.
async fn open_bi(
    connection: &quinn::Connection,
    headers: &Headers,
) -> Result<(SendStream, RecvStream), TransportError> {
    let (mut send, recv) = connection
        .open_bi()
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))?;

    let frame = codec::encode_headers(headers).map_err(|e| TransportError::Protocol(e.to_string()))?;
    send.write_all(&frame).await.map_err(write_error)?;
    Ok((send, recv))
}

/// Forward write and half-close commands to the send half.
async fn pump_writes(
    mut send: SendStream,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        // Queued commands win over a dropped handle so a pending end still
        // finishes the stream.
        let command = tokio::select! {
            biased;
            command = commands.recv() => command,
            _ = cancel.wait_for(|closed| *closed) => None,
        };

        match command {
            Some(Command::Data(chunk, ack)) => {
                let written = tokio::select! {
                    written = write_data(&mut send, &chunk) => Some(written),
                    _ = cancel.wait_for(|closed| *closed) => None,
                };
                let Some(written) = written else {
                    let _ = ack.send(Err(TransportError::StreamClosed));
                    let _ = send.reset(code::CANCEL.into());
                    return;
                };
                let failed = written.is_err();
                let _ = ack.send(written);
                if failed {
                    return;
                }
            }
            Some(Command::End) => {
                let _ = send.finish();
                return;
            }
            // Closed, or the sink went away without ending the body.
            None => {
                let _ = send.reset(code::CANCEL.into());
                return;
            }
        }
    }
}

async fn write_data(send: &mut SendStream, chunk: &Bytes) -> Result<(), TransportError> {
    let frames = codec::encode_data(chunk).map_err(|e| TransportError::Protocol(e.to_string()))?;
    send.write_all(&frames).await.map_err(write_error)
}

/// Decode inbound frames into stream events until FIN, error or close.
async fn pump_reads(
    mut recv: RecvStream,
    mut cancel: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    let mut decoder = FrameDecoder::new();

    loop {
        let chunk = tokio::select! {
            chunk = recv.read_chunk(READ_CHUNK, true) => chunk,
            _ = cancel.wait_for(|closed| *closed) => {
                let _ = recv.stop(code::CANCEL.into());
                return;
            }
        };

        match chunk {
            Ok(Some(chunk)) => {
                decoder.extend(&chunk.bytes);
                loop {
                    match decoder.next_frame() {
                        Ok(Some(Decoded::Headers(headers))) => {
                            let _ = events.send(StreamEvent::Response(headers));
                        }
                        Ok(Some(Decoded::Data(data))) => {
                            let _ = events.send(StreamEvent::Data(data));
                        }
                        Ok(None) => break,
                        Err(err) => {
                            let _ = recv.stop(code::FRAME_ERROR.into());
                            let _ = events.send(StreamEvent::Errored(TransportError::Protocol(
                                err.to_string(),
                            )));
                            return;
                        }
                    }
                }
            }
            Ok(None) => {
                let event = if decoder.pending() > 0 {
                    StreamEvent::Errored(TransportError::Protocol(format!(
                        "stream ended inside a frame ({} bytes pending)",
                        decoder.pending()
                    )))
                } else {
                    StreamEvent::Ended
                };
                let _ = events.send(event);
                return;
            }
            Err(err) => {
                let _ = events.send(StreamEvent::Errored(read_error(err)));
                return;
            }
        }
    }
}

fn write_error(err: quinn::WriteError) -> TransportError {
    match err {
        quinn::WriteError::Stopped(code) => TransportError::Reset(code.into_inner()),
        quinn::WriteError::ConnectionLost(e) => TransportError::Connection(e.to_string()),
        quinn::WriteError::ClosedStream => TransportError::StreamClosed,
        other => TransportError::StreamIo(other.to_string()),
    }
}

fn read_error(err: quinn::ReadError) -> TransportError {
    match err {
        quinn::ReadError::Reset(code) => TransportError::Reset(code.into_inner()),
        quinn::ReadError::ConnectionLost(e) => TransportError::Connection(e.to_string()),
        quinn::ReadError::ClosedStream => TransportError::StreamClosed,
        other => TransportError::StreamIo(other.to_string()),
    }
}
