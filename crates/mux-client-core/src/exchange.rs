//! Per-request state machine.
//!
//! `Init → SessionAcquired → StreamOpened → BodySent → AwaitingResponse →
//! Responded → {Buffered | Streaming}`, with `Failed` reachable from every
//! non-terminal phase. [`Exchange`] owns no I/O: the executor feeds it stream
//! events and acts on the returned [`Step`].

use bytes::{Bytes, BytesMut};
use mux_proto::Headers;

use crate::config::ResponseMode;
use crate::error::ClientError;
use crate::event::StreamEvent;
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Init,
    SessionAcquired,
    StreamOpened,
    BodySent,
    AwaitingResponse,
    Responded,
    Buffered,
    Streaming,
    Failed,
}

impl RequestPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestPhase::Buffered | RequestPhase::Streaming | RequestPhase::Failed
        )
    }
}

/// What the executor should do next.
#[derive(Debug)]
pub enum Step {
    /// Nothing to do; wait for the next event.
    Continue,
    /// The stream is writable; send the request body.
    SendBody,
    /// Resolve now, handing the live stream to the caller.
    Stream(Headers),
    /// The body is complete; resolve with it.
    Complete(Headers, Bytes),
    /// The request failed.
    Fail(ClientError),
}

/// Request lifecycle driven by stream events.
#[derive(Debug)]
pub struct Exchange {
    phase: RequestPhase,
    mode: ResponseMode,
    headers: Option<Headers>,
    body: BytesMut,
}

impl Exchange {
    pub fn new(mode: ResponseMode) -> Self {
        Self {
            phase: RequestPhase::Init,
            mode,
            headers: None,
            body: BytesMut::new(),
        }
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// True once response headers have been received.
    pub fn responded(&self) -> bool {
        matches!(
            self.phase,
            RequestPhase::Responded | RequestPhase::Buffered | RequestPhase::Streaming
        )
    }

    pub fn session_acquired(&mut self) {
        if self.phase == RequestPhase::Init {
            self.phase = RequestPhase::SessionAcquired;
        }
    }

    /// The stream exists. If the transport already assigned it an id the
    /// body may go out immediately; otherwise wait for `Ready`.
    pub fn stream_opened(&mut self, ready: bool) -> Step {
        if self.phase != RequestPhase::SessionAcquired {
            return Step::Continue;
        }
        self.phase = RequestPhase::StreamOpened;
        if ready { Step::SendBody } else { Step::Continue }
    }

    /// Body transmission has begun.
    pub fn body_started(&mut self) {
        if self.phase == RequestPhase::StreamOpened {
            self.phase = RequestPhase::BodySent;
        }
    }

    /// The write side has been half-closed.
    pub fn body_finished(&mut self) {
        if self.phase == RequestPhase::BodySent {
            self.phase = RequestPhase::AwaitingResponse;
        }
    }

    pub fn mark_failed(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RequestPhase::Failed;
        }
    }

    /// Apply one stream event.
    pub fn on_event(&mut self, event: StreamEvent) -> Step {
        if self.phase.is_terminal() {
            return Step::Continue;
        }

        match event {
            StreamEvent::Ready { .. } => {
                if self.phase == RequestPhase::StreamOpened {
                    Step::SendBody
                } else {
                    Step::Continue
                }
            }
            StreamEvent::Response(headers) => self.on_response(headers),
            StreamEvent::Data(chunk) => {
                if self.phase == RequestPhase::Responded {
                    self.body.extend_from_slice(&chunk);
                    Step::Continue
                } else {
                    self.fail(TransportError::Protocol(
                        "data received before response headers".into(),
                    ))
                }
            }
            StreamEvent::Ended => {
                if self.phase == RequestPhase::Responded {
                    self.phase = RequestPhase::Buffered;
                    let headers = self.headers.take().unwrap_or_default();
                    Step::Complete(headers, self.body.split().freeze())
                } else {
                    self.fail(TransportError::Protocol(
                        "stream ended before response headers".into(),
                    ))
                }
            }
            StreamEvent::Errored(err) => self.fail(err),
        }
    }

    fn on_response(&mut self, headers: Headers) -> Step {
        match self.phase {
            RequestPhase::StreamOpened
            | RequestPhase::BodySent
            | RequestPhase::AwaitingResponse => {
                if self.mode.streams(&headers) {
                    self.phase = RequestPhase::Streaming;
                    Step::Stream(headers)
                } else {
                    self.phase = RequestPhase::Responded;
                    self.headers = Some(headers);
                    Step::Continue
                }
            }
            // A second header block is a trailer; not surfaced.
            _ => Step::Continue,
        }
    }

    fn fail(&mut self, err: TransportError) -> Step {
        self.phase = RequestPhase::Failed;
        Step::Fail(ClientError::Stream(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened(mode: ResponseMode, ready: bool) -> (Exchange, Step) {
        let mut exchange = Exchange::new(mode);
        exchange.session_acquired();
        let step = exchange.stream_opened(ready);
        (exchange, step)
    }

    fn ok_headers(content_type: &str) -> Headers {
        Headers::from([(":status", "200"), ("content-type", content_type)])
    }

    #[test]
    fn ready_stream_sends_body_immediately() {
        let (exchange, step) = opened(ResponseMode::Buffered, true);
        assert!(matches!(step, Step::SendBody));
        assert_eq!(exchange.phase(), RequestPhase::StreamOpened);
    }

    #[test]
    fn unready_stream_waits_for_ready_event() {
        let (mut exchange, step) = opened(ResponseMode::Buffered, false);
        assert!(matches!(step, Step::Continue));
        assert!(matches!(
            exchange.on_event(StreamEvent::Ready { id: 1 }),
            Step::SendBody
        ));

        exchange.body_started();
        // A duplicate ready must not resend the body.
        assert!(matches!(
            exchange.on_event(StreamEvent::Ready { id: 1 }),
            Step::Continue
        ));
    }

    #[test]
    fn buffered_mode_concatenates_chunks_in_order() {
        let (mut exchange, _) = opened(ResponseMode::Buffered, true);
        exchange.body_started();
        exchange.body_finished();
        assert_eq!(exchange.phase(), RequestPhase::AwaitingResponse);

        assert!(matches!(
            exchange.on_event(StreamEvent::Response(ok_headers("text/plain"))),
            Step::Continue
        ));
        assert!(exchange.responded());
        for chunk in ["he", "ll", "o"] {
            exchange.on_event(StreamEvent::Data(Bytes::from(chunk)));
        }

        match exchange.on_event(StreamEvent::Ended) {
            Step::Complete(headers, body) => {
                assert_eq!(headers.get(":status"), Some("200"));
                assert_eq!(body, "hello");
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(exchange.phase(), RequestPhase::Buffered);
    }

    #[test]
    fn content_type_mode_streams_on_stream_content() {
        let (mut exchange, _) = opened(ResponseMode::ContentType, true);
        exchange.body_started();
        exchange.body_finished();

        let step = exchange.on_event(StreamEvent::Response(ok_headers("text/event-stream")));
        assert!(matches!(step, Step::Stream(_)));
        assert_eq!(exchange.phase(), RequestPhase::Streaming);

        // Terminal: later events are ignored.
        assert!(matches!(
            exchange.on_event(StreamEvent::Data(Bytes::from_static(b"x"))),
            Step::Continue
        ));
    }

    #[test]
    fn response_may_arrive_while_body_is_still_sending() {
        let (mut exchange, _) = opened(ResponseMode::Streaming, true);
        exchange.body_started();
        let step = exchange.on_event(StreamEvent::Response(ok_headers("application/json")));
        assert!(matches!(step, Step::Stream(_)));
    }

    #[test]
    fn trailers_are_ignored() {
        let (mut exchange, _) = opened(ResponseMode::Buffered, true);
        exchange.body_started();
        exchange.on_event(StreamEvent::Response(ok_headers("text/plain")));
        exchange.on_event(StreamEvent::Data(Bytes::from_static(b"a")));
        exchange.on_event(StreamEvent::Response(Headers::from([("grpc-status", "0")])));

        match exchange.on_event(StreamEvent::Ended) {
            Step::Complete(headers, body) => {
                assert!(headers.get("grpc-status").is_none());
                assert_eq!(body, "a");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn stream_error_fails_with_raw_transport_error() {
        let (mut exchange, _) = opened(ResponseMode::Buffered, true);
        exchange.body_started();
        match exchange.on_event(StreamEvent::Errored(TransportError::Reset(8))) {
            Step::Fail(ClientError::Stream(TransportError::Reset(8))) => {}
            other => panic!("expected stream failure, got {other:?}"),
        }
        assert_eq!(exchange.phase(), RequestPhase::Failed);
    }

    #[test]
    fn end_before_headers_is_a_stream_failure() {
        let (mut exchange, _) = opened(ResponseMode::Buffered, true);
        exchange.body_started();
        exchange.body_finished();
        assert!(matches!(
            exchange.on_event(StreamEvent::Ended),
            Step::Fail(ClientError::Stream(TransportError::Protocol(_)))
        ));
    }

    #[test]
    fn data_before_headers_is_a_stream_failure() {
        let (mut exchange, _) = opened(ResponseMode::Buffered, true);
        exchange.body_started();
        assert!(matches!(
            exchange.on_event(StreamEvent::Data(Bytes::from_static(b"early"))),
            Step::Fail(_)
        ));
    }
}
