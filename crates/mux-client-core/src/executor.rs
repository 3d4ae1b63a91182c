//! Issues one request on a pooled session.

use std::time::Duration;

use tracing::{debug, warn};

use crate::authority::Authority;
use crate::body::Body;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::event::{StreamEvent, StreamEvents};
use crate::exchange::{Exchange, Step};
use crate::pool::SessionPool;
use crate::request::RequestParams;
use crate::response::{BodyStream, Response};
use crate::session::SessionFailure;
use crate::timeout::{TimeoutGuard, idle};
use crate::transport::{
    Connector, StreamHandle, StreamSink, TransportError, TransportSession, TransportStream,
};
use crate::upload::{Progress, Upload};

/// Runs requests against sessions obtained from a [`SessionPool`].
pub struct RequestExecutor<C: Connector> {
    pool: SessionPool<C>,
    config: ClientConfig,
}

/// How a request resolved.
enum Outcome<K: StreamSink> {
    Buffered(Response),
    /// Response headers, plus the request body if it is still uploading.
    Streaming(mux_proto::Headers, Option<Upload<K>>),
}

/// Whatever woke the request loop.
enum Wake {
    Event(Option<StreamEvent>),
    Upload(std::result::Result<Progress, TransportError>),
    Idle,
}

impl<C: Connector> RequestExecutor<C> {
    pub fn new(pool: SessionPool<C>, config: ClientConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &SessionPool<C> {
        &self.pool
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send `params` to `authority` and wait for the response.
    ///
    /// Resolves with a buffered or streaming [`Response`] depending on the
    /// effective [`ResponseMode`](crate::ResponseMode). If `params.timeout`
    /// is set and the stream sees no activity for that long before response
    /// headers arrive, the stream is closed and the request fails with
    /// [`ClientError::Timeout`]. Writes of the request body count as
    /// activity only once the transport accepts them.
    pub async fn execute(&self, authority: &Authority, params: RequestParams) -> Result<Response> {
        let RequestParams {
            headers,
            body,
            timeout,
            mode,
        } = params;
        let mut exchange = Exchange::new(mode.unwrap_or(self.config.response_mode));

        let session = self.pool.get_or_create(authority).await?;
        exchange.session_acquired();

        let (mut stream, mut events) = session.open_stream(&headers).map_err(open_failed)?;
        debug!(%authority, stream_id = ?stream.id(), "stream opened");

        let result = drive(
            &mut exchange,
            &mut stream,
            &mut events,
            body,
            timeout.filter(|t| !t.is_zero()).map(TimeoutGuard::new),
        )
        .await;

        match result {
            Ok(Outcome::Buffered(response)) => {
                debug!(%authority, stream_id = ?stream.id(), "response buffered");
                Ok(response)
            }
            Ok(Outcome::Streaming(headers, upload)) => {
                debug!(
                    %authority,
                    stream_id = ?stream.id(),
                    uploading = upload.is_some(),
                    "response streaming"
                );
                let upload = upload.map(|upload| tokio::spawn(finish_upload(stream.id(), upload)));
                let body = BodyStream::new(Box::new(stream), events, upload);
                Ok(Response::streaming(headers, body))
            }
            Err(err) => {
                exchange.mark_failed();
                stream.close();
                debug!(%authority, error = %err, "request failed");
                Err(err)
            }
        }
    }
}

/// A session that went away between acquisition and stream open is a
/// session failure, not a stream one.
fn open_failed(err: TransportError) -> ClientError {
    match err {
        TransportError::NotConnected => SessionFailure::Closed.into(),
        other => other.into(),
    }
}

/// Feed stream events through `exchange` until the request resolves.
///
/// Body writes, stream events and the idle guard are raced in one loop, so
/// a peer that stops reading cannot hold the request past its timeout.
async fn drive<S: TransportStream>(
    exchange: &mut Exchange,
    stream: &mut S,
    events: &mut StreamEvents,
    body: Option<Body>,
    mut guard: Option<TimeoutGuard>,
) -> Result<Outcome<S::Sink>> {
    let mut unsent = Some(Upload::new(stream.sink(), body));
    let mut upload = None;

    if let Step::SendBody = exchange.stream_opened(stream.id().is_some()) {
        exchange.body_started();
        upload = unsent.take();
    }

    loop {
        let wake = tokio::select! {
            event = events.recv() => Wake::Event(event),
            progress = advance(&mut upload), if upload.is_some() => Wake::Upload(progress),
            () = idle(&mut guard), if !exchange.responded() => Wake::Idle,
        };

        match wake {
            Wake::Event(None) => return Err(TransportError::StreamClosed.into()),
            Wake::Event(Some(event)) => {
                if let Some(guard) = guard.as_mut() {
                    guard.touch();
                }
                match exchange.on_event(event) {
                    Step::Continue => {}
                    Step::SendBody => {
                        exchange.body_started();
                        upload = unsent.take();
                    }
                    Step::Stream(headers) => {
                        return Ok(Outcome::Streaming(headers, upload.take()));
                    }
                    Step::Complete(headers, bytes) => {
                        return Ok(Outcome::Buffered(Response::buffered(headers, bytes)));
                    }
                    Step::Fail(err) => return Err(err),
                }
            }
            Wake::Upload(Ok(progress)) => {
                if let Some(guard) = guard.as_mut() {
                    guard.touch();
                }
                if progress == Progress::Finished {
                    upload = None;
                    exchange.body_finished();
                }
            }
            Wake::Upload(Err(err)) => return Err(err.into()),
            Wake::Idle => {
                let duration = guard
                    .as_ref()
                    .map(TimeoutGuard::duration)
                    .unwrap_or(Duration::ZERO);
                warn!(
                    stream_id = ?stream.id(),
                    timeout_ms = duration.as_millis() as u64,
                    "stream idle timeout"
                );
                return Err(ClientError::Timeout(duration));
            }
        }
    }
}

async fn advance<K: StreamSink>(
    upload: &mut Option<Upload<K>>,
) -> std::result::Result<Progress, TransportError> {
    match upload {
        Some(upload) => upload.advance().await,
        None => std::future::pending().await,
    }
}

/// Send the rest of a request body after its response was handed over.
async fn finish_upload<K: StreamSink>(stream_id: Option<u64>, upload: Upload<K>) {
    match upload.finish().await {
        Ok(()) => debug!(?stream_id, "request body finished after response"),
        Err(err) => warn!(?stream_id, error = %err, "request body upload failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use mux_proto::Headers;

    use super::*;
    use crate::body::BodySource;
    use crate::config::ResponseMode;
    use crate::event::SessionEvent;
    use crate::mock::{MockConnector, Script, settle};

    fn executor(connector: &MockConnector) -> RequestExecutor<MockConnector> {
        RequestExecutor::new(SessionPool::new(connector.clone()), ClientConfig::default())
    }

    fn authority() -> Authority {
        Authority::from("mock://origin")
    }

    fn respond(content_type: &str, chunks: &[&'static str]) -> Script {
        Script::Respond {
            headers: Headers::from([(":status", "200"), ("content-type", content_type)]),
            chunks: chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect(),
        }
    }

    #[tokio::test]
    async fn buffered_response_concatenates_chunks() {
        let connector = MockConnector::with_script(respond("text/plain", &["hel", "lo ", "world"]));
        let executor = executor(&connector);

        let response = executor
            .execute(&authority(), RequestParams::new().header(":path", "/"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), Some(200));
        assert!(!response.is_streaming());
        assert_eq!(response.bytes().await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn request_headers_and_body_reach_the_stream() {
        let connector = MockConnector::with_script(Script::Echo);
        let executor = executor(&connector);

        executor
            .execute(
                &authority(),
                RequestParams::new()
                    .header(":method", "POST")
                    .body("payload"),
            )
            .await
            .unwrap();

        let log = connector.session(0).stream_log(0);
        assert_eq!(log.headers.get(":method"), Some("POST"));
        assert_eq!(log.written, "payload");
        assert!(log.ended);
    }

    #[tokio::test]
    async fn streaming_mode_hands_over_undrained_stream() {
        let connector = MockConnector::with_script(respond("application/json", &["a", "b"]));
        let executor = executor(&connector);

        let response = executor
            .execute(
                &authority(),
                RequestParams::new().mode(ResponseMode::Streaming),
            )
            .await
            .unwrap();

        assert!(response.is_streaming());
        let mut body = response.into_stream().expect("streaming body");
        assert_eq!(body.next_chunk().await.unwrap().unwrap(), "a");
        assert_eq!(body.next_chunk().await.unwrap().unwrap(), "b");
        assert!(body.next_chunk().await.unwrap().is_none());
        assert!(body.is_finished());
    }

    #[tokio::test]
    async fn content_type_mode_streams_event_streams_only() {
        let connector = MockConnector::with_script(respond("text/event-stream", &["data: 1\n\n"]));
        let executor = RequestExecutor::new(
            SessionPool::new(connector.clone()),
            ClientConfig::default().with_response_mode(ResponseMode::ContentType),
        );

        let response = executor.execute(&authority(), RequestParams::new()).await.unwrap();
        assert!(response.is_streaming());
        assert_eq!(response.text().await.unwrap(), "data: 1\n\n");
    }

    #[tokio::test]
    async fn body_waits_for_ready_when_id_is_deferred() {
        let connector = MockConnector::with_script(Script::Echo);
        let executor = executor(&connector);

        let response = executor
            .execute(&authority(), RequestParams::new().body("deferred"))
            .await
            .unwrap();
        assert_eq!(response.bytes().await.unwrap(), "deferred");
    }

    #[tokio::test]
    async fn body_sent_at_once_when_id_is_assigned() {
        let connector = MockConnector::with_script(Script::Echo).ready_immediately();
        let executor = executor(&connector);

        let response = executor
            .execute(&authority(), RequestParams::new().body(vec![1u8, 2, 3]))
            .await
            .unwrap();
        assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(&[1, 2, 3]));
    }

    #[tokio::test]
    async fn piped_body_is_sent_in_order_then_ended() {
        let connector = MockConnector::with_script(Script::Echo);
        let executor = executor(&connector);

        let (tx, source) = BodySource::channel(4);
        let feeder = tokio::spawn(async move {
            for chunk in ["one ", "two ", "three"] {
                tx.send(chunk).await.unwrap();
            }
        });

        let response = executor
            .execute(&authority(), RequestParams::new().body(source))
            .await
            .unwrap();
        feeder.await.unwrap();

        assert_eq!(response.bytes().await.unwrap(), "one two three");
        assert!(connector.session(0).stream_log(0).ended);
    }

    #[tokio::test]
    async fn failing_body_source_fails_request_and_closes_stream() {
        let connector = MockConnector::with_script(Script::Silent);
        let executor = executor(&connector);

        let (tx, source) = BodySource::channel(1);
        tx.abort(std::io::Error::other("disk gone")).await;

        let err = executor
            .execute(&authority(), RequestParams::new().body(source))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Stream(TransportError::StreamIo(_))));
        assert!(connector.session(0).stream_log(0).closed);
    }

    #[tokio::test]
    async fn idle_stream_times_out_and_is_closed() {
        let connector = MockConnector::with_script(Script::Silent);
        let executor = executor(&connector);
        let started = tokio::time::Instant::now();

        let err = executor
            .execute(
                &authority(),
                RequestParams::new().timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(err.name(), "TimeoutError");
        assert_eq!(
            err.to_string(),
            "Stream timed out because of no activity for 50 ms"
        );
        assert!(connector.session(0).stream_log(0).closed);
        // A stream timeout does not poison the session.
        assert!(executor.pool().contains(&authority()));
    }

    #[tokio::test]
    async fn stalled_upload_still_times_out() {
        let connector = MockConnector::with_script(Script::Silent).stall_writes();
        let executor = executor(&connector);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            executor.execute(
                &authority(),
                RequestParams::new()
                    .body(vec![7u8; 256 * 1024])
                    .timeout(Duration::from_millis(50)),
            ),
        )
        .await
        .expect("guard should fire while the write is pending");

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(connector.session(0).stream_log(0).closed);
    }

    #[tokio::test]
    async fn early_response_is_seen_while_upload_is_stalled() {
        let connector = MockConnector::with_script(Script::Respond {
            headers: Headers::from([(":status", "413")]),
            chunks: vec![Bytes::from_static(b"too large")],
        })
        .stall_writes();
        let executor = executor(&connector);

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            executor.execute(&authority(), RequestParams::new().body(vec![0u8; 1024])),
        )
        .await
        .expect("response should not wait for the upload")
        .unwrap();

        assert_eq!(response.status(), Some(413));
        assert_eq!(response.bytes().await.unwrap(), "too large");
    }

    #[tokio::test]
    async fn streaming_response_is_handed_over_while_body_uploads() {
        let connector = MockConnector::with_script(respond("application/json", &["a"]));
        let executor = executor(&connector);
        let (tx, source) = BodySource::channel(1);

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            executor.execute(
                &authority(),
                RequestParams::new()
                    .mode(ResponseMode::Streaming)
                    .body(source),
            ),
        )
        .await
        .expect("handover should not wait for the body")
        .unwrap();

        let mut body = response.into_stream().expect("streaming body");
        assert!(body.is_uploading());
        assert_eq!(body.next_chunk().await.unwrap().unwrap(), "a");
        assert!(body.next_chunk().await.unwrap().is_none());

        tx.send("late").await.unwrap();
        drop(tx);
        settle().await;

        let log = connector.session(0).stream_log(0);
        assert_eq!(log.written, "late");
        assert!(log.ended);
        assert!(!body.is_uploading());
    }

    #[tokio::test]
    async fn zero_timeout_disables_the_guard() {
        let connector = MockConnector::with_script(Script::Silent);
        let executor = executor(&connector);

        let raced = tokio::time::timeout(
            Duration::from_millis(100),
            executor.execute(&authority(), RequestParams::new().timeout(Duration::ZERO)),
        )
        .await;
        assert!(raced.is_err(), "a zero timeout must not fire");
    }

    #[tokio::test]
    async fn session_gone_at_stream_open_is_a_session_failure() {
        let connector = MockConnector::with_script(Script::Silent).refuse_streams();
        let executor = executor(&connector);

        let err = executor
            .execute(&authority(), RequestParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Session(SessionFailure::Closed)));
        assert_eq!(err.name(), "SessionFailure");
    }

    #[tokio::test]
    async fn timeout_has_no_effect_after_response() {
        let connector = MockConnector::with_script(respond("text/plain", &["fast"]));
        let executor = executor(&connector);

        let response = executor
            .execute(
                &authority(),
                RequestParams::new().timeout(Duration::from_millis(20)),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(response.bytes().await.unwrap(), "fast");
    }

    #[tokio::test]
    async fn stream_error_surfaces_raw_transport_error() {
        let connector = MockConnector::with_script(Script::Fail(TransportError::Reset(8)));
        let executor = executor(&connector);

        let err = executor
            .execute(&authority(), RequestParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Stream(TransportError::Reset(8))));
        assert_eq!(err.name(), "StreamFailure");
    }

    #[tokio::test]
    async fn session_failure_rejects_before_opening_a_stream() {
        let connector = MockConnector::manual();
        let executor = executor(&connector);

        let authority = authority();
        let (result, ()) = tokio::join!(
            executor.execute(&authority, RequestParams::new()),
            async {
                settle().await;
                connector
                    .session(0)
                    .emit(SessionEvent::GoAway { code: 0 });
            }
        );

        let err = result.unwrap_err();
        assert_eq!(err.name(), "SessionFailure");
        assert_eq!(connector.session(0).stream_count(), 0);
    }
}
