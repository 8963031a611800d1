use std::fmt;

use futures::{Stream, StreamExt as _};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::decoder::{Frame, FrameDecoder};
use crate::dispatch::{Dispatched, dispatch};
use crate::errors::StreamError;
use crate::event::Event;
use crate::render::RenderTarget;

/// Lifecycle of one streamed reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, no chunk seen yet.
    Open,
    /// At least one chunk has been fed.
    Receiving,
    /// The stream ended normally.
    Completed,
    /// An `error` event, a malformed payload or a transport failure ended it.
    Errored,
    /// The caller aborted it.
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Receiving => "receiving",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Data from the `final` event, when the service sent one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalRecord {
    pub chat_id: Option<i64>,
    pub content: String,
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOutcome {
    pub session_id: uuid::Uuid,
    pub state: SessionState,
    /// Number of `token` events applied.
    pub tokens: u64,
    pub final_record: Option<FinalRecord>,
    /// Set when `state` is `Errored` or `Cancelled`.
    pub error: Option<StreamError>,
}

impl SessionOutcome {
    /// Converts the outcome into a `Result`, failing unless it completed.
    pub fn into_result(self) -> Result<Option<FinalRecord>, StreamError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.final_record),
        }
    }
}

/// Outcome plus the render target handed back to the caller.
#[derive(Debug)]
pub struct SessionReport<R> {
    pub outcome: SessionOutcome,
    pub target: R,
}

/// Handle used to abort a running session from another task.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Creates a connected handle and signal.
    pub fn channel() -> (Self, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, AbortSignal { rx: Some(rx) })
    }

    /// Requests cancellation. Idempotent.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiving side of an `AbortHandle`.
///
/// Dropping every handle does not cancel the session.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

/// One streamed request/response exchange.
///
/// Owns the frame decoder and the render target. Frames are dispatched in
/// arrival order and nothing touches the target once the session is in a
/// terminal state.
pub struct StreamSession<R> {
    id: uuid::Uuid,
    decoder: FrameDecoder,
    target: R,
    state: SessionState,
    tokens: u64,
    final_record: Option<FinalRecord>,
    error: Option<StreamError>,
}

impl<R: RenderTarget> StreamSession<R> {
    pub fn new(target: R) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            decoder: FrameDecoder::new(),
            target,
            state: SessionState::Open,
            tokens: 0,
            final_record: None,
            error: None,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn target(&self) -> &R {
        &self.target
    }

    /// Feeds one body chunk and dispatches every frame it completes.
    ///
    /// Chunks arriving after a terminal state are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> SessionState {
        if self.state.is_terminal() {
            debug!(session_id = %self.id, state = %self.state, len = chunk.len(), "ignoring chunk after terminal state");
            return self.state;
        }
        self.state = SessionState::Receiving;
        for frame in self.decoder.feed(chunk) {
            self.dispatch_frame(&frame);
            if self.state.is_terminal() {
                break;
            }
        }
        self.state
    }

    /// Handles end of stream: flushes a trailing undelimited frame, then
    /// completes unless that frame ended the session.
    pub fn finish(&mut self) -> SessionState {
        if self.state.is_terminal() {
            return self.state;
        }
        if let Some(frame) = self.decoder.finish() {
            self.dispatch_frame(&frame);
        }
        if !self.state.is_terminal() {
            self.state = SessionState::Completed;
            info!(session_id = %self.id, tokens = self.tokens, "stream session completed");
        }
        self.state
    }

    /// Records a transport failure and shows it on the target.
    pub fn fail_transport(&mut self, err: StreamError) -> SessionState {
        if self.state.is_terminal() {
            return self.state;
        }
        warn!(session_id = %self.id, error = %err, "stream transport failed");
        self.target.replace(&err.to_string());
        self.state = SessionState::Errored;
        self.error = Some(err);
        self.state
    }

    /// Stops the session without touching the render target again.
    pub fn cancel(&mut self) -> SessionState {
        if self.state.is_terminal() {
            return self.state;
        }
        info!(session_id = %self.id, tokens = self.tokens, "stream session cancelled");
        self.state = SessionState::Cancelled;
        self.error = Some(StreamError::Cancelled);
        self.state
    }

    /// Drives the session from a chunk stream until it reaches a terminal
    /// state or `abort` fires.
    ///
    /// Chunks are pulled one at a time; the stream is dropped on return,
    /// releasing the underlying connection.
    pub async fn run<S, B>(mut self, stream: S, mut abort: AbortSignal) -> SessionReport<R>
    where
        S: Stream<Item = Result<B, StreamError>>,
        B: AsRef<[u8]>,
    {
        let mut stream = std::pin::pin!(stream);
        debug!(session_id = %self.id, "stream session started");
        while !self.state.is_terminal() {
            tokio::select! {
                biased;
                _ = abort.cancelled() => {
                    self.cancel();
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(chunk)) => {
                            self.feed(chunk.as_ref());
                        }
                        Some(Err(err)) => {
                            self.fail_transport(err);
                        }
                        None => {
                            self.finish();
                        }
                    }
                }
            }
        }
        self.into_report()
    }

    /// Ends the session and returns its outcome with the render target.
    ///
    /// A session that has not reached a terminal state is reported as
    /// cancelled.
    pub fn into_report(mut self) -> SessionReport<R> {
        if !self.state.is_terminal() {
            self.cancel();
        }
        SessionReport {
            outcome: SessionOutcome {
                session_id: self.id,
                state: self.state,
                tokens: self.tokens,
                final_record: self.final_record,
                error: self.error,
            },
            target: self.target,
        }
    }

    fn dispatch_frame(&mut self, frame: &Frame) {
        match dispatch(frame, &mut self.target) {
            Dispatched::Ignored => {}
            Dispatched::Applied(Event::Token { .. }) => {
                self.tokens += 1;
            }
            Dispatched::Applied(Event::Final { chat_id, content }) => {
                self.final_record = Some(FinalRecord { chat_id, content });
            }
            Dispatched::Applied(Event::Error { message }) => {
                warn!(session_id = %self.id, %message, "service reported stream error");
                self.state = SessionState::Errored;
                self.error = Some(StreamError::Server { message });
            }
            Dispatched::Failed(err) => {
                self.state = SessionState::Errored;
                self.error = Some(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::TextBuffer;
    use futures::{StreamExt as _, stream};

    const SCENARIO: [&str; 3] = [
        "event: tok",
        "en\ndata: {\"tok",
        "en\":\"Hel\"}\n\nevent: token\ndata: {\"token\":\"lo\"}\n\n",
    ];

    /// Records every mutation so ordering can be checked.
    #[derive(Default)]
    struct Journal {
        ops: Vec<String>,
    }

    impl RenderTarget for Journal {
        fn append(&mut self, text: &str) {
            self.ops.push(format!("+{text}"));
        }

        fn replace(&mut self, text: &str) {
            self.ops.push(format!("={text}"));
        }
    }

    fn feed_all<R: RenderTarget>(session: &mut StreamSession<R>, chunks: &[&[u8]]) {
        for chunk in chunks {
            session.feed(chunk);
        }
        session.finish();
    }

    #[test]
    fn scenario_chunks_render_hello_in_two_tokens() {
        let mut session = StreamSession::new(Journal::default());
        for chunk in SCENARIO {
            session.feed(chunk.as_bytes());
        }
        assert_eq!(session.state(), SessionState::Receiving);
        assert_eq!(session.finish(), SessionState::Completed);
        let report = session.into_report();
        assert_eq!(report.target.ops, vec!["+Hel", "+lo"]);
        assert_eq!(report.outcome.tokens, 2);
        assert_eq!(report.outcome.error, None);
    }

    #[test]
    fn name_glued_across_chunks_is_a_different_event() {
        // Joined, the first frame's name reads `token: token`, which is unknown.
        let chunks = [
            "event: tok",
            "en: token\ndata: {\"tok",
            "en\":\"Hel\"}\n\nevent: token\ndata: {\"token\":\"lo\"}\n\n",
        ];
        let mut session = StreamSession::new(Journal::default());
        for chunk in chunks {
            session.feed(chunk.as_bytes());
        }
        assert_eq!(session.finish(), SessionState::Completed);
        let report = session.into_report();
        assert_eq!(report.target.ops, vec!["+lo"]);
        assert_eq!(report.outcome.tokens, 1);
    }

    #[test]
    fn event_sequence_is_independent_of_chunk_boundaries() {
        let body = "event: token\ndata: {\"token\":\"¡Hé\"}\n\n: ping\n\nevent: bogus\ndata: 1\n\n\
                    event: token\ndata: {\"token\":\"llo 👋\"}\n\nevent: final\ndata: {\"chat_id\":3,\"content\":\"¡Héllo 👋\"}";
        let bytes = body.as_bytes();

        let mut whole = StreamSession::new(Journal::default());
        feed_all(&mut whole, &[bytes]);
        let expected = whole.into_report();
        assert_eq!(expected.target.ops, vec!["+¡Hé", "+llo 👋"]);
        assert_eq!(
            expected.outcome.final_record,
            Some(FinalRecord {
                chat_id: Some(3),
                content: "¡Héllo 👋".into()
            })
        );

        for size in 1..=7 {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            let mut split = StreamSession::new(Journal::default());
            feed_all(&mut split, &chunks);
            let report = split.into_report();
            assert_eq!(report.target.ops, expected.target.ops, "chunk size {size}");
            assert_eq!(report.outcome.state, SessionState::Completed);
            assert_eq!(report.outcome.final_record, expected.outcome.final_record);
        }
    }

    #[test]
    fn body_with_byte_order_mark_renders_first_token() {
        let mut session = StreamSession::new(TextBuffer::new());
        session.feed(b"\xEF\xBB\xBFevent: token\ndata: {\"token\":\"Hi\"}\n\n");
        assert_eq!(session.finish(), SessionState::Completed);
        assert_eq!(session.target().text(), "Hi");
        assert_eq!(session.target().mutations(), 1);
    }

    #[test]
    fn unknown_event_keeps_session_receiving() {
        let mut session = StreamSession::new(TextBuffer::new());
        let state = session.feed(b"event: bogus\ndata: {\"x\":1}\n\n");
        assert_eq!(state, SessionState::Receiving);
        assert_eq!(session.target().mutations(), 0);
    }

    #[test]
    fn error_event_is_terminal_and_freezes_target() {
        let mut session = StreamSession::new(TextBuffer::new());
        session.feed(b"event: token\ndata: {\"token\":\"partial\"}\n\n");
        let state = session.feed(
            b"event: error\ndata: {\"message\":\"boom\"}\n\nevent: token\ndata: {\"token\":\"late\"}\n\n",
        );
        assert_eq!(state, SessionState::Errored);
        assert_eq!(session.target().text(), "boom");
        let mutations = session.target().mutations();

        session.feed(b"event: token\ndata: {\"token\":\"later\"}\n\n");
        assert_eq!(session.finish(), SessionState::Errored);
        assert_eq!(session.target().text(), "boom");
        assert_eq!(session.target().mutations(), mutations);

        let outcome = session.into_report().outcome;
        assert_eq!(
            outcome.into_result(),
            Err(StreamError::Server {
                message: "boom".into()
            })
        );
    }

    #[test]
    fn malformed_payload_errors_the_session() {
        let mut session = StreamSession::new(TextBuffer::new());
        let state = session.feed(b"event: token\ndata: {}\n\n");
        assert_eq!(state, SessionState::Errored);
        let report = session.into_report();
        assert!(matches!(
            report.outcome.error,
            Some(StreamError::MalformedPayload { .. })
        ));
        assert!(report.target.text().contains("malformed"));
    }

    #[test]
    fn trailing_frame_without_delimiter_is_dispatched_on_finish() {
        let mut session = StreamSession::new(TextBuffer::new());
        session.feed(b"event: token\ndata: {\"token\":\"!\"}");
        assert_eq!(session.target().text(), "");
        assert_eq!(session.finish(), SessionState::Completed);
        assert_eq!(session.target().text(), "!");
    }

    #[test]
    fn trailing_error_frame_on_finish_errors_instead_of_completing() {
        let mut session = StreamSession::new(TextBuffer::new());
        session.feed(b"event: error\ndata: {\"message\":\"offline\"}");
        assert_eq!(session.finish(), SessionState::Errored);
        assert_eq!(session.target().text(), "offline");
    }

    #[test]
    fn cancel_stops_all_mutation() {
        let mut session = StreamSession::new(TextBuffer::new());
        session.feed(b"event: token\ndata: {\"token\":\"a\"}\n\n");
        assert_eq!(session.cancel(), SessionState::Cancelled);
        session.feed(b"event: token\ndata: {\"token\":\"b\"}\n\n");
        session.fail_transport(StreamError::transport("late"));
        let report = session.into_report();
        assert_eq!(report.target.text(), "a");
        assert_eq!(report.outcome.state, SessionState::Cancelled);
        assert_eq!(report.outcome.error, Some(StreamError::Cancelled));
    }

    #[tokio::test]
    async fn run_consumes_stream_to_completion() {
        let chunks = SCENARIO
            .iter()
            .map(|chunk| Ok::<_, StreamError>(chunk.as_bytes().to_vec()))
            .collect::<Vec<_>>();
        let report = StreamSession::new(TextBuffer::new())
            .run(stream::iter(chunks), AbortSignal::never())
            .await;
        assert_eq!(report.outcome.state, SessionState::Completed);
        assert_eq!(report.target.text(), "Hello");
    }

    #[tokio::test]
    async fn run_surfaces_transport_failure_once() {
        let chunks = vec![
            Ok(b"event: token\ndata: {\"token\":\"Hi\"}\n\n".to_vec()),
            Err(StreamError::transport("connection reset")),
            Ok(b"event: token\ndata: {\"token\":\"never\"}\n\n".to_vec()),
        ];
        let report = StreamSession::new(TextBuffer::new())
            .run(stream::iter(chunks), AbortSignal::never())
            .await;
        assert_eq!(report.outcome.state, SessionState::Errored);
        assert_eq!(
            report.outcome.error,
            Some(StreamError::Transport("connection reset".into()))
        );
        assert_eq!(report.target.text(), "transport error: connection reset");
        assert_eq!(report.target.mutations(), 2);
    }

    #[tokio::test]
    async fn run_stops_reading_after_error_event() {
        let chunks = vec![
            Ok::<_, StreamError>(b"event: error\ndata: {\"message\":\"boom\"}\n\n".to_vec()),
            Ok(b"event: token\ndata: {\"token\":\"x\"}\n\n".to_vec()),
        ];
        let mut stream = stream::iter(chunks);
        let report = StreamSession::new(TextBuffer::new())
            .run(stream.by_ref(), AbortSignal::never())
            .await;
        assert_eq!(report.outcome.state, SessionState::Errored);
        assert_eq!(report.target.text(), "boom");
        assert!(stream.next().await.is_some(), "second chunk must stay unread");
    }

    #[tokio::test]
    async fn abort_cancels_a_pending_stream() {
        let (abort, signal) = AbortHandle::channel();
        let first = stream::iter(vec![Ok::<_, StreamError>(
            b"event: token\ndata: {\"token\":\"a\"}\n\n".to_vec(),
        )]);
        let chunks = first.chain(stream::pending());
        let task = tokio::spawn(StreamSession::new(TextBuffer::new()).run(chunks, signal));
        tokio::task::yield_now().await;
        abort.abort();
        assert!(abort.is_aborted());
        let report = task.await.expect("session task");
        assert_eq!(report.outcome.state, SessionState::Cancelled);
        assert_eq!(report.outcome.error, Some(StreamError::Cancelled));
        assert!(report.target.text() == "a" || report.target.text().is_empty());
    }

    #[tokio::test]
    async fn dropped_abort_handle_does_not_cancel() {
        let (abort, signal) = AbortHandle::channel();
        drop(abort);
        let chunks = vec![Ok::<_, StreamError>(
            b"event: token\ndata: {\"token\":\"ok\"}\n\n".to_vec(),
        )];
        let report = StreamSession::new(TextBuffer::new())
            .run(stream::iter(chunks), signal)
            .await;
        assert_eq!(report.outcome.state, SessionState::Completed);
        assert_eq!(report.target.text(), "ok");
    }

    #[test]
    fn sessions_share_no_state() {
        let mut a = StreamSession::new(TextBuffer::new());
        let mut b = StreamSession::new(TextBuffer::new());
        a.feed(b"event: token\ndata: {\"token\":\"a\"}\n\nevent: tok");
        b.feed(b"en: token\ndata: {\"token\":\"b\"}\n\n");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.target().text(), "a");
        assert_eq!(b.target().text(), "");
        assert_eq!(b.state(), SessionState::Receiving);
    }
}
