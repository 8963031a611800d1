use std::collections::VecDeque;
use std::pin::Pin;

use futures::{Stream, StreamExt as _, stream};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::ByteStream;
use crate::decoder::{Frame, FrameDecoder};
use crate::dispatch::frame_fields;
use crate::errors::StreamError;
use crate::event::payload;

pub const PROGRESS_EVENT: &str = "progress";
pub const DONE_EVENT: &str = "done";

/// One status line relayed from the model backend while a model downloads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    /// Set when the backend gave up on the download.
    #[serde(default)]
    pub error: Option<String>,
}

impl PullProgress {
    /// Download progress of the current layer, when sizes are known.
    pub fn percent(&self) -> Option<u8> {
        let total = self.total.filter(|t| *t > 0)?;
        let completed = self.completed.unwrap_or(0).min(total);
        u8::try_from(completed.saturating_mul(100) / total).ok()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PullEvent {
    Progress(PullProgress),
    /// Last event of a successful pull.
    Done { model: String },
}

#[derive(Deserialize)]
struct DonePayload {
    model: String,
}

impl PullEvent {
    /// Decodes a frame of the pull stream. Unknown names yield `Ok(None)`.
    pub fn decode(name: &str, data: &str) -> Result<Option<Self>, StreamError> {
        let event = match name {
            PROGRESS_EVENT => Self::Progress(payload(name, data)?),
            DONE_EVENT => {
                let done: DonePayload = payload(name, data)?;
                Self::Done { model: done.model }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Typed events of a model pull, ending after `done` or the first error.
pub type PullEvents = Pin<Box<dyn Stream<Item = Result<PullEvent, StreamError>> + Send + 'static>>;

struct PullState {
    body: ByteStream,
    decoder: FrameDecoder,
    ready: VecDeque<Result<PullEvent, StreamError>>,
    finished: bool,
}

impl PullState {
    fn push_frames(&mut self, frames: impl IntoIterator<Item = Frame>) {
        for frame in frames {
            if self.finished {
                return;
            }
            let Some((name, data)) = frame_fields(&frame) else {
                continue;
            };
            match PullEvent::decode(name, data) {
                Ok(None) => {}
                Ok(Some(PullEvent::Progress(progress))) if progress.error.is_some() => {
                    let message = progress.error.unwrap_or_default();
                    warn!(%message, "model pull failed");
                    self.fail(StreamError::Server { message });
                }
                Ok(Some(event)) => {
                    if let PullEvent::Done { model } = &event {
                        debug!(%model, "model pull finished");
                        self.finished = true;
                    }
                    self.ready.push_back(Ok(event));
                }
                Err(err) => self.fail(err),
            }
        }
    }

    fn fail(&mut self, err: StreamError) {
        self.finished = true;
        self.ready.push_back(Err(err));
    }
}

/// Decodes a pull progress body into typed events.
///
/// The stream stops after `done`, after a progress line carrying an error,
/// after a malformed payload or after a transport failure. The body is not
/// read past that point.
pub fn pull_events(body: ByteStream) -> PullEvents {
    let state = PullState {
        body,
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.feed(&chunk);
                    state.push_frames(frames);
                }
                Some(Err(err)) => state.fail(err),
                None => {
                    let tail = state.decoder.finish();
                    state.push_frames(tail);
                    state.finished = true;
                }
            }
        }
    }))
}
