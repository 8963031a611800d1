//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, ChatMessage, ChatRequest, ChatRun, ClientConfig, ClientError, PullEvent,
    RenderTarget, SessionOutcome, SessionState, SparkClient, StreamError, TextBuffer,
};
