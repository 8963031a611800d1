//! Client for the local PrivateSpark chat assistant service.
//!
//! The core is the streamed reply pipeline: body chunks go through a
//! [`FrameDecoder`], each frame is parsed into an [`Event`] and applied to a
//! [`RenderTarget`] by a [`StreamSession`], strictly in arrival order.
//!
//! ```no_run
//! use spark_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = SparkClient::from_env()?;
//! let request = ChatRequest::user(1, "Summarize my notes").model("llama3.1:latest");
//!
//! let run = client.chat(&request, TextBuffer::new()).await?;
//! let report = run.wait().await;
//! println!("{}", report.target.text());
//! report.outcome.into_result()?;
//! # Ok(())
//! # }
//! ```

/// Request and response bodies of the service API.
pub mod api;
/// HTTP client and chat transport seam.
pub mod client;
/// Connection settings.
pub mod config;
/// Blank-line frame decoder.
pub mod decoder;
/// Frame parsing and event application.
pub mod dispatch;
/// Public error types.
pub mod errors;
/// Typed stream events and payload schemas.
pub mod event;
/// Common imports for typical usage.
pub mod prelude;
/// Model download progress stream.
pub mod pull;
/// Render target contract and the in-memory sink.
pub mod render;
/// Stream session state machine and cancellation.
pub mod session;

pub use api::{ChatMessage, ChatRequest};
pub use client::{ByteStream, ChatRun, ChatTransport, SparkClient, start_chat};
pub use config::ClientConfig;
pub use decoder::{Frame, FrameDecoder};
pub use dispatch::Dispatched;
pub use errors::{ClientError, StreamError};
pub use event::Event;
pub use pull::{PullEvent, PullEvents, PullProgress};
pub use render::{RenderTarget, TextBuffer};
pub use session::{
    AbortHandle, AbortSignal, FinalRecord, SessionOutcome, SessionReport, SessionState,
    StreamSession,
};
