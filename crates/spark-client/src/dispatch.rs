use tracing::{debug, warn};

use crate::decoder::Frame;
use crate::errors::StreamError;
use crate::event::Event;
use crate::render::RenderTarget;

const EVENT_FIELD: &str = "event: ";
const DATA_FIELD: &str = "data: ";

/// Result of handing one frame to the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatched {
    /// Keepalive, partial or unknown frame. Nothing changed.
    Ignored,
    /// The event was applied to the render target.
    Applied(Event),
    /// The frame violated the protocol. The target now shows the error.
    Failed(StreamError),
}

impl Dispatched {
    /// Whether the session must stop processing frames.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Applied(Event::Error { .. }) | Self::Failed(_)
        )
    }
}

/// Extracts the event name and payload from a frame.
///
/// The first `event: ` line and the first `data: ` line are used, in either
/// order. A frame missing either one is not an event.
pub fn frame_fields(frame: &Frame) -> Option<(&str, &str)> {
    let mut name = None;
    let mut data = None;
    for line in frame.lines() {
        if name.is_none()
            && let Some(rest) = line.strip_prefix(EVENT_FIELD)
        {
            name = Some(rest.trim());
        } else if data.is_none()
            && let Some(rest) = line.strip_prefix(DATA_FIELD)
        {
            data = Some(rest);
        }
        if name.is_some() && data.is_some() {
            break;
        }
    }
    match (name, data) {
        (Some(name), Some(data)) if !name.is_empty() && !data.is_empty() => Some((name, data)),
        _ => None,
    }
}

/// Parses a frame into zero or one typed event.
pub fn parse_frame(frame: &Frame) -> Result<Option<Event>, StreamError> {
    match frame_fields(frame) {
        Some((name, data)) => Event::decode(name, data),
        None => Ok(None),
    }
}

/// Applies an event to the render target.
pub fn apply<R: RenderTarget + ?Sized>(event: &Event, target: &mut R) {
    match event {
        Event::Token { text } => target.append(text),
        Event::Error { message } => target.replace(message),
        Event::Final { .. } => {}
    }
}

/// Parses and applies one frame.
///
/// A malformed payload is turned into a visible error here instead of being
/// propagated further.
pub fn dispatch<R: RenderTarget + ?Sized>(frame: &Frame, target: &mut R) -> Dispatched {
    match parse_frame(frame) {
        Ok(Some(event)) => {
            debug!(event = event.name(), "dispatching stream event");
            apply(&event, target);
            Dispatched::Applied(event)
        }
        Ok(None) => Dispatched::Ignored,
        Err(err) => {
            warn!(error = %err, "dropping session on malformed frame");
            target.replace(&err.to_string());
            Dispatched::Failed(err)
        }
    }
}
