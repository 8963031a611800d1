use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::errors::StreamError;

pub const TOKEN_EVENT: &str = "token";
pub const ERROR_EVENT: &str = "error";
pub const FINAL_EVENT: &str = "final";

/// Typed event decoded from one frame of the chat stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Next piece of the reply text.
    Token { text: String },
    /// The service gave up; `message` replaces the reply.
    Error { message: String },
    /// Sent once after the last token with the stored chat id and full text.
    Final {
        chat_id: Option<i64>,
        content: String,
    },
}

#[derive(Deserialize)]
struct TokenPayload {
    token: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

#[derive(Deserialize)]
struct FinalPayload {
    #[serde(default)]
    chat_id: Option<i64>,
    content: String,
}

impl Event {
    /// Decodes the payload of a named event.
    ///
    /// Unknown names yield `Ok(None)` without looking at `data`. A known
    /// name whose payload is not JSON, or lacks a required field, is a
    /// protocol violation.
    pub fn decode(name: &str, data: &str) -> Result<Option<Self>, StreamError> {
        let event = match name {
            TOKEN_EVENT => {
                let payload: TokenPayload = payload(name, data)?;
                Self::Token {
                    text: payload.token,
                }
            }
            ERROR_EVENT => {
                let payload: ErrorPayload = payload(name, data)?;
                Self::Error {
                    message: payload.message,
                }
            }
            FINAL_EVENT => {
                let payload: FinalPayload = payload(name, data)?;
                Self::Final {
                    chat_id: payload.chat_id,
                    content: payload.content,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Wire name of this event kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Token { .. } => TOKEN_EVENT,
            Self::Error { .. } => ERROR_EVENT,
            Self::Final { .. } => FINAL_EVENT,
        }
    }
}

pub(crate) fn payload<T: DeserializeOwned>(name: &str, data: &str) -> Result<T, StreamError> {
    serde_json::from_str(data).map_err(|e| StreamError::malformed(name, e))
}
