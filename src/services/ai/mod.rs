//! Streaming completions against an OpenAI-compatible endpoint.
//!
//! Notes:
//! - The wire is plain `reqwest` + `bytes_stream`; decoding is done by
//!   [`StreamDecoder`] so chunk boundaries never matter.
//! - Vendors such as OpenRouter want attribution headers (`HTTP-Referer`,
//!   `X-Title`); credential headers can only come from settings.

mod decoder;
mod request_options;
mod session;
mod transport;
mod types;

pub use decoder::{DecodeEvent, DecodeEvents, StreamDecoder};
pub use session::{
    SessionController, SessionError, SessionOutcome, SessionState, STATUS_DONE,
    STATUS_MISSING_KEY, STATUS_STOPPED, STATUS_STREAMING,
};
pub use transport::{
    ByteStream, CompletionRequest, CompletionTransport, ReqwestTransport, TransportError,
};
pub use types::{ChatMessage, ChatRequest, ChatRequestOptions};
