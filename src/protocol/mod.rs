//! Wire protocol: JSON-RPC envelope and frame codec.

pub mod codec;
pub mod message;

pub use codec::{encode_frame, FrameDecoder, DEFAULT_MAX_FRAME_BYTES, MAX_HEADER_LINE_BYTES};
pub use message::{
    error_codes, Message, Notification, Request, RequestId, Response, ResponseError, CANCEL_METHOD,
};
