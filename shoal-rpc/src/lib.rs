//! # Shoal RPC
//!
//! Wire transport for the admin capability of the coordinating node.
//!
//! The channel speaks a line-oriented protocol: requests are procedure-call
//! expressions, replies are hex-payload envelopes bracketed by fixed marker
//! lines. [`AdminChannel`] implements [`shoal_core::AdminApi`] on top of any
//! async byte stream; production use connects it over TCP.

pub mod channel;
pub mod envelope;

pub use channel::AdminChannel;
pub use envelope::{
    call_expr, decode_envelope, encode_envelope, RemoteReply, REPLY_HEADER, REPLY_SENTINEL,
};
