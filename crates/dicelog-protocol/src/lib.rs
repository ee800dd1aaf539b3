//! Wire protocol for DiceLog.
//!
//! This crate defines what the client and server say to each other:
//!
//! - **Types** ([`TokenMessage`], [`DiscordCommand`], [`DiscordResponse`],
//!   [`AuthMessage`], [`AuthResponse`], [`Ack`]): one struct per message
//!   kind, each mapped to a fixed JSON object shape.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (one frame of bytes per
//! message) and the protocol engines. It knows nothing about sessions or
//! sockets.
//!
//! ```text
//! Transport (frame) → Protocol (typed message) → Engine (state machine)
//! ```
//!
//! Decoding returns `Result<T, ProtocolError>`. An `Err` is the
//! "malformed" marker the engines react to; it is never confused with a
//! well-formed message whose nullable fields happen to be `null`.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Ack, AuthMessage, AuthResponse, DiscordCommand, DiscordResponse,
    TokenMessage,
};
