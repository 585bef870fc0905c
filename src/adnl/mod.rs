//! Thanks to https://github.com/tonstack/adnl-rs

pub mod crypto;
pub mod helper_types;
pub mod primitives;
pub mod wrappers;

#[cfg(test)]
mod tests;

pub use helper_types::{AdnlAddress, AdnlAesParams, AdnlError};
pub use primitives::codec::AdnlCodec;
pub use primitives::handshake::AdnlHandshake;
pub use wrappers::peer::AdnlPeer;
