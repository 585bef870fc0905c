//! TL schemas spoken over ADNL-TCP: transport messages and the liteserver API

pub mod adnl;
pub mod error;
pub mod lite;

#[cfg(test)]
mod tests;

pub use adnl::Message;
pub use error::TlError;
pub use lite::{
    BlockIdExt, LiteQuery, MasterchainInfo, Request, Response, Version, ZeroStateIdExt,
};

// Re-export from tl_proto for convenience
pub use tl_proto::{TlRead, TlWrite};
