use tl_proto::{TlRead, TlWrite};

/// Packets exchanged inside an established ADNL-TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, TlRead, TlWrite)]
#[tl(boxed)]
pub enum Message<'tl> {
    /// `adnl.message.query query_id:int256 query:bytes`
    #[tl(id = 0xb48bf97a)]
    Query {
        query_id: &'tl [u8; 32],
        query: &'tl [u8],
    },
    /// `adnl.message.answer query_id:int256 answer:bytes`
    #[tl(id = 0x0fac8416)]
    Answer {
        query_id: &'tl [u8; 32],
        answer: &'tl [u8],
    },
    #[tl(id = 0x4d082b9a, size_hint = 8)]
    Ping { random_id: u64 },
    #[tl(id = 0xdc69fb03, size_hint = 8)]
    Pong { random_id: u64 },
}
