use std::fmt;
use tl_proto::{TlRead, TlWrite};

/// `liteServer.query data:bytes`, the envelope of every liteserver request
#[derive(Debug, Clone, Copy, PartialEq, Eq, TlRead, TlWrite)]
#[tl(boxed, id = 0x798c06df)]
pub struct LiteQuery<'tl> {
    pub data: &'tl [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TlRead, TlWrite)]
#[tl(boxed)]
pub enum Request {
    #[tl(id = 0x16ad5a34)]
    GetTime,
    #[tl(id = 0x232b940b)]
    GetVersion,
    #[tl(id = 0x89b5e62e)]
    GetMasterchainInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TlRead, TlWrite)]
#[tl(boxed)]
pub enum Response<'tl> {
    #[tl(id = 0xe953000d, size_hint = 4)]
    CurrentTime { now: u32 },
    #[tl(id = 0x5a0491e5, size_hint = 20)]
    Version {
        mode: u32,
        version: u32,
        capabilities: u64,
        now: u32,
    },
    #[tl(id = 0x85832881)]
    MasterchainInfo {
        last: BlockIdExt,
        state_root_hash: [u8; 32],
        init: ZeroStateIdExt,
    },
    #[tl(id = 0xbba9e148)]
    Error { code: i32, message: &'tl [u8] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TlRead, TlWrite)]
pub struct BlockIdExt {
    pub workchain: i32,
    pub shard: i64,
    pub seqno: u32,
    pub root_hash: [u8; 32],
    pub file_hash: [u8; 32],
}

impl fmt::Display for BlockIdExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}:{:016x}:{}):{}:{}",
            self.workchain,
            self.shard as u64,
            self.seqno,
            hex::encode(self.root_hash),
            hex::encode(self.file_hash)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TlRead, TlWrite)]
pub struct ZeroStateIdExt {
    pub workchain: i32,
    pub root_hash: [u8; 32],
    pub file_hash: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub mode: u32,
    pub version: u32,
    pub capabilities: u64,
    pub now: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterchainInfo {
    pub last: BlockIdExt,
    pub state_root_hash: [u8; 32],
    pub init: ZeroStateIdExt,
}

impl fmt::Display for MasterchainInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "last {} state {}",
            self.last,
            hex::encode(self.state_root_hash)
        )
    }
}
