//! Tests for TL (Type Language) module

use crate::tl::*;

fn block_id(seqno: u32) -> BlockIdExt {
    BlockIdExt {
        workchain: -1,
        shard: 0x8000000000000000u64 as i64,
        seqno,
        root_hash: [0xAB; 32],
        file_hash: [0xCD; 32],
    }
}

#[test]
fn test_request_ids_on_wire() {
    assert_eq!(
        tl_proto::serialize(Request::GetTime),
        0x16ad5a34u32.to_le_bytes()
    );
    assert_eq!(
        tl_proto::serialize(Request::GetVersion),
        0x232b940bu32.to_le_bytes()
    );
    assert_eq!(
        tl_proto::serialize(Request::GetMasterchainInfo),
        0x89b5e62eu32.to_le_bytes()
    );
}

#[test]
fn test_lite_query_wraps_bytes() {
    let inner = tl_proto::serialize(Request::GetTime);
    let wrapped = tl_proto::serialize(LiteQuery { data: &inner });

    let mut expected = 0x798c06dfu32.to_le_bytes().to_vec();
    expected.push(4);
    expected.extend_from_slice(&inner);
    expected.extend_from_slice(&[0, 0, 0]);
    assert_eq!(wrapped, expected);

    let parsed = tl_proto::deserialize::<LiteQuery>(&wrapped).unwrap();
    assert_eq!(parsed.data, &inner[..]);
}

#[test]
fn test_adnl_query_layout() {
    let query_id = [7u8; 32];
    let raw = tl_proto::serialize(Message::Query {
        query_id: &query_id,
        query: b"abc",
    });

    assert_eq!(&raw[..4], &0xb48bf97au32.to_le_bytes());
    assert_eq!(&raw[4..36], &query_id);
    assert_eq!(&raw[36..40], &[3, b'a', b'b', b'c']);
    assert_eq!(raw.len(), 40);
}

#[test]
fn test_adnl_answer_parse() {
    let mut raw = 0x0fac8416u32.to_le_bytes().to_vec();
    raw.extend_from_slice(&[9u8; 32]);
    raw.extend_from_slice(&[2, 0xAA, 0xBB, 0]);

    match tl_proto::deserialize::<Message>(&raw).unwrap() {
        Message::Answer { query_id, answer } => {
            assert_eq!(query_id, &[9u8; 32]);
            assert_eq!(answer, &[0xAA, 0xBB]);
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[test]
fn test_ping_pong_ids() {
    let ping = tl_proto::serialize(Message::Ping { random_id: 42 });
    assert_eq!(&ping[..4], &0x4d082b9au32.to_le_bytes());
    assert_eq!(&ping[4..], &42u64.to_le_bytes());

    let mut pong = 0xdc69fb03u32.to_le_bytes().to_vec();
    pong.extend_from_slice(&42u64.to_le_bytes());
    assert_eq!(
        tl_proto::deserialize::<Message>(&pong).unwrap(),
        Message::Pong { random_id: 42 }
    );
}

#[test]
fn test_unknown_constructor_rejected() {
    let raw = 0xdeadbeefu32.to_le_bytes();
    assert!(tl_proto::deserialize::<Message>(&raw).is_err());
    assert!(tl_proto::deserialize::<Response>(&raw).is_err());
}

#[test]
fn test_response_current_time() {
    let mut raw = 0xe953000du32.to_le_bytes().to_vec();
    raw.extend_from_slice(&1_700_000_000u32.to_le_bytes());

    assert_eq!(
        tl_proto::deserialize::<Response>(&raw).unwrap(),
        Response::CurrentTime { now: 1_700_000_000 }
    );
}

#[test]
fn test_response_error() {
    let raw = tl_proto::serialize(Response::Error {
        code: 651,
        message: b"too big masterchain block seqno",
    });

    match tl_proto::deserialize::<Response>(&raw).unwrap() {
        Response::Error { code, message } => {
            assert_eq!(code, 651);
            assert_eq!(message, b"too big masterchain block seqno");
        }
        other => panic!("unexpected response {other:?}"),
    }
}

#[test]
fn test_masterchain_info_layout() {
    let info = Response::MasterchainInfo {
        last: block_id(100),
        state_root_hash: [1; 32],
        init: ZeroStateIdExt {
            workchain: -1,
            root_hash: [2; 32],
            file_hash: [3; 32],
        },
    };
    let raw = tl_proto::serialize(info);

    // id + block id (4+8+4+32+32) + hash + zero state (4+32+32)
    assert_eq!(raw.len(), 4 + 80 + 32 + 68);
    assert_eq!(&raw[4..8], &(-1i32).to_le_bytes());
    assert_eq!(tl_proto::deserialize::<Response>(&raw).unwrap(), info);
}

#[test]
fn test_block_id_ext_display() {
    let display = block_id(100).to_string();

    assert!(display.starts_with("(-1:8000000000000000:100):"));
    assert!(display.contains(&"ab".repeat(32)));
    assert!(display.ends_with(&"cd".repeat(32)));
}

#[test]
fn test_block_id_ext_equality() {
    assert_eq!(block_id(1), block_id(1));
    assert_ne!(block_id(1), block_id(2));
}
