//! Tests for ADNL (Abstract Datagram Network Layer) module

use super::crypto::*;
use super::*;
use bytes::Bytes;
use rand::rngs::OsRng;
use tokio::io::{AsyncReadExt, duplex};

#[test]
fn test_keypair_generation() {
    let mut rng = OsRng;
    let keypair1 = KeyPair::generate(&mut rng);
    let keypair2 = KeyPair::generate(&mut rng);

    assert_ne!(keypair1.public_key.to_bytes(), keypair2.public_key.to_bytes());
}

#[test]
fn test_public_key_from_bytes() {
    let bytes = [
        75, 54, 96, 93, 16, 21, 8, 159, 230, 42, 68, 148, 54, 18, 251, 196, 205, 254, 252, 114,
        76, 87, 204, 218, 132, 26, 196, 181, 191, 188, 115, 123,
    ];

    let pubkey = PublicKey::from_bytes(bytes).unwrap();
    assert_eq!(pubkey.to_bytes(), bytes);
    assert_eq!(format!("{pubkey}").len(), 64);
}

#[test]
fn test_address_is_short_id() {
    let keypair = KeyPair::from(&SecretKey::from_bytes([42u8; 32]));
    let address = AdnlAddress::from(&keypair.public_key);

    assert_eq!(address.as_bytes(), &keypair.public_key.compute_short_id());
    assert_eq!(address.to_string().len(), 64);
}

#[test]
fn test_aes_params_layout() {
    let mut raw = [0u8; 160];
    for (i, b) in raw.iter_mut().enumerate() {
        *b = i as u8;
    }
    let params = AdnlAesParams::from(raw);

    assert_eq!(params.rx_key()[0], 0);
    assert_eq!(params.tx_key()[0], 32);
    assert_eq!(params.rx_nonce()[0], 64);
    assert_eq!(params.tx_nonce()[0], 80);
    assert_eq!(params.to_bytes(), raw);
    assert_eq!(format!("{params:?}"), "AdnlAesParams(..)");
}

#[tokio::test]
async fn test_peer_handshake_and_exchange() {
    let server_keys = KeyPair::generate(&mut OsRng);
    let server_public = server_keys.public_key.to_bytes();
    let (client_io, server_io) = duplex(4096);

    let server = tokio::spawn(async move {
        let mut peer = AdnlPeer::accept(&server_keys, server_io).await.unwrap();
        let query = peer.recv().await.unwrap();
        peer.send(Bytes::from([&query[..], &b" pong"[..]].concat()))
            .await
            .unwrap();
    });

    let mut client = AdnlPeer::connect(&server_public, client_io).await.unwrap();
    client.send(Bytes::from_static(b"ping")).await.unwrap();
    assert_eq!(client.recv().await.unwrap(), &b"ping pong"[..]);

    server.await.unwrap();
}

#[tokio::test]
async fn test_peer_rejects_foreign_handshake() {
    let server_keys = KeyPair::generate(&mut OsRng);
    let someone_else = KeyPair::generate(&mut OsRng).public_key.to_bytes();
    let (client_io, server_io) = duplex(4096);

    let server =
        tokio::spawn(async move { AdnlPeer::accept(&server_keys, server_io).await.map(|_| ()) });

    let client = AdnlPeer::connect(&someone_else, client_io).await;
    assert!(matches!(
        server.await.unwrap(),
        Err(AdnlError::UnknownAddr(_))
    ));
    // server dropped its end without acknowledging
    assert!(matches!(client, Err(AdnlError::EndOfStream)));
}

#[tokio::test]
async fn test_peer_handshake_bytes_on_wire() {
    let server_keys = KeyPair::generate(&mut OsRng);
    let server_public = server_keys.public_key.to_bytes();
    let (client_io, mut server_io) = duplex(4096);

    let client = tokio::spawn(async move { AdnlPeer::connect(&server_public, client_io).await });

    let mut packet = [0u8; 256];
    server_io.read_exact(&mut packet).await.unwrap();
    assert_eq!(
        &packet[..32],
        AdnlAddress::from(&server_keys.public_key).as_bytes()
    );
    assert!(AdnlHandshake::decrypt_from_raw(&packet, &server_keys).is_ok());

    drop(server_io);
    assert!(client.await.unwrap().is_err());
}
