use crate::adnl::crypto::{KeyPair, PublicKey};
use crate::adnl::helper_types::{AdnlAddress, AdnlAesParams, AdnlError};
use crate::adnl::primitives::codec::AdnlCodec;
use crate::adnl::primitives::handshake::AdnlHandshake;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;

/// One end of an established ADNL-over-TCP connection
pub struct AdnlPeer<T> {
    framed: Framed<T, AdnlCodec>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> AdnlPeer<T> {
    /// Client side: handshake with the server owning `server_public` using a
    /// fresh ephemeral key, then wait for the empty acknowledgement packet.
    pub async fn connect(server_public: &[u8; 32], transport: T) -> Result<Self, AdnlError> {
        let server_key =
            PublicKey::from_bytes(*server_public).ok_or(AdnlError::InvalidPublicKey)?;
        let local = KeyPair::generate(&mut rand::rngs::OsRng);
        let handshake = AdnlHandshake::new(
            AdnlAddress::from(&server_key),
            local.public_key,
            AdnlAesParams::random(),
            local.compute_shared_secret(&server_key),
        );
        Self::perform_handshake(transport, &handshake).await
    }

    pub async fn perform_handshake(
        mut transport: T,
        handshake: &AdnlHandshake,
    ) -> Result<Self, AdnlError> {
        transport.write_all(&handshake.to_bytes()).await?;
        transport.flush().await?;
        log::debug!("handshake sent to {}", handshake.receiver());

        let mut framed = Framed::new(transport, handshake.make_client_codec());
        match framed.next().await {
            Some(Ok(ack)) if ack.is_empty() => Ok(Self { framed }),
            Some(Ok(ack)) => Err(AdnlError::UnexpectedAck(ack.len())),
            Some(Err(e)) => Err(e),
            None => Err(AdnlError::EndOfStream),
        }
    }

    /// Server side: read the handshake addressed to `keypair` and acknowledge it
    pub async fn accept(keypair: &KeyPair, mut transport: T) -> Result<Self, AdnlError> {
        let mut packet = [0u8; AdnlHandshake::LEN];
        transport.read_exact(&mut packet).await?;
        let handshake = AdnlHandshake::decrypt_from_raw(&packet, keypair)?;
        log::debug!("accepted handshake from {}", handshake.sender());

        let mut framed = Framed::new(transport, handshake.make_server_codec());
        framed.send(Bytes::new()).await?;
        Ok(Self { framed })
    }

    pub async fn send(&mut self, payload: Bytes) -> Result<(), AdnlError> {
        self.framed.send(payload).await
    }

    pub async fn recv(&mut self) -> Result<Bytes, AdnlError> {
        self.framed.next().await.unwrap_or(Err(AdnlError::EndOfStream))
    }

    pub fn into_framed(self) -> Framed<T, AdnlCodec> {
        self.framed
    }
}
