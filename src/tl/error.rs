use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlError {
    #[error("TL decoding error: {0}")]
    Decode(tl_proto::TlError),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<tl_proto::TlError> for TlError {
    fn from(e: tl_proto::TlError) -> Self {
        TlError::Decode(e)
    }
}
