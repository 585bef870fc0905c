//! Errors raised by the cell codec
//!
//! Every variant is a format error: deterministic, local to the input and
//! never retried by the transport layer.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    /// The requested width does not fit the builder or exceeds what the
    /// operation supports.
    #[error("cannot store {requested} bits: {available} bits left")]
    Size { requested: usize, available: usize },
    #[error("value needs {required} bits but only {width} are allowed")]
    ValueTooLarge { required: usize, width: usize },
    #[error("cell already holds {max} references", max = crate::tvm::MAX_CELL_REFS)]
    TooManyRefs,
    #[error("slice of {len} bytes is too short for {bits} bits")]
    ShortSlice { len: usize, bits: usize },
    #[error("builder overflow: {bits} bits and {refs} references requested")]
    Overflow { bits: usize, refs: usize },
    #[error("not enough {unit}: requested {requested}, {remaining} remaining")]
    OutOfRange {
        unit: &'static str,
        requested: usize,
        remaining: usize,
    },
    #[error("unsupported address tag {0:#04b}")]
    UnsupportedAddress(u8),
    #[error("invalid cell: {0}")]
    InvalidCell(String),
    #[error("malformed bag of cells: {0}")]
    MalformedBoc(String),
}

impl CellError {
    pub(crate) fn bits(requested: usize, remaining: usize) -> Self {
        Self::OutOfRange {
            unit: "bits",
            requested,
            remaining,
        }
    }

    pub(crate) fn refs(requested: usize, remaining: usize) -> Self {
        Self::OutOfRange {
            unit: "references",
            requested,
            remaining,
        }
    }

    pub(crate) fn boc(reason: impl Into<String>) -> Self {
        Self::MalformedBoc(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, CellError>;

/// Unwrap-or-abort for call chains whose inputs are already known to be valid
/// (constants, pre-checked sizes). Never use it on data received from a peer.
///
/// ```rust
/// use tonlink_rs::tvm::{Builder, Must};
///
/// let mut builder = Builder::new();
/// builder.store_uint(0x0f, 4).must().store_coins(1_000).must();
/// let cell = builder.build();
/// assert_eq!(cell.bit_len(), 4 + 4 + 16);
/// ```
pub trait Must<T> {
    fn must(self) -> T;
}

impl<T> Must<T> for Result<T> {
    #[track_caller]
    fn must(self) -> T {
        match self {
            Ok(value) => value,
            Err(e) => panic!("cell operation failed: {e}"),
        }
    }
}
