//! TVM (TON Virtual Machine) data structures and utilities
//!
//! This module provides implementations of fundamental TON blockchain data structures:
//! - Cell: The basic data structure that can store up to 1023 bits and up to 4 references
//! - Builder: Appends bits, integers, coins, addresses and references to a new cell
//! - Slice: A reader for sequentially accessing cell data
//! - BoC: Bag of Cells serialization format for encoding cells into byte arrays
//! - Address: Standard and external address values

pub mod address;
pub mod boc;
pub mod builder;
pub mod cell;
pub mod error;
pub mod slice;

pub use address::{Address, ExternalAddress};
pub use boc::{
    BocOptions, base64_to_boc, boc_to_base64, boc_to_hex, deserialize_boc, deserialize_boc_roots,
    hex_to_boc, serialize_boc, serialize_boc_ex,
};
pub use builder::{Builder, MAX_INT_BITS};
pub use cell::{
    Cell, CellKind, MAX_CELL_BITS, MAX_CELL_DEPTH, MAX_CELL_LEVEL, MAX_CELL_REFS,
};
pub use error::{CellError, Must};
pub use slice::Slice;
