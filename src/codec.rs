//! Byte-level primitives shared by the O5M and PBF readers.

pub mod delta;
pub mod varint;

pub use delta::{DeltaDecoder, DeltaEncoder, DeltaField};
pub use varint::{
    decode_zigzag, encode_zigzag, read_signed_varint, read_unsigned_varint, write_signed_varint,
    write_unsigned_varint, ByteCursor,
};
