//! Tagged, order-preserving binary encoding of document values.
//!
//! Unsigned byte comparison of two encodings gives the same answer as
//! comparing the decoded values, which is what lets index keys and bounds be
//! plain byte strings.

mod codec;
mod number;
mod value;

pub use codec::{
    EOS, MAX_DEPTH, Segments, decode, decode_exact, encode, encode_into, encode_inverted_into,
    segments, span,
};
pub use number::{NUMBER_LEN, append_f64, f64_from_bytes};
pub use value::{Object, Value, ValueType};
