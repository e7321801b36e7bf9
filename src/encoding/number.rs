//! Order-preserving 8-byte number transform.

const SIGN: u64 = 1 << 63;

pub const NUMBER_LEN: usize = 8;

/// Appends `n` so that unsigned byte comparison follows numeric order.
/// Positive values get the sign bit flipped; negative values are fully inverted.
pub fn append_f64(buf: &mut Vec<u8>, n: f64) {
    let bits = n.to_bits();
    let enc = if bits & SIGN != 0 { !bits } else { bits ^ SIGN };
    buf.extend_from_slice(&enc.to_be_bytes());
}

#[must_use]
pub fn f64_from_bytes(b: [u8; NUMBER_LEN]) -> f64 {
    let enc = u64::from_be_bytes(b);
    let bits = if enc & SIGN != 0 { enc ^ SIGN } else { !enc };
    f64::from_bits(bits)
}
