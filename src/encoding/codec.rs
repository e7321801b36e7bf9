use crate::errors::DbError;

use super::number::{NUMBER_LEN, append_f64, f64_from_bytes};
use super::value::{Object, Value, ValueType};

/// Terminator closing strings, arrays, objects and object keys.
pub const EOS: u8 = 0;

/// Maximum nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 512;

const BINARY_HEADER_LEN: usize = 4;

#[must_use]
pub fn encode(v: &Value) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    encode_into(v, &mut buf);
    buf
}

/// Appends the encoding of `v` to `buf`.
pub fn encode_into(v: &Value, buf: &mut Vec<u8>) {
    buf.push(v.value_type().tag());
    match v {
        Value::Null | Value::Bool(_) => {}
        Value::Number(n) => append_f64(buf, *n),
        Value::String(s) => {
            buf.extend_from_slice(s.as_bytes());
            buf.push(EOS);
        }
        Value::Binary(b) => {
            // payloads over u32::MAX are not representable; truncate the header
            #[allow(clippy::cast_possible_truncation)]
            let len = b.len() as u32;
            buf.extend_from_slice(&len.to_be_bytes());
            buf.extend_from_slice(b);
        }
        Value::Array(items) => {
            for item in items {
                encode_into(item, buf);
            }
            buf.push(EOS);
        }
        Value::Object(obj) => {
            for (k, item) in obj.iter() {
                buf.extend_from_slice(k.as_bytes());
                buf.push(EOS);
                encode_into(item, buf);
            }
            buf.push(EOS);
        }
    }
}

/// Appends the byte-wise complement of the encoding, which sorts in reverse.
pub fn encode_inverted_into(v: &Value, buf: &mut Vec<u8>) {
    let start = buf.len();
    encode_into(v, buf);
    for b in &mut buf[start..] {
        *b = !*b;
    }
}

/// Decodes one value and returns it with the unconsumed remainder.
///
/// # Errors
/// Returns `DbError::Decode` on truncated or malformed input.
pub fn decode(bytes: &[u8]) -> Result<(Value, &[u8]), DbError> {
    let mut r = Reader { buf: bytes, pos: 0 };
    let v = r.read_value(0)?;
    Ok((v, &bytes[r.pos..]))
}

/// Decodes exactly one value; trailing bytes are an error.
///
/// # Errors
/// Returns `DbError::Decode` on malformed input or trailing bytes.
pub fn decode_exact(bytes: &[u8]) -> Result<Value, DbError> {
    let (v, rest) = decode(bytes)?;
    if !rest.is_empty() {
        return Err(DbError::decode(format!("{} trailing bytes after value", rest.len())));
    }
    Ok(v)
}

/// Returns the length of the first encoded value without materializing it.
///
/// # Errors
/// Returns `DbError::Decode` on truncated or malformed input.
pub fn span(bytes: &[u8]) -> Result<usize, DbError> {
    let mut r = Reader { buf: bytes, pos: 0 };
    r.skip_value(0)?;
    Ok(r.pos)
}

/// Splits a concatenation of encoded values into per-value slices.
#[must_use]
pub fn segments(bytes: &[u8]) -> Segments<'_> {
    Segments { rest: bytes }
}

pub struct Segments<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Segments<'a> {
    type Item = Result<&'a [u8], DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        match span(self.rest) {
            Ok(n) => {
                let (seg, rest) = self.rest.split_at(n);
                self.rest = rest;
                Some(Ok(seg))
            }
            Err(e) => {
                self.rest = &[];
                Some(Err(e))
            }
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn tag(&mut self, depth: usize) -> Result<ValueType, DbError> {
        if depth > MAX_DEPTH {
            return Err(DbError::decode("nesting too deep"));
        }
        let Some(&tag) = self.buf.get(self.pos) else {
            return Err(DbError::decode("unexpected end of input"));
        };
        let t = ValueType::from_tag(tag)
            .ok_or_else(|| DbError::decode(format!("unknown type tag {tag} at offset {}", self.pos)))?;
        self.pos += 1;
        Ok(t)
    }

    fn peek_eos(&mut self) -> Result<bool, DbError> {
        match self.buf.get(self.pos) {
            Some(&EOS) => {
                self.pos += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(DbError::decode("unexpected end of container")),
        }
    }

    fn terminated(&mut self) -> Result<&'a [u8], DbError> {
        let buf = self.buf;
        let rest = &buf[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == EOS)
            .ok_or_else(|| DbError::decode("missing string terminator"))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn number(&mut self) -> Result<f64, DbError> {
        let raw: [u8; NUMBER_LEN] = self
            .buf
            .get(self.pos..self.pos + NUMBER_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| DbError::decode("truncated number"))?;
        self.pos += NUMBER_LEN;
        Ok(f64_from_bytes(raw))
    }

    fn binary(&mut self) -> Result<&'a [u8], DbError> {
        let header: [u8; BINARY_HEADER_LEN] = self
            .buf
            .get(self.pos..self.pos + BINARY_HEADER_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| DbError::decode("truncated binary header"))?;
        self.pos += BINARY_HEADER_LEN;
        let len = u32::from_be_bytes(header) as usize;
        let payload = self
            .buf
            .get(self.pos..self.pos.saturating_add(len))
            .ok_or_else(|| DbError::decode("truncated binary payload"))?;
        self.pos += len;
        Ok(payload)
    }

    fn utf8(raw: &[u8]) -> Result<String, DbError> {
        String::from_utf8(raw.to_vec()).map_err(|e| DbError::decode(format!("invalid utf-8: {e}")))
    }

    fn read_value(&mut self, depth: usize) -> Result<Value, DbError> {
        Ok(match self.tag(depth)? {
            ValueType::Null => Value::Null,
            ValueType::False => Value::Bool(false),
            ValueType::True => Value::Bool(true),
            ValueType::Number => Value::Number(self.number()?),
            ValueType::String => Value::String(Self::utf8(self.terminated()?)?),
            ValueType::Binary => Value::Binary(self.binary()?.to_vec()),
            ValueType::Array => {
                let mut items = Vec::new();
                while !self.peek_eos()? {
                    items.push(self.read_value(depth + 1)?);
                }
                Value::Array(items)
            }
            ValueType::Object => {
                let mut obj = Object::new();
                while !self.peek_eos()? {
                    let key = Self::utf8(self.terminated()?)?;
                    let item = self.read_value(depth + 1)?;
                    obj.insert(key, item);
                }
                Value::Object(obj)
            }
        })
    }

    fn skip_value(&mut self, depth: usize) -> Result<(), DbError> {
        match self.tag(depth)? {
            ValueType::Null | ValueType::False | ValueType::True => {}
            ValueType::Number => {
                self.number()?;
            }
            ValueType::String => {
                self.terminated()?;
            }
            ValueType::Binary => {
                self.binary()?;
            }
            ValueType::Array => {
                while !self.peek_eos()? {
                    self.skip_value(depth + 1)?;
                }
            }
            ValueType::Object => {
                while !self.peek_eos()? {
                    self.terminated()?;
                    self.skip_value(depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    #[test]
    fn decodes_what_it_encodes() {
        let doc = v(json!({"id": 1, "a": [1, "x", null, true, false], "o": {"k": -2.5}}));
        let bytes = encode(&doc);
        assert_eq!(decode_exact(&bytes).unwrap(), doc);
        assert_eq!(span(&bytes).unwrap(), bytes.len());
    }

    #[test]
    fn string_layout() {
        assert_eq!(encode(&Value::from("ab")), vec![3, b'a', b'b', 0]);
        assert_eq!(encode(&Value::Null), vec![1]);
        assert_eq!(encode(&Value::Binary(vec![9])), vec![8, 0, 0, 0, 1, 9]);
    }

    #[test]
    fn decode_returns_remainder() {
        let mut buf = encode(&Value::from("a"));
        encode_into(&Value::Number(2.0), &mut buf);
        let (first, rest) = decode(&buf).unwrap();
        assert_eq!(first, Value::from("a"));
        assert_eq!(decode_exact(rest).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn segments_split_concatenation() {
        let mut buf = Vec::new();
        for item in [v(json!("x")), v(json!(5)), v(json!([1, [2]]))] {
            encode_into(&item, &mut buf);
        }
        let segs: Vec<&[u8]> = segments(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(segs.len(), 3);
        assert_eq!(decode_exact(segs[2]).unwrap(), v(json!([1, [2]])));
    }

    #[test]
    fn malformed_input_is_an_error() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![42],
            vec![2, 0x80, 0, 0],
            vec![3, b'a', b'b'],
            vec![8, 0, 0],
            vec![8, 0, 0, 0, 5, 1],
            vec![6, 2],
            vec![7, b'k', 0],
            vec![7, b'k'],
            vec![3, 0xff, 0xfe, 0],
        ];
        for c in cases {
            assert!(decode(&c).is_err(), "expected error for {c:?}");
        }
        // span does not validate utf-8
        assert_eq!(span(&[3, 0xff, 0xfe, 0]).unwrap(), 4);
        assert!(span(&[8, 0, 0, 0, 5, 1]).is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut buf = vec![6u8; MAX_DEPTH + 10];
        buf.extend(vec![0u8; MAX_DEPTH + 10]);
        assert!(matches!(decode(&buf), Err(DbError::Decode(_))));
    }

    #[test]
    fn inverted_encoding_reverses_order() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        encode_inverted_into(&Value::from("a"), &mut a);
        encode_inverted_into(&Value::from("ab"), &mut b);
        assert!(b < a);
    }
}
