use super::{BencodeError, Result, Value, MAX_STRING_LEN};
use std::collections::BTreeMap;
use std::io::Read;
use tracing::instrument;

/// Thin cursor over a `Read` that tracks a byte offset (for error messages)
/// and supports one byte of lookahead without consuming it.
struct Cursor<R: Read> {
    inner: R,
    pos: u64,
    peeked: Option<u8>,
}

impl<R: Read> Cursor<R> {
    fn new(inner: R) -> Self {
        Cursor {
            inner,
            pos: 0,
            peeked: None,
        }
    }

    fn peek(&mut self) -> Result<u8> {
        if let Some(b) = self.peeked {
            return Ok(b);
        }
        let mut buf = [0u8; 1];
        let n = self.inner.read(&mut buf)?;
        if n == 0 {
            return Err(BencodeError::Eof);
        }
        self.peeked = Some(buf[0]);
        Ok(buf[0])
    }

    fn next(&mut self) -> Result<u8> {
        let b = self.peek()?;
        self.peeked = None;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        let got = self.next()?;
        if got != b {
            return Err(BencodeError::UnexpectedByte(got, self.pos - 1));
        }
        Ok(())
    }

    fn read_exact_n(&mut self, n: u64) -> Result<Vec<u8>> {
        if n > MAX_STRING_LEN {
            return Err(BencodeError::LengthOverflow(n));
        }
        let mut buf = vec![0u8; n as usize];
        if n > 0 {
            if let Some(b) = self.peeked.take() {
                buf[0] = b;
                self.inner.read_exact(&mut buf[1..])?;
            } else {
                self.inner.read_exact(&mut buf)?;
            }
        }
        self.pos += n;
        Ok(buf)
    }
}

/// Decodes a single complete bencode value from an in-memory byte slice.
///
/// Trailing bytes after the value are ignored (callers that care about
/// exact framing, e.g. to split a `.torrent` file's `info` dict back out
/// for hashing, should slice the input themselves rather than rely on
/// this function to report leftovers).
///
/// # Arguments
/// * `bytes` - the encoded bencode data; may contain trailing bytes.
///
/// # Returns
/// * `Result<Value>` - the first decoded value, or an error if `bytes`
///   doesn't start with a well-formed bencode value.
///
/// # Example
/// For input `b"4:spam"`, this function returns `Ok(Value::string("spam"))`.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    decode_from_reader(bytes)
}

/// Decodes a single complete bencode value from any `Read` source.
///
/// This is the entry point `decode` delegates to; it exists separately
/// so callers streaming a value off a socket or a large file don't need
/// to buffer the whole input first.
///
/// # Arguments
/// * `reader` - any byte source positioned at the start of a value.
///
/// # Returns
/// * `Result<Value>` - the decoded value, or an error on malformed input
///   or an I/O failure reading from `reader`.
#[instrument(skip(reader), level = "trace")]
pub fn decode_from_reader<R: Read>(reader: R) -> Result<Value> {
    let mut cursor = Cursor::new(reader);
    read_value(&mut cursor)
}

fn read_value<R: Read>(cursor: &mut Cursor<R>) -> Result<Value> {
    match cursor.peek()? {
        b'i' => read_integer(cursor).map(Value::Integer),
        b'l' => read_list(cursor).map(Value::List),
        b'd' => read_dict(cursor).map(Value::Dict),
        b'0'..=b'9' => read_string(cursor).map(Value::String),
        other => Err(BencodeError::UnexpectedByte(other, cursor.pos)),
    }
}

fn read_decimal<R: Read>(cursor: &mut Cursor<R>, stop: u8) -> Result<(String, bool)> {
    let start_pos = cursor.pos;
    let mut negative = false;
    let mut digits = String::new();
    let mut first = true;
    loop {
        let b = cursor.next()?;
        if b == stop {
            break;
        }
        if first && b == b'-' {
            negative = true;
            first = false;
            continue;
        }
        if !b.is_ascii_digit() {
            return Err(BencodeError::MalformedNumber(start_pos));
        }
        digits.push(b as char);
        first = false;
    }
    Ok((digits, negative))
}

/// Decodes a bencode integer (`i<digits>e`), rejecting leading zeros and
/// `-0` per the canonical-encoding rule (spec.md §4.1).
///
/// # Returns
/// * `Result<i64>` - the parsed value, or `BencodeError::MalformedNumber`
///   if the digit run is empty, has a leading zero, or is `-0`.
fn read_integer<R: Read>(cursor: &mut Cursor<R>) -> Result<i64> {
    let start_pos = cursor.pos;
    cursor.expect(b'i')?;
    let (digits, negative) = read_decimal(cursor, b'e')?;
    if digits.is_empty() {
        return Err(BencodeError::MalformedNumber(start_pos));
    }
    if digits == "0" && negative {
        // "-0" is ill-formed per spec.
        return Err(BencodeError::MalformedNumber(start_pos));
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(BencodeError::MalformedNumber(start_pos));
    }
    let magnitude: i64 = digits
        .parse()
        .map_err(|_| BencodeError::MalformedNumber(start_pos))?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Decodes a bencode byte string (`<len>:<bytes>`).
///
/// # Returns
/// * `Result<Vec<u8>>` - the raw bytes, or an error if the length prefix
///   is malformed or exceeds `MAX_STRING_LEN`.
fn read_string<R: Read>(cursor: &mut Cursor<R>) -> Result<Vec<u8>> {
    let start_pos = cursor.pos;
    let (digits, negative) = read_decimal(cursor, b':')?;
    if negative || digits.is_empty() {
        return Err(BencodeError::MalformedNumber(start_pos));
    }
    let len: u64 = digits
        .parse()
        .map_err(|_| BencodeError::MalformedNumber(start_pos))?;
    cursor.read_exact_n(len)
}

fn read_list<R: Read>(cursor: &mut Cursor<R>) -> Result<Vec<Value>> {
    cursor.expect(b'l')?;
    let mut items = Vec::new();
    loop {
        if cursor.peek()? == b'e' {
            cursor.next()?;
            break;
        }
        items.push(read_value(cursor)?);
    }
    Ok(items)
}

/// Decodes a bencode dictionary (`d<key><value>...e`), enforcing strictly
/// ascending, unique string keys as they're read (spec.md §4.1's ordering
/// invariant — checked incrementally rather than sorting afterward, so a
/// misordered key fails at the byte offset it appears, not after the
/// whole dict has been read).
///
/// # Returns
/// * `Result<BTreeMap<Vec<u8>, Value>>` - the decoded dict, or
///   `InvalidKeyType`/`DuplicateKey`/`Unordered` on a malformed key.
fn read_dict<R: Read>(cursor: &mut Cursor<R>) -> Result<BTreeMap<Vec<u8>, Value>> {
    cursor.expect(b'd')?;
    let mut dict = BTreeMap::new();
    let mut prev_key: Option<Vec<u8>> = None;
    loop {
        if cursor.peek()? == b'e' {
            cursor.next()?;
            break;
        }
        let key_pos = cursor.pos;
        if !cursor.peek()?.is_ascii_digit() {
            return Err(BencodeError::InvalidKeyType(key_pos));
        }
        let key = read_string(cursor)?;
        if let Some(prev) = &prev_key {
            match key.cmp(prev) {
                std::cmp::Ordering::Equal => {
                    return Err(BencodeError::DuplicateKey(key, key_pos));
                }
                std::cmp::Ordering::Less => {
                    return Err(BencodeError::Unordered(key, key_pos));
                }
                std::cmp::Ordering::Greater => {}
            }
        }
        let value = read_value(cursor)?;
        prev_key = Some(key.clone());
        dict.insert(key, value);
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn decodes_integer() {
        assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
        assert_eq!(decode(b"i-3e").unwrap(), Value::Integer(-3));
        assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
    }

    #[test]
    fn rejects_negative_zero_and_leading_zeros() {
        assert!(decode(b"i-0e").is_err());
        assert!(decode(b"i03e").is_err());
    }

    #[test]
    fn decodes_string() {
        assert_eq!(decode(b"4:spam").unwrap(), Value::String(b"spam".to_vec()));
    }

    #[test]
    fn decodes_list() {
        assert_eq!(
            decode(b"l4:spami42ee").unwrap(),
            Value::List(vec![Value::string("spam"), Value::Integer(42)])
        );
    }

    #[test]
    fn decodes_sorted_dict() {
        let mut expected = BTreeMap::new();
        expected.insert(b"cow".to_vec(), Value::string("moo"));
        expected.insert(b"spam".to_vec(), Value::string("eggs"));
        assert_eq!(
            decode(b"d3:cow3:moo4:spam4:eggse").unwrap(),
            Value::Dict(expected)
        );
    }

    #[test]
    fn rejects_unordered_dict() {
        let err = decode(b"d4:spam4:eggs3:cow3:mooe").unwrap_err();
        assert!(matches!(err, BencodeError::Unordered(..)));
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = decode(b"d3:fooi1e3:fooi2ee").unwrap_err();
        assert!(matches!(err, BencodeError::DuplicateKey(..)));
    }

    #[test]
    fn rejects_non_string_key() {
        let err = decode(b"di1ei2ee").unwrap_err();
        assert!(matches!(err, BencodeError::InvalidKeyType(..)));
    }

    #[test]
    fn truncated_input_is_eof() {
        assert!(matches!(decode(b"4:sp"), Err(BencodeError::Eof)));
        assert!(matches!(decode(b"i42"), Err(BencodeError::Eof)));
    }
}
