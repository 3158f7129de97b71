use super::{Result, Value};
use std::io::Write;
use tracing::instrument;

/// Encodes `value` into a freshly allocated buffer using the canonical
/// bencode form (sorted dictionary keys, minimal integer representation).
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    // `Vec<u8>`'s `Write` impl never fails, so unwrap is safe here.
    encode_to_writer(&mut buf, value).expect("encoding into a Vec<u8> cannot fail");
    buf
}

#[instrument(skip(writer, value), level = "trace")]
pub fn encode_to_writer<W: Write>(writer: &mut W, value: &Value) -> Result<()> {
    match value {
        Value::Integer(i) => write!(writer, "i{}e", i).map_err(Into::into),
        Value::String(s) => {
            write!(writer, "{}:", s.len())?;
            writer.write_all(s)?;
            Ok(())
        }
        Value::List(items) => {
            writer.write_all(b"l")?;
            for item in items {
                encode_to_writer(writer, item)?;
            }
            writer.write_all(b"e")?;
            Ok(())
        }
        Value::Dict(dict) => {
            writer.write_all(b"d")?;
            // `BTreeMap` iterates in key order already, which is exactly
            // the byte-lexicographic order bencode dictionaries require.
            for (key, val) in dict {
                write!(writer, "{}:", key.len())?;
                writer.write_all(key)?;
                encode_to_writer(writer, val)?;
            }
            writer.write_all(b"e")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::decode;
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn encodes_integer() {
        assert_eq!(encode(&Value::Integer(42)), b"i42e");
    }

    #[test]
    fn encodes_string() {
        assert_eq!(encode(&Value::string("spam")), b"4:spam");
    }

    #[test]
    fn encodes_sorted_dict() {
        let mut dict = BTreeMap::new();
        dict.insert(b"spam".to_vec(), Value::string("eggs"));
        dict.insert(b"cow".to_vec(), Value::string("moo"));
        assert_eq!(encode(&Value::Dict(dict)), b"d3:cow3:moo4:spam4:eggse");
    }

    #[test]
    fn round_trips_canonical_bytes() {
        let samples: &[&[u8]] = &[
            b"i42e",
            b"4:spam",
            b"l4:spami42ee",
            b"d3:cow3:moo4:spam4:eggse",
            b"d4:infod6:lengthi0e4:name0:12:piece lengthi1e6:pieces0:ee",
        ];
        for sample in samples {
            let value = decode(sample).unwrap();
            assert_eq!(encode(&value), *sample);
        }
    }
}
