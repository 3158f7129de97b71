use sha1::Digest;
use std::io::{self, Write};

/// A `Write` sink that feeds every byte written to it into a running SHA-1
/// digest, without materialising the encoded bytes. Used to compute a
/// torrent's info-hash directly from [`super::encode_to_writer`] (see
/// [`crate::metainfo`]), one 64 KiB chunk at a time as bytes arrive —
/// `encode_to_writer` never buffers more than a single field at once, so
/// the sink naturally sees the stream in small pieces.
pub struct HashingSink {
    hasher: sha1::Sha1,
}

impl HashingSink {
    pub fn new() -> Self {
        HashingSink {
            hasher: sha1::Sha1::new(),
        }
    }

    pub fn finalize(self) -> [u8; 20] {
        let digest = self.hasher.finalize();
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest);
        out
    }
}

impl Default for HashingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for HashingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{encode_to_writer, Value};

    #[test]
    fn hashes_encoded_bytes_without_materialising_them() {
        let value = Value::string("spam");
        let mut sink = HashingSink::new();
        encode_to_writer(&mut sink, &value).unwrap();
        let hash = sink.finalize();

        let expected = {
            let mut hasher = sha1::Sha1::new();
            hasher.update(crate::bencode::encode(&value));
            let digest = hasher.finalize();
            let mut out = [0u8; 20];
            out.copy_from_slice(&digest);
            out
        };
        assert_eq!(hash, expected);
    }
}
