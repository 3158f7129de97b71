//! The three 20-byte identifier types that appear throughout the protocol:
//! info-hashes, peer-ids, and DHT node-ids. All three share the same shape
//! (raw bytes plus cached hex and percent-encoded forms) so they are
//! generated from one macro rather than hand-duplicated three times.

use std::fmt;

macro_rules! hash20 {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            bytes: [u8; 20],
            hex: String,
            url_encoded: String,
        }

        impl $name {
            pub fn new(bytes: [u8; 20]) -> Self {
                $name {
                    hex: hex::encode_upper(bytes),
                    url_encoded: percent_encode_bytes(&bytes),
                    bytes,
                }
            }

            pub fn from_slice(slice: &[u8]) -> Option<Self> {
                if slice.len() != 20 {
                    return None;
                }
                let mut bytes = [0u8; 20];
                bytes.copy_from_slice(slice);
                Some(Self::new(bytes))
            }

            pub fn as_bytes(&self) -> &[u8; 20] {
                &self.bytes
            }

            pub fn hex(&self) -> &str {
                &self.hex
            }

            pub fn url_encoded(&self) -> &str {
                &self.url_encoded
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.hex)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.hex)
            }
        }

        impl From<[u8; 20]> for $name {
            fn from(bytes: [u8; 20]) -> Self {
                Self::new(bytes)
            }
        }
    };
}

hash20!(Sha1Hash, "A SHA-1 hash: 20 raw bytes plus cached hex/url forms.");
hash20!(PeerId, "A 20-byte peer identifier presented at handshake time.");
hash20!(NodeId, "A 20-byte DHT node identifier (KRPC message shape only).");

/// Percent-encodes every byte of `bytes`, ISO-8859-1 style: unreserved
/// ASCII characters pass through unescaped, everything else becomes
/// `%XX`. This is the byte-exact form the tracker protocol needs for
/// `info_hash`/`peer_id` — never route raw 20-byte values through a
/// UTF-8-aware percent-encoder, since most hash bytes are not valid UTF-8.
pub fn percent_encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{:02X}", b));
            }
        }
    }
    out
}
