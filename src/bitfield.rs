//! A piece-availability bitset using the wire's bit order: the bit for
//! piece `p` lives at `(byte[p / 8] >> (7 - p % 8)) & 1`, i.e. the
//! most-significant bit of each byte is the lowest-numbered piece in
//! that byte (BEP-3 §peer_messages).

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitField {
    bytes: Vec<u8>,
}

impl BitField {
    /// A bitfield with room for (at least) `num_pieces` bits, all clear.
    pub fn new(num_pieces: usize) -> Self {
        BitField {
            bytes: vec![0u8; num_pieces.div_ceil(8)],
        }
    }

    /// Wraps a raw wire payload as-is (used when decoding a BitField
    /// message: trailing zero-padding bits beyond `num_pieces` are
    /// tolerated, never validated away).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        BitField { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn has_piece(&self, index: u32) -> bool {
        let byte_index = (index / 8) as usize;
        let Some(byte) = self.bytes.get(byte_index) else {
            return false;
        };
        let shift = 7 - (index % 8);
        (byte >> shift) & 1 == 1
    }

    pub fn set_piece(&mut self, index: u32) {
        let byte_index = (index / 8) as usize;
        if byte_index >= self.bytes.len() {
            self.bytes.resize(byte_index + 1, 0);
        }
        let shift = 7 - (index % 8);
        self.bytes[byte_index] |= 1 << shift;
    }

    /// Bitwise-ORs `other` into `self`, growing as needed. Mirrors
    /// receiving a BitField message after pieces were already marked
    /// via individual Have messages.
    pub fn union_with(&mut self, other: &BitField) {
        if other.bytes.len() > self.bytes.len() {
            self.bytes.resize(other.bytes.len(), 0);
        }
        for (i, byte) in other.bytes.iter().enumerate() {
            self.bytes[i] |= byte;
        }
    }

    /// All set piece indices, in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.bytes.len() as u32 * 8).filter(move |&i| self.has_piece(i))
    }
}
