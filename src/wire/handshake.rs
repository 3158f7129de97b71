//! The handshake is not a length-prefixed frame: `pstrlen(1) + pstr +
//! reserved(8) + info_hash(20) + peer_id(20)`. Readers are split into two
//! halves so the caller can inspect the remote's info-hash (and decide
//! whether to respond at all) before committing to read the peer-id.

use super::{Result, WireError};
use std::io::{Read, Write};

pub const PROTOCOL_NAME: &str = "BitTorrent protocol";

/// The first half of a handshake: everything up to (not including) the
/// peer-id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeStart {
    pub protocol_name: String,
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
}

/// The second half: just the peer-id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeEnd {
    pub peer_id: [u8; 20],
}

fn io_to_wire(e: std::io::Error) -> WireError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::Eof
    } else {
        WireError::Io(e)
    }
}

/// Reads `1 + pstrlen + 8 + 20` bytes: pstrlen, the protocol string,
/// the reserved bitset, and the info-hash. Does not read the peer-id.
pub fn read_handshake_start<R: Read>(reader: &mut R) -> Result<HandshakeStart> {
    let mut pstrlen_buf = [0u8; 1];
    reader.read_exact(&mut pstrlen_buf).map_err(io_to_wire)?;
    let pstrlen = pstrlen_buf[0] as usize;

    let mut rest = vec![0u8; pstrlen + 8 + 20];
    reader.read_exact(&mut rest).map_err(io_to_wire)?;

    let protocol_name = String::from_utf8(rest[..pstrlen].to_vec())
        .map_err(|_| WireError::InvalidProtocolName)?;
    let mut reserved = [0u8; 8];
    reserved.copy_from_slice(&rest[pstrlen..pstrlen + 8]);
    let mut info_hash = [0u8; 20];
    info_hash.copy_from_slice(&rest[pstrlen + 8..pstrlen + 28]);

    Ok(HandshakeStart {
        protocol_name,
        reserved,
        info_hash,
    })
}

/// Reads the trailing 20-byte peer-id.
pub fn read_handshake_end<R: Read>(reader: &mut R) -> Result<HandshakeEnd> {
    let mut peer_id = [0u8; 20];
    reader.read_exact(&mut peer_id).map_err(io_to_wire)?;
    Ok(HandshakeEnd { peer_id })
}

/// Writes a complete handshake (both halves) in one pass.
pub fn write_handshake<W: Write>(
    writer: &mut W,
    reserved: [u8; 8],
    info_hash: [u8; 20],
    peer_id: [u8; 20],
) -> Result<()> {
    let pstr = PROTOCOL_NAME.as_bytes();
    let mut buf = Vec::with_capacity(1 + pstr.len() + 8 + 20 + 20);
    buf.push(pstr.len() as u8);
    buf.extend_from_slice(pstr);
    buf.extend_from_slice(&reserved);
    buf.extend_from_slice(&info_hash);
    buf.extend_from_slice(&peer_id);
    writer.write_all(&buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_handshake_in_two_halves() {
        let info_hash = [7u8; 20];
        let peer_id = [9u8; 20];
        let mut buf = Vec::new();
        write_handshake(&mut buf, [0u8; 8], info_hash, peer_id).unwrap();

        let mut cursor = Cursor::new(buf);
        let start = read_handshake_start(&mut cursor).unwrap();
        assert_eq!(start.protocol_name, PROTOCOL_NAME);
        assert_eq!(start.info_hash, info_hash);

        let end = read_handshake_end(&mut cursor).unwrap();
        assert_eq!(end.peer_id, peer_id);
    }
}
