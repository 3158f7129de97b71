use super::{Message, Result, WireError, MAX_MESSAGE_LEN};
use crate::bitfield::BitField;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use tracing::instrument;

fn io_to_wire(e: std::io::Error) -> WireError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::Eof
    } else {
        WireError::Io(e)
    }
}

/// Reads one regular (length-prefixed) frame: a 4-byte big-endian length
/// `N`, then exactly `N` bytes. `N == 0` is a keep-alive with no body.
#[instrument(skip(reader), level = "trace")]
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    let len = reader.read_i32::<BigEndian>().map_err(io_to_wire)?;
    if len < 0 {
        return Err(WireError::NegativeLength(len));
    }
    let len = len as u32;
    if len == 0 {
        return Ok(Message::KeepAlive);
    }
    if len > MAX_MESSAGE_LEN {
        return Err(WireError::LengthTooLarge(len));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).map_err(io_to_wire)?;
    parse_body(&body)
}

pub(crate) fn parse_body(body: &[u8]) -> Result<Message> {
    let id = body[0];
    let payload = &body[1..];
    match id {
        0 => Ok(Message::Choke),
        1 => Ok(Message::Unchoke),
        2 => Ok(Message::Interested),
        3 => Ok(Message::NotInterested),
        4 => {
            let index = read_u32(payload)?;
            Ok(Message::Have(index))
        }
        5 => Ok(Message::BitField(BitField::from_bytes(payload.to_vec()))),
        6 => {
            let (index, begin, length) = read_three_u32(payload)?;
            Ok(Message::Request { index, begin, length })
        }
        7 => {
            if payload.len() < 8 {
                return Err(WireError::Eof);
            }
            let index = u32::from_be_bytes(payload[0..4].try_into().unwrap());
            let begin = u32::from_be_bytes(payload[4..8].try_into().unwrap());
            Ok(Message::Piece {
                index,
                begin,
                block: payload[8..].to_vec(),
            })
        }
        8 => {
            let (index, begin, length) = read_three_u32(payload)?;
            Ok(Message::Cancel { index, begin, length })
        }
        9 => {
            if payload.len() != 2 {
                return Err(WireError::Eof);
            }
            Ok(Message::Port(u16::from_be_bytes([payload[0], payload[1]])))
        }
        other => Err(WireError::UnknownMessageId(other)),
    }
}

fn read_u32(payload: &[u8]) -> Result<u32> {
    if payload.len() != 4 {
        return Err(WireError::Eof);
    }
    Ok(u32::from_be_bytes(payload.try_into().unwrap()))
}

fn read_three_u32(payload: &[u8]) -> Result<(u32, u32, u32)> {
    if payload.len() != 12 {
        return Err(WireError::Eof);
    }
    let index = u32::from_be_bytes(payload[0..4].try_into().unwrap());
    let begin = u32::from_be_bytes(payload[4..8].try_into().unwrap());
    let length = u32::from_be_bytes(payload[8..12].try_into().unwrap());
    Ok((index, begin, length))
}

/// Encodes and writes `msg` in one pass: length prefix, then id, then
/// payload, with no intermediate framing step visible to the caller.
#[instrument(skip(writer, msg), level = "trace")]
pub fn write_message<W: Write>(writer: &mut W, msg: &Message) -> Result<()> {
    match msg {
        Message::KeepAlive => {
            writer.write_u32::<BigEndian>(0)?;
        }
        Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => {
            writer.write_u32::<BigEndian>(1)?;
            writer.write_u8(msg.id().unwrap())?;
        }
        Message::Have(index) => {
            writer.write_u32::<BigEndian>(5)?;
            writer.write_u8(4)?;
            writer.write_u32::<BigEndian>(*index)?;
        }
        Message::BitField(bitfield) => {
            let body = bitfield.as_bytes();
            writer.write_u32::<BigEndian>(1 + body.len() as u32)?;
            writer.write_u8(5)?;
            writer.write_all(body)?;
        }
        Message::Request { index, begin, length } => {
            writer.write_u32::<BigEndian>(13)?;
            writer.write_u8(6)?;
            writer.write_u32::<BigEndian>(*index)?;
            writer.write_u32::<BigEndian>(*begin)?;
            writer.write_u32::<BigEndian>(*length)?;
        }
        Message::Piece { index, begin, block } => {
            writer.write_u32::<BigEndian>(9 + block.len() as u32)?;
            writer.write_u8(7)?;
            writer.write_u32::<BigEndian>(*index)?;
            writer.write_u32::<BigEndian>(*begin)?;
            writer.write_all(block)?;
        }
        Message::Cancel { index, begin, length } => {
            writer.write_u32::<BigEndian>(13)?;
            writer.write_u8(8)?;
            writer.write_u32::<BigEndian>(*index)?;
            writer.write_u32::<BigEndian>(*begin)?;
            writer.write_u32::<BigEndian>(*length)?;
        }
        Message::Port(port) => {
            writer.write_u32::<BigEndian>(3)?;
            writer.write_u8(9)?;
            writer.write_u16::<BigEndian>(*port)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(msg: Message) {
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).unwrap();
        let decoded = read_message(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_all_fixed_messages() {
        round_trip(Message::KeepAlive);
        round_trip(Message::Choke);
        round_trip(Message::Unchoke);
        round_trip(Message::Interested);
        round_trip(Message::NotInterested);
        round_trip(Message::Have(7));
        round_trip(Message::Port(6881));
        round_trip(Message::Request { index: 1, begin: 2, length: 16384 });
        round_trip(Message::Cancel { index: 1, begin: 2, length: 16384 });
        round_trip(Message::Piece { index: 0, begin: 0, block: vec![1, 2, 3, 4] });
    }

    #[test]
    fn round_trips_bitfield() {
        let mut bf = BitField::new(10);
        bf.set_piece(0);
        bf.set_piece(2);
        round_trip(Message::BitField(bf));
    }

    #[test]
    fn rejects_unknown_id() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.push(200);
        let err = read_message(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, WireError::UnknownMessageId(200)));
    }

    #[test]
    fn rejects_oversized_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_MESSAGE_LEN + 1).to_be_bytes());
        let err = read_message(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, WireError::LengthTooLarge(_)));
    }

    #[test]
    fn rejects_negative_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-1i32).to_be_bytes());
        let err = read_message(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, WireError::NegativeLength(-1)));
    }

    #[test]
    fn truncated_body_is_eof() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.push(4); // Have id, but no 4-byte payload follows
        let err = read_message(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, WireError::Eof));
    }
}
