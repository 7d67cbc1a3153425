//! Tag-length-value framing used to bundle many variable-length packets
//! (and optional padding) into a single HTTP body.
//!
//! Wire format: a stream of records, each beginning with a one-byte tag
//! (`0x00` data, `0x01` padding) followed by a two-byte big-endian length
//! and that many bytes of payload. End of stream is signalled by end of
//! input; any other leading byte, or a record whose declared length runs
//! past the end of the buffer, is [`CodecError::Malformed`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

const TAG_DATA: u8 = 0x00;
const TAG_PADDING: u8 = 0x01;

/// Maximum payload a single record may carry (the length field is 16 bits).
pub const MAX_RECORD_LEN: usize = u16::MAX as usize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed frame")]
    Malformed,
    #[error("record payload of {0} bytes exceeds the {MAX_RECORD_LEN} byte record limit")]
    TooLarge(usize),
}

/// Appends a data record to `out`.
pub fn encode_data(out: &mut BytesMut, payload: &[u8]) -> Result<(), CodecError> {
    encode_record(out, TAG_DATA, payload)
}

/// Appends a padding record to `out`. The payload bytes are arbitrary;
/// readers discard them.
pub fn encode_padding(out: &mut BytesMut, len: usize) -> Result<(), CodecError> {
    if len > MAX_RECORD_LEN {
        return Err(CodecError::TooLarge(len));
    }
    out.reserve(3 + len);
    out.put_u8(TAG_PADDING);
    out.put_u16(len as u16);
    out.put_bytes(0, len);
    Ok(())
}

fn encode_record(out: &mut BytesMut, tag: u8, payload: &[u8]) -> Result<(), CodecError> {
    if payload.len() > MAX_RECORD_LEN {
        return Err(CodecError::TooLarge(payload.len()));
    }
    out.reserve(3 + payload.len());
    out.put_u8(tag);
    out.put_u16(payload.len() as u16);
    out.put_slice(payload);
    Ok(())
}

/// Decodes the data records out of a complete, in-memory encapsulated
/// buffer, silently skipping padding records.
///
/// Returns the data packets read before a `Malformed` error, along with
/// the error if one was hit; a clean end of input yields `Ok`.
pub fn decode_all(mut buf: Bytes) -> (Vec<Bytes>, Option<CodecError>) {
    let mut packets = Vec::new();
    loop {
        match decode_record(&mut buf) {
            Ok(Some(Record::Data(p))) => packets.push(p),
            Ok(Some(Record::Padding)) => continue,
            Ok(None) => return (packets, None),
            Err(e) => return (packets, Some(e)),
        }
    }
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Data(Bytes),
    Padding,
}

/// Decodes a single record from the front of `buf`, advancing it past the
/// record. Returns `Ok(None)` at a clean end of input (no bytes remain).
pub fn decode_record(buf: &mut Bytes) -> Result<Option<Record>, CodecError> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf.remaining() < 1 {
        return Err(CodecError::Malformed);
    }
    let tag = buf[0];
    if buf.remaining() < 3 {
        return Err(CodecError::Malformed);
    }
    let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
    if buf.remaining() < 3 + len {
        return Err(CodecError::Malformed);
    }
    buf.advance(3);
    let payload = buf.split_to(len);
    match tag {
        TAG_DATA => Ok(Some(Record::Data(payload))),
        TAG_PADDING => Ok(Some(Record::Padding)),
        _ => Err(CodecError::Malformed),
    }
}

/// A lazy iterator over the data records of an encapsulated buffer;
/// padding records are skipped transparently. Yields `Err(Malformed)` at
/// most once, as its final item, and produces nothing after that.
pub struct FrameReader {
    buf: Bytes,
    done: bool,
}

impl FrameReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf, done: false }
    }
}

impl Iterator for FrameReader {
    type Item = Result<Bytes, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match decode_record(&mut self.buf) {
                Ok(Some(Record::Data(p))) => return Some(Ok(p)),
                Ok(Some(Record::Padding)) => continue,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
