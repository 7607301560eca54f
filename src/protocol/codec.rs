//! Subunit v2 wire codec
//!
//! Every packet has a fixed header, a body whose optional fields are
//! announced by the flags, and a CRC32 trailer:
//! ```text
//! 0xB3 | flags: u16 | length: u24 | body... | crc32: u32
//! ```
//! All integers are big-endian and `length` counts the whole packet.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::crc32::crc32_ieee;
use super::types::*;
use crate::common::{Error, Result};

/// Read one packet from the stream
///
/// The next byte in `reader` must be the packet signature. Returns the raw
/// packet bytes, exactly as read, together with the decoded event.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(Vec<u8>, StatusEvent)> {
    let mut raw = vec![0u8; HEADER_LEN];
    let got = read_up_to(reader, &mut raw).await?;
    if got != HEADER_LEN {
        return Err(Error::ShortRead {
            got,
            wanted: HEADER_LEN,
        });
    }
    if raw[0] != SIGNATURE {
        return Err(Error::Decode(format!(
            "Expected packet signature 0x{SIGNATURE:x}, found 0x{:x}",
            raw[0]
        )));
    }

    let flags = u16::from_be_bytes([raw[1], raw[2]]);
    let length = u32::from_be_bytes([0, raw[3], raw[4], raw[5]]) as usize;

    let version = flags >> 12;
    if version != VERSION {
        return Err(Error::Decode(format!("Unsupported version {version}")));
    }
    if length < HEADER_LEN + CRC_LEN {
        return Err(Error::Decode(format!(
            "Packet length {length} is shorter than the {} byte minimum",
            HEADER_LEN + CRC_LEN
        )));
    }

    raw.resize(length, 0);
    let wanted = length - HEADER_LEN;
    let got = read_up_to(reader, &mut raw[HEADER_LEN..]).await?;
    if got != wanted {
        return Err(Error::ShortRead { got, wanted });
    }

    let (content, trailer) = raw.split_at(length - CRC_LEN);
    let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let calculated = crc32_ieee(content);
    if calculated != stored {
        return Err(Error::BadChecksum { calculated, stored });
    }

    let event = decode_body(flags, &content[HEADER_LEN..])?;
    Ok((raw, event))
}

/// Write one packet to the stream and flush it
pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, event: &StatusEvent) -> Result<()> {
    let packet = encode_packet(event)?;
    writer.write_all(&packet).await?;
    writer.flush().await?;
    Ok(())
}

/// Encode an event as a complete packet
pub fn encode_packet(event: &StatusEvent) -> Result<Vec<u8>> {
    // Flags and length are patched in once the body is known
    let mut packet = vec![SIGNATURE, 0, 0, 0, 0, 0];
    let mut flags = VERSION << 12;

    if let Some(route_code) = &event.route_code {
        flags |= FLAG_ROUTE_CODE;
        write_utf8(&mut packet, route_code)?;
    }
    if let Some(timestamp) = &event.timestamp {
        flags |= FLAG_TIMESTAMP;
        let seconds = u32::try_from(timestamp.timestamp())
            .map_err(|_| Error::Encode(format!("Timestamp {timestamp} out of range")))?;
        packet.extend_from_slice(&seconds.to_be_bytes());
        packet.extend_from_slice(&timestamp.timestamp_subsec_nanos().to_be_bytes());
    }
    if let Some(test_id) = &event.test_id {
        flags |= FLAG_TEST_ID;
        write_utf8(&mut packet, test_id)?;
    }
    if let Some(tags) = event.tags.as_ref().filter(|t| !t.is_empty()) {
        flags |= FLAG_TAGS;
        write_len16(&mut packet, tags.len())?;
        for tag in tags {
            write_utf8(&mut packet, tag)?;
        }
    }
    if event.runnable {
        flags |= FLAG_RUNNABLE;
    }
    if let Some(mime_type) = event.mime_type.as_ref().filter(|m| !m.is_empty()) {
        flags |= FLAG_MIME_TYPE;
        write_utf8(&mut packet, mime_type)?;
    }
    if let Some(file) = &event.file {
        flags |= FLAG_FILE_CONTENT;
        write_utf8(&mut packet, &file.name)?;
        packet.extend_from_slice(&file.bytes);
    }
    if event.eof {
        flags |= FLAG_EOF;
    }
    if let Some(status) = event.status {
        flags |= status.bits();
    }

    let length = packet.len() + CRC_LEN;
    if length > MAX_PACKET_LEN {
        return Err(Error::Encode(format!(
            "Packet of {length} bytes exceeds the {MAX_PACKET_LEN} byte limit"
        )));
    }
    packet[1..3].copy_from_slice(&flags.to_be_bytes());
    packet[3..6].copy_from_slice(&(length as u32).to_be_bytes()[1..]);

    let crc = crc32_ieee(&packet);
    packet.extend_from_slice(&crc.to_be_bytes());
    Ok(packet)
}

/// Decode the fields announced by `flags` from a packet body
fn decode_body(flags: u16, body: &[u8]) -> Result<StatusEvent> {
    let mut cursor = BodyCursor { buf: body, pos: 0 };

    let route_code = if flags & FLAG_ROUTE_CODE != 0 {
        Some(cursor.read_utf8()?)
    } else {
        None
    };
    let timestamp = if flags & FLAG_TIMESTAMP != 0 {
        Some(cursor.read_timestamp()?)
    } else {
        None
    };
    let test_id = if flags & FLAG_TEST_ID != 0 {
        Some(cursor.read_utf8()?)
    } else {
        None
    };
    let tags = if flags & FLAG_TAGS != 0 {
        let count = cursor.read_u16()?;
        let mut tags = BTreeSet::new();
        for _ in 0..count {
            tags.insert(cursor.read_utf8()?);
        }
        Some(tags)
    } else {
        None
    };
    let mime_type = if flags & FLAG_MIME_TYPE != 0 {
        Some(cursor.read_utf8()?)
    } else {
        None
    };
    let file = if flags & FLAG_FILE_CONTENT != 0 {
        let name = cursor.read_utf8()?;
        Some(FileChunk {
            name,
            bytes: cursor.rest().to_vec(),
        })
    } else {
        None
    };

    Ok(StatusEvent {
        test_id,
        status: TestStatus::from_bits(flags),
        tags,
        runnable: flags & FLAG_RUNNABLE != 0,
        mime_type,
        file,
        eof: flags & FLAG_EOF != 0,
        route_code,
        timestamp,
    })
}

/// Read until `buf` is full or the stream ends, returning the bytes read
async fn read_up_to<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn write_len16(packet: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u16::try_from(len)
        .map_err(|_| Error::Encode(format!("Length {len} does not fit in 16 bits")))?;
    packet.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn write_utf8(packet: &mut Vec<u8>, value: &str) -> Result<()> {
    write_len16(packet, value.len())?;
    packet.extend_from_slice(value.as_bytes());
    Ok(())
}

struct BodyCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyCursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(Error::Decode(format!(
                "Field at offset {} extends past end of packet",
                self.pos
            )));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_timestamp(&mut self) -> Result<DateTime<Utc>> {
        let offset = self.pos;
        let seconds = self.read_u32()?;
        let nanoseconds = self.read_u32()?;
        DateTime::from_timestamp(i64::from(seconds), nanoseconds).ok_or_else(|| {
            Error::Decode(format!("Invalid timestamp at offset {offset}"))
        })
    }

    fn read_utf8(&mut self) -> Result<String> {
        let offset = self.pos;
        let length = usize::from(self.read_u16()?);
        let available = self.buf.len() - self.pos;
        if length > available {
            return Err(Error::bad_string(
                offset,
                &format!(
                    "extends past end of packet: claimed {length} bytes, {available} available"
                ),
            ));
        }
        let bytes = self.take(length)?;
        if bytes.contains(&0) {
            return Err(Error::bad_string(offset, "contains NUL byte"));
        }
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| Error::bad_string(offset, "is not UTF8"))
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FOO_EXISTS: &[u8] = b"\xb3\x29\x01\0\0\x0f\0\x03foo\x99\x0c\x34\x3f";

    #[test]
    fn test_encode_reference_packet() {
        let packet = encode_packet(&StatusEvent::test("foo", TestStatus::Exists)).unwrap();
        assert_eq!(packet, FOO_EXISTS);
    }

    #[tokio::test]
    async fn test_read_reference_packet() {
        let mut reader = Cursor::new(FOO_EXISTS.to_vec());
        let (raw, event) = read_packet(&mut reader).await.unwrap();

        assert_eq!(raw, FOO_EXISTS);
        assert_eq!(event, StatusEvent::test("foo", TestStatus::Exists));
    }

    #[tokio::test]
    async fn test_read_packet_with_every_field() {
        let timestamp = DateTime::from_timestamp(1_356_998_400, 500).unwrap();
        let event = StatusEvent {
            route_code: Some("0".to_string()),
            mime_type: Some("text/plain;charset=utf8".to_string()),
            ..StatusEvent::test("pkg.test_a", TestStatus::Fail)
                .with_timestamp(timestamp)
                .with_tags(["slow", "db"])
                .with_file("traceback", b"boom\n".to_vec())
                .with_eof()
        };
        let mut reader = Cursor::new(encode_packet(&event).unwrap());

        let (_, decoded) = read_packet(&mut reader).await.unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn test_bad_checksum() {
        let mut data = FOO_EXISTS.to_vec();
        let last = data.len() - 1;
        data[last] ^= 0xff;

        let err = read_packet(&mut Cursor::new(data)).await.unwrap_err();
        assert!(matches!(err, Error::BadChecksum { .. }));
    }

    #[tokio::test]
    async fn test_truncated_packet() {
        let data = FOO_EXISTS[..10].to_vec();

        let err = read_packet(&mut Cursor::new(data)).await.unwrap_err();
        assert!(matches!(err, Error::ShortRead { got: 4, wanted: 9 }));
        assert!(err.is_decode());
    }

    #[tokio::test]
    async fn test_string_with_nul_byte() {
        let mut event = StatusEvent::test("fo\0", TestStatus::Exists);
        event.runnable = false;
        let data = encode_packet(&event).unwrap();

        let err = read_packet(&mut Cursor::new(data)).await.unwrap_err();
        assert!(err.to_string().contains("contains NUL byte"));
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let mut data = FOO_EXISTS.to_vec();
        data[1] = 0x19;

        let err = read_packet(&mut Cursor::new(data)).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported version 1"));
    }

    #[test]
    fn test_oversized_string_is_rejected() {
        let event = StatusEvent::test("x".repeat(70_000), TestStatus::Success);
        assert!(matches!(encode_packet(&event), Err(Error::Encode(_))));
    }

    #[tokio::test]
    async fn test_write_packet_flushes_whole_packet() {
        let mut output = Vec::new();
        write_packet(&mut output, &StatusEvent::test("foo", TestStatus::Exists))
            .await
            .unwrap();
        assert_eq!(output, FOO_EXISTS);
    }

    /// Frame `body` as a packet with a valid length and CRC
    fn frame(flags: u16, body: &[u8]) -> Vec<u8> {
        let length = HEADER_LEN + body.len() + CRC_LEN;
        let mut packet = vec![SIGNATURE];
        packet.extend_from_slice(&(VERSION << 12 | flags).to_be_bytes());
        packet.extend_from_slice(&(length as u32).to_be_bytes()[1..]);
        packet.extend_from_slice(body);
        let crc = crc32_ieee(&packet);
        packet.extend_from_slice(&crc.to_be_bytes());
        packet
    }

    async fn decode_err(data: Vec<u8>) -> Error {
        read_packet(&mut Cursor::new(data)).await.unwrap_err()
    }

    #[test]
    fn test_frame_matches_reference_packet() {
        let flags = FLAG_TEST_ID | FLAG_RUNNABLE | TestStatus::Exists.bits();
        assert_eq!(frame(flags, b"\0\x03foo"), FOO_EXISTS);
    }

    #[tokio::test]
    async fn test_length_below_minimum() {
        let data = vec![SIGNATURE, 0x20, 0x00, 0x00, 0x00, 0x09, 0, 0, 0];

        let err = decode_err(data).await;
        assert!(err.is_decode());
        assert!(err
            .to_string()
            .contains("Packet length 9 is shorter than the 10 byte minimum"));
    }

    #[tokio::test]
    async fn test_string_past_end_of_packet() {
        let err = decode_err(frame(FLAG_TEST_ID, b"\0\x05a")).await;

        assert!(err.is_decode());
        assert!(err.to_string().contains(
            "UTF8 string at offset 0 extends past end of packet: claimed 5 bytes, 1 available"
        ));
    }

    #[tokio::test]
    async fn test_string_with_invalid_utf8() {
        let err = decode_err(frame(FLAG_TEST_ID, b"\0\x02\xff\xfe")).await;

        assert!(err.is_decode());
        assert!(err.to_string().contains("UTF8 string at offset 0 is not UTF8"));
    }

    #[tokio::test]
    async fn test_invalid_timestamp() {
        let body = [0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];

        let err = decode_err(frame(FLAG_TIMESTAMP, &body)).await;
        assert!(err.is_decode());
        assert!(err.to_string().contains("Invalid timestamp at offset 0"));
    }

    #[test]
    fn test_oversized_packet_is_rejected() {
        let event = StatusEvent::default().with_file("big", vec![0u8; MAX_PACKET_LEN]);

        let err = encode_packet(&event).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
        assert!(err.to_string().contains("byte limit"));
    }

    #[tokio::test]
    async fn test_eof_without_file_content() {
        let event = StatusEvent::test("t", TestStatus::Success).with_eof();
        let data = encode_packet(&event).unwrap();
        let flags = u16::from_be_bytes([data[1], data[2]]);
        assert_ne!(flags & FLAG_EOF, 0);
        assert_eq!(flags & FLAG_FILE_CONTENT, 0);

        let (_, decoded) = read_packet(&mut Cursor::new(data)).await.unwrap();
        assert!(decoded.eof);
        assert_eq!(decoded, event);
    }
}
