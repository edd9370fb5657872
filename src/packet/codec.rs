//! Fixed-stride binary codec for telemetry packets.
//!
//! Wire layout (big-endian, no framing, no checksum):
//!
//! ```text
//! u32 timestamp | f32 battery_v | f32 panel_i | f32 temp_c
//! f32 gyro_x | f32 gyro_y | f32 gyro_z | u8 mode
//! ```
//!
//! Packet boundaries are implied by the 29-byte stride alone, so a stream
//! with a dropped byte cannot be realigned.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Mode, Packet};
use crate::error::{FormatError, TelemetryError};

/// Serialized size of one packet.
pub const PACKET_SIZE: usize = 29;

/// Encode a packet into its 29-byte wire form.
pub fn encode(packet: &Packet) -> [u8; PACKET_SIZE] {
    let mut out = [0u8; PACKET_SIZE];
    let mut dst = &mut out[..];
    put_packet(packet, &mut dst);
    out
}

fn put_packet(packet: &Packet, dst: &mut impl BufMut) {
    dst.put_u32(packet.timestamp);
    dst.put_f32(packet.battery_v);
    dst.put_f32(packet.panel_i);
    dst.put_f32(packet.temp_c);
    dst.put_f32(packet.gyro_x);
    dst.put_f32(packet.gyro_y);
    dst.put_f32(packet.gyro_z);
    dst.put_u8(packet.mode.into());
}

/// Decode one packet from the front of `src`. Bytes past the first 29 are
/// ignored.
pub fn decode(src: &[u8]) -> Result<Packet, FormatError> {
    if src.len() < PACKET_SIZE {
        return Err(FormatError::Truncated {
            expected: PACKET_SIZE,
            actual: src.len(),
        });
    }
    let mut buf = &src[..PACKET_SIZE];
    Ok(Packet {
        timestamp: buf.get_u32(),
        battery_v: buf.get_f32(),
        panel_i: buf.get_f32(),
        temp_c: buf.get_f32(),
        gyro_x: buf.get_f32(),
        gyro_y: buf.get_f32(),
        gyro_z: buf.get_f32(),
        mode: Mode::try_from(buf.get_u8())?,
    })
}

/// Decode every whole packet in `bytes`. A trailing partial packet
/// (`len % 29` bytes) is dropped without error.
pub fn decode_stream(bytes: &[u8]) -> Result<Vec<Packet>, FormatError> {
    bytes.chunks_exact(PACKET_SIZE).map(decode).collect()
}

/// Write packets back to back to `path`, replacing any existing file.
pub fn write_packets(path: &Path, packets: &[Packet]) -> Result<(), TelemetryError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(fs::File::create(path)?);
    for packet in packets {
        out.write_all(&encode(packet))?;
    }
    out.flush()?;
    Ok(())
}

/// Read and decode a packet file.
pub fn read_packets(path: &Path) -> Result<Vec<Packet>, TelemetryError> {
    let bytes = fs::read(path)?;
    Ok(decode_stream(&bytes)?)
}

/// Streaming codec for framed readers/writers. Yields `None` until a full
/// 29-byte record is buffered.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = TelemetryError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_SIZE {
            src.reserve(PACKET_SIZE - src.len());
            return Ok(None);
        }
        let frame = src.split_to(PACKET_SIZE);
        Ok(Some(decode(&frame)?))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None => {
                // trailing partial record is discarded
                src.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = TelemetryError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(PACKET_SIZE);
        put_packet(&item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u32) -> Packet {
        Packet {
            timestamp: ts,
            battery_v: 7.41,
            panel_i: 1.18,
            temp_c: 34.7,
            gyro_x: -0.013,
            gyro_y: 0.002,
            gyro_z: 0.021,
            mode: Mode::Nominal,
        }
    }

    #[test]
    fn test_round_trip() {
        let p = sample(1_700_000_000);
        let bytes = encode(&p);
        assert_eq!(bytes.len(), PACKET_SIZE);
        let back = decode(&bytes).unwrap();
        assert_eq!(back.timestamp, p.timestamp);
        assert_eq!(back.mode, p.mode);
        assert!((back.battery_v - p.battery_v).abs() < 1e-5);
        assert!((back.gyro_x - p.gyro_x).abs() < 1e-5);
    }

    #[test]
    fn test_big_endian_layout() {
        let p = Packet {
            timestamp: 0x0102_0304,
            battery_v: 1.0,
            panel_i: 0.0,
            temp_c: 0.0,
            gyro_x: 0.0,
            gyro_y: 0.0,
            gyro_z: 0.0,
            mode: Mode::Maneuver,
        };
        let bytes = encode(&p);
        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        // 1.0f32 = 0x3F800000
        assert_eq!(&bytes[4..8], &[0x3F, 0x80, 0x00, 0x00]);
        assert_eq!(bytes[28], 3);
    }

    #[test]
    fn test_short_read_is_format_error() {
        let bytes = encode(&sample(1));
        let err = decode(&bytes[..20]).unwrap_err();
        assert_eq!(
            err,
            FormatError::Truncated {
                expected: PACKET_SIZE,
                actual: 20
            }
        );
    }

    #[test]
    fn test_stride_drops_trailing_bytes() {
        let mut buf = Vec::new();
        for ts in 0..5 {
            buf.extend_from_slice(&encode(&sample(ts)));
        }
        for extra in 0..PACKET_SIZE {
            let len = 3 * PACKET_SIZE + extra;
            let packets = decode_stream(&buf[..len]).unwrap();
            assert_eq!(packets.len(), len / PACKET_SIZE);
        }
        assert!(decode_stream(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_streaming_codec() {
        let mut codec = PacketCodec;
        let mut buf = BytesMut::new();
        codec.encode(sample(10), &mut buf).unwrap();
        codec.encode(sample(11), &mut buf).unwrap();
        buf.extend_from_slice(&[0xAA; 7]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().timestamp, 10);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().timestamp, 11);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_framed_reader_across_chunk_boundaries() {
        use futures::StreamExt;
        use tokio_util::codec::FramedRead;

        let mut bytes = Vec::new();
        for ts in 0..3 {
            bytes.extend_from_slice(&encode(&sample(ts)));
        }
        bytes.extend_from_slice(&[0x01; 5]);
        let reader = tokio_test::io::Builder::new()
            .read(&bytes[..20])
            .read(&bytes[20..70])
            .read(&bytes[70..])
            .build();

        let packets: Vec<Packet> = FramedRead::new(reader, PacketCodec)
            .map(|r| r.unwrap())
            .collect()
            .await;
        let stamps: Vec<u32> = packets.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, [0, 1, 2]);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/packets.bin");
        let packets: Vec<Packet> = (0..4).map(sample).collect();
        write_packets(&path, &packets).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4 * PACKET_SIZE as u64);
        assert_eq!(read_packets(&path).unwrap(), packets);
    }

    #[test]
    fn test_generated_stream_round_trip() {
        use crate::generator::{FaultScenario, Generator, NominalProfile};

        let mut generator = Generator::new(&NominalProfile::default(), Some(5)).unwrap();
        let packets = generator.generate(200, 1_700_000_000, 1.0, &FaultScenario::ALL);
        let bytes: Vec<u8> = packets.iter().flat_map(encode).collect();
        assert_eq!(bytes.len(), 200 * PACKET_SIZE);
        assert_eq!(decode_stream(&bytes).unwrap(), packets);
    }

    #[test]
    fn test_bad_mode_mid_stream_fails() {
        let mut bytes = Vec::new();
        for ts in 0..5 {
            bytes.extend_from_slice(&encode(&sample(ts)));
        }
        bytes[2 * PACKET_SIZE + PACKET_SIZE - 1] = 9;
        assert_eq!(decode_stream(&bytes).unwrap_err(), FormatError::UnknownMode(9));
    }
}
