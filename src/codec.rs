use anyhow::bail;
use bytes::{Buf, BufMut, BytesMut};

use crate::field_table::{present_indices, FieldKind, FIELD_TABLE};
use crate::message::{TelemetryField, TelemetryMessage};

pub const HEADER_SIZE: usize = 12;

/// header plus the trailing checksum byte, i.e. a frame with an empty payload
pub const MIN_FRAME_SIZE: usize = 13;

/// XOR fold over a buffer. This is the protocol's integrity check: cheap and
///  order-insensitive, it detects any single flipped bit but is blind to pairs
///  of flips in the same bit position.
pub fn compute_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Serializes a message into its wire frame in a single linear pass. The
///  header's payload length is derived from the presence mask up front rather
///  than taken from the message, so the header never needs patching after the
///  payload is written.
///
/// Field values are looked up by table index in `msg.fields`; a mask bit with
///  no matching field is silently encoded as 0.
pub fn encode(msg: &TelemetryMessage) -> BytesMut {
    let payload_len = crate::field_table::payload_len_for_mask(msg.presence_mask);

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload_len as usize + 1);
    buf.put_u16(msg.message_id);
    buf.put_u16(msg.source_port);
    buf.put_u16(msg.dest_port);
    buf.put_u16(msg.sequence_number);
    buf.put_u16(payload_len);
    buf.put_u16(msg.presence_mask);

    for index in present_indices(msg.presence_mask) {
        let value = msg.fields.iter()
            .find(|f| f.index == index)
            .map(|f| f.value)
            .unwrap_or(0.0);
        put_field_value(&mut buf, FIELD_TABLE[index].kind, value);
    }

    let checksum = compute_checksum(&buf);
    buf.put_u8(checksum);
    buf
}

/// Integer fields truncate the f64 towards zero and wrap to the target width,
///  so e.g. -1 encodes as 0xFFFF in a u16 field.
fn put_field_value(buf: &mut BytesMut, kind: FieldKind, value: f64) {
    match kind {
        FieldKind::Float32 => buf.put_f32(value as f32),
        FieldKind::Int16 => buf.put_i16(value as i64 as i16),
        FieldKind::UInt16 => buf.put_u16(value as i64 as u16),
        FieldKind::UInt32 => buf.put_u32(value as i64 as u32),
    }
}

/// Deserializes a wire frame. This fails only for structurally unusable
///  frames: fewer than [MIN_FRAME_SIZE] bytes, or fewer bytes than the header's
///  payload length announces.
///
/// A checksum mismatch does NOT fail the decode - the frame is still readable,
///  and the mismatch is reported through `checksum_valid` so the application
///  can decide what to do with the data.
pub fn decode(frame: &[u8]) -> anyhow::Result<TelemetryMessage> {
    if frame.len() < MIN_FRAME_SIZE {
        bail!("frame too short: {} bytes, need at least {}", frame.len(), MIN_FRAME_SIZE);
    }

    let received_checksum = frame[frame.len() - 1];
    let calculated_checksum = compute_checksum(&frame[..frame.len() - 1]);
    let checksum_valid = received_checksum == calculated_checksum;

    let mut buf = &frame[..];
    let message_id = buf.try_get_u16()?;
    let source_port = buf.try_get_u16()?;
    let dest_port = buf.try_get_u16()?;
    let sequence_number = buf.try_get_u16()?;
    let payload_len = buf.try_get_u16()?;
    let presence_mask = buf.try_get_u16()?;

    if frame.len() < HEADER_SIZE + payload_len as usize + 1 {
        bail!(
            "frame truncated: header announces {} payload bytes, frame has {} bytes in total",
            payload_len,
            frame.len()
        );
    }

    let payload = &frame[HEADER_SIZE..HEADER_SIZE + payload_len as usize];
    let fields = decode_payload(payload, presence_mask);

    Ok(TelemetryMessage {
        message_id,
        source_port,
        dest_port,
        sequence_number,
        payload_len,
        presence_mask,
        fields,
        checksum: received_checksum,
        checksum_valid,
        raw_frame: frame.to_vec(),
    })
}

/// Unpacks the payload in ascending presence-mask bit order. A mask that calls
///  for more bytes than the payload holds does not fail: the overrunning field
///  keeps whatever raw bytes remain and reads as 0, fields after it read as 0
///  with no raw bytes. Senders that disagree on the field table produce exactly
///  this situation, and it is the receiver's job to surface the data anyway.
fn decode_payload(payload: &[u8], presence_mask: u16) -> Vec<TelemetryField> {
    let mut fields = Vec::new();
    let mut offset = 0usize;

    for index in present_indices(presence_mask) {
        let def = &FIELD_TABLE[index];
        let width = def.size_bytes();
        let available = payload.len().saturating_sub(offset);

        let (raw, value) = if available >= width {
            let raw = &payload[offset..offset + width];
            (raw.to_vec(), read_field_value(raw, def.kind))
        }
        else {
            (payload[offset..].to_vec(), 0.0)
        };
        offset = (offset + width).min(payload.len());

        fields.push(TelemetryField {
            index,
            name: def.name,
            raw,
            value,
        });
    }
    fields
}

fn read_field_value(raw: &[u8], kind: FieldKind) -> f64 {
    let mut buf = raw;
    match kind {
        FieldKind::Float32 => buf.get_f32() as f64,
        FieldKind::Int16 => buf.get_i16() as f64,
        FieldKind::UInt16 => buf.get_u16() as f64,
        FieldKind::UInt32 => buf.get_u32() as f64,
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn outbound(message_id: u16, sequence_number: u16, presence_mask: u16, values: &[f64]) -> TelemetryMessage {
        TelemetryMessage::outbound(message_id, 5000, 5001, sequence_number, presence_mask, values)
    }

    #[rstest]
    #[case::empty(&[], 0x00)]
    #[case::single(&[0x5A], 0x5A)]
    #[case::cancels_itself(&[0x5A, 0x5A], 0x00)]
    #[case::fold(&[0x01, 0x02, 0x04], 0x07)]
    #[case::header(&[0x00, 0x01, 0x13, 0x88, 0x13, 0x89, 0x00, 0x07, 0x00, 0x02, 0x00, 0x08, 0x00, 0x5A], 0x57)]
    fn test_compute_checksum(#[case] data: &[u8], #[case] expected: u8) {
        assert_eq!(compute_checksum(data), expected);
    }

    #[rstest]
    #[case::position_fix(outbound(1, 0, 0x0003, &[40.4168, -3.7038]), &[
        0x00, 0x01, 0x13, 0x88, 0x13, 0x89, 0x00, 0x00, 0x00, 0x08, 0x00, 0x03,
        0x42, 0x21, 0xAA, 0xCE, 0xC0, 0x6D, 0x0B, 0x0F,
        0xA5,
    ])]
    #[case::heading_only(outbound(1, 7, 0x0008, &[90.0]), &[
        0x00, 0x01, 0x13, 0x88, 0x13, 0x89, 0x00, 0x07, 0x00, 0x02, 0x00, 0x08,
        0x00, 0x5A,
        0x57,
    ])]
    #[case::ascending_bit_order(outbound(2, 1, 0x010A, &[-3.5, 180.0, 75.0]), &[
        0x00, 0x02, 0x13, 0x88, 0x13, 0x89, 0x00, 0x01, 0x00, 0x08, 0x01, 0x0A,
        0xC0, 0x60, 0x00, 0x00, 0x00, 0xB4, 0x00, 0x4B,
        0x5E,
    ])]
    #[case::empty_mask(TelemetryMessage::outbound(9, 4242, 4243, 65535, 0x0000, &[]), &[
        0x00, 0x09, 0x10, 0x92, 0x10, 0x93, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00,
        0x08,
    ])]
    fn test_encode(#[case] msg: TelemetryMessage, #[case] expected: &[u8]) {
        let frame = encode(&msg);
        assert_eq!(frame.as_ref(), expected);
    }

    /// the trailing checksum byte makes the XOR over a complete frame fold to zero
    #[rstest]
    #[case::position_fix(outbound(1, 0, 0x0003, &[40.4168, -3.7038]))]
    #[case::all_fields(outbound(3, 12, 0x3FFF, &[1.0; 14]))]
    #[case::empty_mask(outbound(4, 13, 0x0000, &[]))]
    fn test_encoded_frame_xors_to_zero(#[case] msg: TelemetryMessage) {
        let frame = encode(&msg);
        assert_eq!(compute_checksum(&frame), 0);
    }

    #[rstest]
    #[case::negative_wraps_u16(0x0008, -1.0, &[0xFF, 0xFF])]
    #[case::overflow_wraps_u16(0x0100, 70000.0, &[0x11, 0x70])]
    #[case::negative_i16(0x0004, -500.0, &[0xFE, 0x0C])]
    #[case::u32_field(0x2000, 86400.0, &[0x00, 0x01, 0x51, 0x80])]
    #[case::fraction_truncates(0x0008, 90.9, &[0x00, 0x5A])]
    fn test_encode_integer_conversion(#[case] mask: u16, #[case] value: f64, #[case] expected_payload: &[u8]) {
        let frame = encode(&outbound(1, 0, mask, &[value]));
        assert_eq!(&frame[HEADER_SIZE..frame.len() - 1], expected_payload);
    }

    /// mask bits 14 and 15 have no field table entry and contribute no payload
    #[test]
    fn test_encode_reserved_mask_bits() {
        let frame = encode(&outbound(1, 0, 0xC008, &[90.0]));

        assert_eq!(frame.len(), MIN_FRAME_SIZE + 2);
        assert_eq!(&frame[10..12], &[0xC0, 0x08]);
        assert_eq!(&frame[12..14], &[0x00, 0x5A]);
    }

    #[test]
    fn test_decode_golden_frame() {
        let frame = [
            0x00, 0x01, 0x13, 0x88, 0x13, 0x89, 0x00, 0x00, 0x00, 0x08, 0x00, 0x03,
            0x42, 0x21, 0xAA, 0xCE, 0xC0, 0x6D, 0x0B, 0x0F,
            0xA5,
        ];

        let msg = decode(&frame).unwrap();

        assert_eq!(msg.message_id, 1);
        assert_eq!(msg.source_port, 5000);
        assert_eq!(msg.dest_port, 5001);
        assert_eq!(msg.sequence_number, 0);
        assert_eq!(msg.payload_len, 8);
        assert_eq!(msg.presence_mask, 0x0003);
        assert_eq!(msg.checksum, 0xA5);
        assert!(msg.checksum_valid);
        assert_eq!(msg.raw_frame, frame);

        assert_eq!(msg.field_count(), 2);
        assert_eq!(msg.fields[0].name, "Latitude");
        assert_eq!(msg.fields[0].raw, &[0x42, 0x21, 0xAA, 0xCE]);
        assert!((msg.fields[0].value - 40.4168).abs() < 1e-4);
        assert_eq!(msg.fields[1].name, "Longitude");
        assert!((msg.fields[1].value + 3.7038).abs() < 1e-4);
    }

    #[rstest]
    #[case::lat_lon(outbound(1, 0, 0x0003, &[40.4168, -3.7038]))]
    #[case::mixed_types(outbound(2, 77, 0x010A, &[-3.5, 180.0, 75.0]))]
    #[case::all_fields(outbound(3, 65535, 0x3FFF, &[
        40.4168, -3.7038, -500.0, 359.0, 120.0, -5.0, 2.0, -179.0, 75.0, 2400.0, 128.0, 0xABCD as f64, 12.0, 86400.0,
    ]))]
    #[case::empty_mask(outbound(4, 1, 0x0000, &[]))]
    fn test_round_trip(#[case] msg: TelemetryMessage) {
        let frame = encode(&msg);
        let decoded = decode(&frame).unwrap();

        assert_eq!(decoded.message_id, msg.message_id);
        assert_eq!(decoded.source_port, msg.source_port);
        assert_eq!(decoded.dest_port, msg.dest_port);
        assert_eq!(decoded.sequence_number, msg.sequence_number);
        assert_eq!(decoded.presence_mask, msg.presence_mask);
        assert_eq!(decoded.payload_len as usize, frame.len() - HEADER_SIZE - 1);
        assert!(decoded.checksum_valid);

        assert_eq!(decoded.field_count(), msg.field_count());
        for (actual, expected) in decoded.fields.iter().zip(&msg.fields) {
            assert_eq!(actual.index, expected.index);
            assert_eq!(actual.name, expected.name);
            // integer fields survive exactly, floats only up to f32 precision
            assert!((actual.value - expected.value).abs() < 1e-4);
        }
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::single_byte(vec![0x01])]
    #[case::twelve_bytes_header_only(vec![0x00; 12])]
    fn test_decode_rejects_short_frame(#[case] frame: Vec<u8>) {
        assert!(decode(&frame).is_err());
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let mut frame = encode(&outbound(1, 0, 0x0003, &[40.4168, -3.7038])).to_vec();

        // drop one payload byte: 20 bytes remain, the header still announces 8
        frame.remove(frame.len() - 2);
        assert_eq!(frame.len(), 20);

        assert!(decode(&frame).is_err());
    }

    /// flipping any single bit is caught by the XOR checksum, but the frame
    ///  still decodes - corruption is data, not a protocol failure
    #[rstest]
    #[case::payload_byte(13)]
    #[case::message_id_byte(1)]
    #[case::checksum_byte_itself(20)]
    fn test_decode_tampered_frame(#[case] flipped_byte: usize) {
        let mut frame = encode(&outbound(1, 0, 0x0003, &[40.4168, -3.7038])).to_vec();
        frame[flipped_byte] ^= 0x01;

        let msg = decode(&frame).unwrap();
        assert!(!msg.checksum_valid);
        assert_eq!(msg.field_count(), 2);
    }

    /// a mask that announces more fields than the declared payload carries:
    ///  the overrun field keeps the leftover bytes and reads as 0, fields after
    ///  it are empty - but the frame decodes
    #[test]
    fn test_decode_mask_overruns_payload() {
        let mut frame = BytesMut::new();
        frame.put_u16(1); // message id
        frame.put_u16(5000);
        frame.put_u16(5001);
        frame.put_u16(0); // sequence
        frame.put_u16(6); // payload length: Latitude plus half of Longitude
        frame.put_u16(0x0003);
        frame.put_f32(40.5);
        frame.put_u16(0xABCD);
        let checksum = compute_checksum(&frame);
        frame.put_u8(checksum);

        let msg = decode(&frame).unwrap();

        assert!(msg.checksum_valid);
        assert_eq!(msg.field_count(), 2);
        assert!((msg.fields[0].value - 40.5).abs() < 1e-4);
        assert_eq!(msg.fields[1].value, 0.0);
        assert_eq!(msg.fields[1].raw, &[0xAB, 0xCD]);
    }

    /// bytes after the declared payload are tolerated; appending 0x00 even
    ///  keeps the checksum valid since a complete frame XORs to zero
    #[test]
    fn test_decode_trailing_bytes() {
        let mut frame = encode(&outbound(1, 7, 0x0008, &[90.0])).to_vec();
        frame.push(0x00);

        let msg = decode(&frame).unwrap();

        assert!(msg.checksum_valid);
        assert_eq!(msg.field_count(), 1);
        assert_eq!(msg.fields[0].value, 90.0);
    }

    /// reserved mask bits in a received frame are ignored, not rejected
    #[test]
    fn test_decode_reserved_mask_bits() {
        let mut frame = BytesMut::new();
        frame.put_u16(1);
        frame.put_u16(5000);
        frame.put_u16(5001);
        frame.put_u16(0);
        frame.put_u16(2);
        frame.put_u16(0xC008);
        frame.put_u16(90);
        let checksum = compute_checksum(&frame);
        frame.put_u8(checksum);

        let msg = decode(&frame).unwrap();

        assert_eq!(msg.presence_mask, 0xC008);
        assert_eq!(msg.field_count(), 1);
        assert_eq!(msg.fields[0].index, 3);
        assert_eq!(msg.fields[0].value, 90.0);
    }
}
