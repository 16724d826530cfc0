use crate::field_table::{payload_len_for_mask, present_indices, FIELD_TABLE};
use crate::util::hex::format_hex;

/// A single telemetry field as it appears in a message: its table index, its
///  display name, the wire bytes it was decoded from (empty on outbound
///  messages) and its numeric value widened to f64.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryField {
    pub index: usize,
    pub name: &'static str,
    pub raw: Vec<u8>,
    pub value: f64,
}

/// One telemetry message, either built for sending or decoded from a received
///  frame. Header values mirror the wire header one to one; `fields` holds the
///  payload fields in ascending presence-mask bit order.
///
/// `checksum`, `checksum_valid` and `raw_frame` are filled in by decoding and
///  carry no meaning on outbound messages - the definitive frame (including its
///  checksum) is produced by [crate::codec::encode].
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryMessage {
    pub message_id: u16,
    pub source_port: u16,
    pub dest_port: u16,
    pub sequence_number: u16,
    pub payload_len: u16,
    pub presence_mask: u16,
    pub fields: Vec<TelemetryField>,
    pub checksum: u8,
    pub checksum_valid: bool,
    pub raw_frame: Vec<u8>,
}

impl TelemetryMessage {
    /// Builds a message for sending. `values` are assigned to the presence
    ///  mask's set bits in ascending bit order; missing values default to 0.0,
    ///  surplus values are ignored.
    pub fn outbound(
        message_id: u16,
        source_port: u16,
        dest_port: u16,
        sequence_number: u16,
        presence_mask: u16,
        values: &[f64],
    ) -> TelemetryMessage {
        let fields = present_indices(presence_mask)
            .enumerate()
            .map(|(pos, index)| TelemetryField {
                index,
                name: FIELD_TABLE[index].name,
                raw: Vec::new(),
                value: values.get(pos).copied().unwrap_or(0.0),
            })
            .collect();

        TelemetryMessage {
            message_id,
            source_port,
            dest_port,
            sequence_number,
            payload_len: payload_len_for_mask(presence_mask),
            presence_mask,
            fields,
            checksum: 0,
            checksum_valid: true,
            raw_frame: Vec::new(),
        }
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn hex_dump(&self) -> String {
        format_hex(&self.raw_frame)
    }
}
