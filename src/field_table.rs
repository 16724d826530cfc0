/// Numeric wire representation of a telemetry field. The kind is the single
///  source of truth for a field's width and for how its bytes are interpreted -
///  all encode / decode dispatch goes through it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Float32,
    Int16,
    UInt16,
    UInt32,
}

impl FieldKind {
    pub const fn size_bytes(&self) -> usize {
        match self {
            FieldKind::Float32 => 4,
            FieldKind::Int16 => 2,
            FieldKind::UInt16 => 2,
            FieldKind::UInt32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    pub const fn size_bytes(&self) -> usize {
        self.kind.size_bytes()
    }
}

pub const FIELD_COUNT: usize = 14;

/// The telemetry field table. A field's position in this table is its bit
///  position in the presence mask, so the table must never be reordered - both
///  sides of a link share it by convention, there is no wire-level negotiation.
///
/// Mask bits 14 and 15 have no table entry and are never interpreted.
pub static FIELD_TABLE: [FieldDef; FIELD_COUNT] = [
    FieldDef { name: "Latitude",        kind: FieldKind::Float32 },
    FieldDef { name: "Longitude",       kind: FieldKind::Float32 },
    FieldDef { name: "Altitude",        kind: FieldKind::Int16 },
    FieldDef { name: "Heading",         kind: FieldKind::UInt16 },
    FieldDef { name: "Speed",           kind: FieldKind::UInt16 },
    FieldDef { name: "Roll",            kind: FieldKind::Int16 },
    FieldDef { name: "Pitch",           kind: FieldKind::Int16 },
    FieldDef { name: "Yaw",             kind: FieldKind::Int16 },
    FieldDef { name: "Fuel Level",      kind: FieldKind::UInt16 },
    FieldDef { name: "Engine RPM",      kind: FieldKind::UInt16 },
    FieldDef { name: "Battery Voltage", kind: FieldKind::UInt16 },
    FieldDef { name: "Sensor Status",   kind: FieldKind::UInt16 },
    FieldDef { name: "Waypoint Index",  kind: FieldKind::UInt16 },
    FieldDef { name: "Mission Time",    kind: FieldKind::UInt32 },
];

/// Iterates the table indices whose bits are set in the presence mask, in
///  ascending bit order - the order fields are packed on the wire.
pub fn present_indices(presence_mask: u16) -> impl Iterator<Item = usize> {
    (0..FIELD_COUNT).filter(move |i| presence_mask & (1 << i) != 0)
}

/// The payload length implied by a presence mask. This is what the header's
///  payload length field is derived from on encode.
pub fn payload_len_for_mask(presence_mask: u16) -> u16 {
    present_indices(presence_mask)
        .map(|i| FIELD_TABLE[i].size_bytes())
        .sum::<usize>() as u16
}
