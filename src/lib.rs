//! A small telemetry protocol stack for loopback UDP links: a binary message
//! codec with a bitmask-selected variable-length payload and an XOR integrity
//! byte, a fire-and-forget datagram transport, and a controller facade that
//! ties them together behind an event stream.
//!
//! Wire format (big-endian throughout):
//!
//! ```text
//! offset  size  field
//! 0       2     message id
//! 2       2     source port
//! 4       2     dest port
//! 6       2     sequence number
//! 8       2     payload length    byte count of the payload section only
//! 10      2     presence mask     bits 0..13 select fields, 14/15 reserved
//! 12      N     payload           present fields, ascending bit order
//! 12+N    1     checksum          XOR of all preceding bytes
//! ```
//!
//! The minimum frame is 13 bytes (empty mask, no payload). Which field a mask
//! bit selects, and how wide it is on the wire, is fixed by
//! [field_table::FIELD_TABLE].
//!
//! Known weaknesses, by design rather than oversight:
//! * Sender and receiver share the field table by convention only - there is
//!   no version negotiation, and a schema mismatch between peers is
//!   undetectable on the wire.
//! * The XOR checksum catches any single-bit flip but is blind to byte swaps
//!   and even-parity multi-bit corruption.
//! * Delivery is fire-and-forget: no retransmission, no ordering beyond the
//!   sequence counter, no encryption. The transport binds to loopback only
//!   and is not hardened for routed networks.

pub mod codec;
pub mod config;
pub mod controller;
pub mod events;
pub mod field_table;
pub mod message;
pub mod transport;
pub mod util;
