use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::codec;
use crate::config::LinkConfig;
use crate::events::{
    DecodedFieldData, FieldsDecodedData, LinkEvent, LinkEventNotifier, MessageReceivedData,
    MessageSentData, ProtocolErrorData, event_timestamp,
};
use crate::field_table::FIELD_TABLE;
use crate::message::TelemetryMessage;
use crate::transport::{DatagramHandler, UdpTransport};
use crate::util::hex::{format_hex, parse_hex};

/// read-only projection of one field table entry, for a presentation layer to
///  build its input form from
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldInfo {
    pub index: usize,
    pub name: &'static str,
    pub size_bytes: usize,
}

/// one-shot snapshot of the controller's observable state
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkStatus {
    pub bound: bool,
    pub listen_port: u16,
    pub send_port: u16,
    pub status_text: String,
    pub sent_count: u64,
    pub received_count: u64,
    pub error_count: u64,
    pub last_sent_hex: String,
    pub last_received_hex: String,
}

struct ControllerInner {
    listen_port: u16,
    send_port: u16,
    transport: UdpTransport,
    next_sequence: u16,
    sent_count: u64,
    received_count: u64,
    error_count: u64,
    last_sent_hex: String,
    last_received_hex: String,
    status_text: String,
}

/// The facade tying codec and transport together: it owns the sequence
///  counter, the traffic counters and the status line, and it publishes
///  everything that happens on the link as [LinkEvent]s.
///
/// Two states, unbound and bound, with `start_listening` / `stop_listening`
///  moving between them. Sending works in either state. All failures are local
///  and recoverable - they show up in the status text, the error counter and
///  the event stream, never as a panic or a poisoned controller.
pub struct LinkController {
    inner: Arc<RwLock<ControllerInner>>,
    notifier: Arc<LinkEventNotifier>,
}

impl LinkController {
    pub fn new(config: LinkConfig) -> LinkController {
        LinkController {
            inner: Arc::new(RwLock::new(ControllerInner {
                listen_port: config.listen_port,
                send_port: config.send_port,
                transport: UdpTransport::new(),
                next_sequence: 0,
                sent_count: 0,
                received_count: 0,
                error_count: 0,
                last_sent_hex: String::new(),
                last_received_hex: String::new(),
                status_text: "Not bound".to_string(),
            })),
            notifier: Arc::new(LinkEventNotifier::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.notifier.subscribe()
    }

    /// Binds the listen port and starts consuming datagrams. Calling this while
    ///  already listening is a no-op that refreshes the status text - it is not
    ///  an error and does not disturb the existing binding.
    pub async fn start_listening(&self) {
        let mut inner = self.inner.write().await;

        if inner.transport.is_bound() {
            inner.status_text = format!("Already listening on port {}", inner.listen_port);
            info!("{}", inner.status_text);
            return;
        }

        let handler = Arc::new(IncomingFrameHandler {
            inner: self.inner.clone(),
            notifier: self.notifier.clone(),
        });

        let listen_port = inner.listen_port;
        match inner.transport.bind(listen_port, handler).await {
            Ok(()) => {
                // port 0 asks the OS for a port - adopt the one it assigned
                if let Some(actual_port) = inner.transport.bound_port() {
                    inner.listen_port = actual_port;
                }
                inner.status_text = format!(
                    "Listening on port {} -> sending to port {}",
                    inner.listen_port, inner.send_port,
                );
            }
            Err(e) => {
                warn!("failed to bind port {}: {}", listen_port, e);
                inner.error_count += 1;
                inner.status_text = format!("Failed to bind port {}: {}", listen_port, e);
            }
        }
    }

    /// Tears down the listen socket synchronously. Safe to call when not bound.
    pub async fn stop_listening(&self) {
        let mut inner = self.inner.write().await;

        if !inner.transport.is_bound() {
            inner.status_text = "Not bound".to_string();
            return;
        }

        inner.transport.unbind();
        inner.status_text = format!("Disconnected (was on port {})", inner.listen_port);
    }

    /// Builds a telemetry message with the next sequence number and fires it at
    ///  the configured send port. `values` go to the presence mask's set bits in
    ///  ascending bit order; missing values become 0.0, surplus values are
    ///  dropped.
    pub async fn send_message(&self, message_id: u16, presence_mask: u16, values: &[f64]) {
        let mut inner = self.inner.write().await;

        let sequence_number = inner.next_sequence;
        inner.next_sequence = inner.next_sequence.wrapping_add(1);

        let msg = TelemetryMessage::outbound(
            message_id,
            inner.listen_port,
            inner.send_port,
            sequence_number,
            presence_mask,
            values,
        );
        let frame = codec::encode(&msg);

        let dest_port = inner.send_port;
        match inner.transport.send(&frame, dest_port).await {
            Ok(()) => {
                inner.sent_count += 1;
                inner.last_sent_hex = format_hex(&frame);
                self.notifier.send_event(LinkEvent::MessageSent(MessageSentData {
                    timestamp: event_timestamp(),
                    hex_dump: format_hex(&frame),
                    message_id,
                    field_count: msg.field_count(),
                    byte_size: frame.len(),
                }));
            }
            Err(e) => {
                warn!("send to port {} failed: {}", dest_port, e);
                inner.error_count += 1;
                self.notifier.send_event(LinkEvent::ProtocolError(ProtocolErrorData {
                    timestamp: event_timestamp(),
                    error: format!("send failed: {}", e),
                    hex_dump: format_hex(&frame),
                }));
            }
        }
    }

    /// Sends operator-supplied bytes as-is, bypassing message construction -
    ///  the way to put deliberately malformed frames on the wire. The input is
    ///  parsed permissively ([parse_hex]); input without a single hex digit is
    ///  reported as a protocol error and nothing is sent.
    pub async fn send_raw_hex(&self, hex: &str) {
        let frame = parse_hex(hex);
        let mut inner = self.inner.write().await;

        if frame.is_empty() {
            inner.error_count += 1;
            self.notifier.send_event(LinkEvent::ProtocolError(ProtocolErrorData {
                timestamp: event_timestamp(),
                error: "invalid hex string".to_string(),
                hex_dump: hex.trim().to_string(),
            }));
            return;
        }

        let dest_port = inner.send_port;
        match inner.transport.send(&frame, dest_port).await {
            Ok(()) => {
                inner.sent_count += 1;
                inner.last_sent_hex = format_hex(&frame);
                self.notifier.send_event(LinkEvent::MessageSent(MessageSentData {
                    timestamp: event_timestamp(),
                    hex_dump: format_hex(&frame),
                    message_id: 0,
                    field_count: 0,
                    byte_size: frame.len(),
                }));
            }
            Err(e) => {
                warn!("raw send to port {} failed: {}", dest_port, e);
                inner.error_count += 1;
                self.notifier.send_event(LinkEvent::ProtocolError(ProtocolErrorData {
                    timestamp: event_timestamp(),
                    error: format!("send failed: {}", e),
                    hex_dump: format_hex(&frame),
                }));
            }
        }
    }

    pub fn field_definitions(&self) -> Vec<FieldInfo> {
        FIELD_TABLE.iter()
            .enumerate()
            .map(|(index, def)| FieldInfo {
                index,
                name: def.name,
                size_bytes: def.size_bytes(),
            })
            .collect()
    }

    pub async fn is_bound(&self) -> bool {
        self.inner.read().await.transport.is_bound()
    }

    pub async fn listen_port(&self) -> u16 {
        self.inner.read().await.listen_port
    }

    pub async fn send_port(&self) -> u16 {
        self.inner.read().await.send_port
    }

    /// takes effect on the next `start_listening` - an existing binding is not
    ///  moved to the new port
    pub async fn set_listen_port(&self, port: u16) {
        self.inner.write().await.listen_port = port;
    }

    /// takes effect on the next send
    pub async fn set_send_port(&self, port: u16) {
        self.inner.write().await.send_port = port;
    }

    pub async fn status(&self) -> LinkStatus {
        let inner = self.inner.read().await;
        LinkStatus {
            bound: inner.transport.is_bound(),
            listen_port: inner.listen_port,
            send_port: inner.send_port,
            status_text: inner.status_text.clone(),
            sent_count: inner.sent_count,
            received_count: inner.received_count,
            error_count: inner.error_count,
            last_sent_hex: inner.last_sent_hex.clone(),
            last_received_hex: inner.last_received_hex.clone(),
        }
    }
}

/// the transport-facing side of the controller: decodes arriving datagrams and
///  publishes them, one at a time in arrival order
struct IncomingFrameHandler {
    inner: Arc<RwLock<ControllerInner>>,
    notifier: Arc<LinkEventNotifier>,
}

#[async_trait]
impl DatagramHandler for IncomingFrameHandler {
    async fn on_datagram(&self, data: &[u8], sender_port: u16) {
        let mut inner = self.inner.write().await;
        inner.received_count += 1;
        inner.last_received_hex = format_hex(data);

        match codec::decode(data) {
            Ok(msg) => {
                self.notifier.send_event(LinkEvent::MessageReceived(MessageReceivedData {
                    timestamp: event_timestamp(),
                    hex_dump: msg.hex_dump(),
                    message_id: msg.message_id,
                    sender_port,
                    field_count: msg.field_count(),
                    byte_size: data.len(),
                    checksum_valid: msg.checksum_valid,
                }));
                self.notifier.send_event(LinkEvent::FieldsDecoded(FieldsDecodedData {
                    fields: msg.fields.iter()
                        .map(|f| DecodedFieldData {
                            index: f.index,
                            name: f.name,
                            hex: format_hex(&f.raw),
                            value: f.value,
                        })
                        .collect(),
                }));
            }
            Err(e) => {
                inner.error_count += 1;
                self.notifier.send_event(LinkEvent::ProtocolError(ProtocolErrorData {
                    timestamp: event_timestamp(),
                    error: format!("failed to decode frame ({} bytes): {}", data.len(), e),
                    hex_dump: format_hex(data),
                }));
            }
        }
    }
}
