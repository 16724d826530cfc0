use tokio::sync::broadcast;
use tracing::trace;

/// The controller's event surface: everything a presentation layer needs to
///  render a traffic log is published here. Events are fire-and-forget -
///  publishing with no subscriber is fine, and a slow subscriber misses events
///  rather than applying backpressure.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkEvent {
    MessageSent(MessageSentData),
    MessageReceived(MessageReceivedData),
    /// sent immediately after [LinkEvent::MessageReceived], decomposing the
    ///  same message into its per-field values
    FieldsDecoded(FieldsDecodedData),
    ProtocolError(ProtocolErrorData),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageSentData {
    pub timestamp: String,
    pub hex_dump: String,
    pub message_id: u16,
    pub field_count: usize,
    pub byte_size: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageReceivedData {
    pub timestamp: String,
    pub hex_dump: String,
    pub message_id: u16,
    /// the UDP port the datagram came from, identifying the sending station
    pub sender_port: u16,
    pub field_count: usize,
    pub byte_size: usize,
    /// false means the frame failed its XOR check but was structurally
    ///  readable - corrupted data, not a protocol error
    pub checksum_valid: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldsDecodedData {
    pub fields: Vec<DecodedFieldData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFieldData {
    pub index: usize,
    pub name: &'static str,
    pub hex: String,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolErrorData {
    pub timestamp: String,
    pub error: String,
    pub hex_dump: String,
}

/// wall-clock timestamp in the format the event log displays
pub fn event_timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

pub struct LinkEventNotifier {
    sender: broadcast::Sender<LinkEvent>,
}
impl LinkEventNotifier {
    pub fn new() -> LinkEventNotifier {
        let (sender, _) = broadcast::channel(128);

        LinkEventNotifier {
            sender
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.sender.subscribe()
    }

    pub fn send_event(&self, event: LinkEvent) {
        trace!("event: {:?}", event);
        let _ = self.sender.send(event);
    }
}
