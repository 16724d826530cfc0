use anyhow::bail;

pub const DEFAULT_LISTEN_PORT: u16 = 5000;
pub const DEFAULT_SEND_PORT: u16 = 5001;

/// Port configuration for one end of a telemetry link. Both ports refer to the
///  loopback interface; a pair of stations is wired up by pointing each one's
///  send port at the other's listen port.
///
/// The config is handed to the controller once at construction - the controller
///  keeps its own (adjustable) copy afterwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinkConfig {
    pub listen_port: u16,
    pub send_port: u16,
}

impl LinkConfig {
    pub fn default_loopback() -> LinkConfig {
        LinkConfig {
            listen_port: DEFAULT_LISTEN_PORT,
            send_port: DEFAULT_SEND_PORT,
        }
    }

    /// Port 0 is rejected for the send port because a datagram cannot be
    ///  addressed to it. The listen port may be 0 (the OS assigns one), and
    ///  listen and send port may be equal - nothing in the protocol forbids a
    ///  station talking to its own listen port.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.send_port == 0 {
            bail!("send port must not be 0");
        }

        Ok(())
    }
}
