use anyhow::anyhow;
use clap::Parser;
use clap_derive::Parser;
use tracing::Level;

use telelink::config::{LinkConfig, DEFAULT_SEND_PORT, DEFAULT_LISTEN_PORT};
use telelink::controller::LinkController;
use telelink::events::LinkEvent;

/// Binds a telemetry listener and prints every frame that arrives, decoded
///  field by field. Pair it with the send_telemetry demo.
#[derive(Parser)]
struct Args {
    /// port to listen on
    #[clap(short, long, default_value_t = DEFAULT_LISTEN_PORT)]
    listen_port: u16,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::TRACE } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let controller = LinkController::new(LinkConfig {
        listen_port: args.listen_port,
        send_port: DEFAULT_SEND_PORT,
    });

    let mut events = controller.subscribe();
    controller.start_listening().await;

    let status = controller.status().await;
    if !status.bound {
        return Err(anyhow!(status.status_text));
    }
    println!("{}", status.status_text);

    loop {
        match events.recv().await? {
            LinkEvent::MessageReceived(msg) => {
                println!(
                    "[{}] message {} from port {}: {} fields, {} bytes, checksum {}",
                    msg.timestamp,
                    msg.message_id,
                    msg.sender_port,
                    msg.field_count,
                    msg.byte_size,
                    if msg.checksum_valid { "ok" } else { "MISMATCH" },
                );
                println!("    {}", msg.hex_dump);
            }
            LinkEvent::FieldsDecoded(decoded) => {
                for field in decoded.fields {
                    println!("    [{:2}] {:<15} = {:<12} ({})", field.index, field.name, field.value, field.hex);
                }
            }
            LinkEvent::ProtocolError(err) => {
                println!("[{}] protocol error: {}", err.timestamp, err.error);
                println!("    {}", err.hex_dump);
            }
            LinkEvent::MessageSent(_) => {}
        }
    }
}
