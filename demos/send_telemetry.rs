use std::time::Duration;

use clap::Parser;
use clap_derive::Parser;
use tracing::Level;

use telelink::config::{LinkConfig, DEFAULT_SEND_PORT, DEFAULT_LISTEN_PORT};
use telelink::controller::LinkController;
use telelink::events::LinkEvent;

/// presence mask for the synthetic telemetry: Latitude, Longitude, Heading,
///  Speed and Mission Time
const DEMO_MASK: u16 = 0x201B;

/// Sends synthetic telemetry frames to a listener, or a single raw hex frame
///  for poking at the receiver's error handling. Pair it with the
///  listen_telemetry demo.
#[derive(Parser)]
struct Args {
    /// destination port (the peer's listen port)
    #[clap(short, long, default_value_t = DEFAULT_LISTEN_PORT)]
    dest_port: u16,

    /// this station's listen port, stamped into frames as the source port
    #[clap(short, long, default_value_t = DEFAULT_SEND_PORT)]
    listen_port: u16,

    /// send these bytes once, as-is, instead of synthetic telemetry
    #[clap(long)]
    raw_hex: Option<String>,

    /// number of telemetry messages to send
    #[clap(short, long, default_value_t = 10)]
    count: u32,

    /// milliseconds between messages
    #[clap(short, long, default_value_t = 500)]
    interval_ms: u64,

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
        send_port: args.dest_port,
    });
    let mut events = controller.subscribe();

    if let Some(raw_hex) = args.raw_hex {
        controller.send_raw_hex(&raw_hex).await;
        print_outcome(&mut events).await;
        return Ok(());
    }

    for i in 0..args.count {
        let values = [
            40.4168 + i as f64 * 0.0005,      // Latitude drifting north
            -3.7038,                          // Longitude
            (i as f64 * 15.0) % 360.0,        // Heading rotating
            120.0 + i as f64,                 // Speed
            i as f64 * args.interval_ms as f64 / 1000.0, // Mission Time
        ];
        controller.send_message(1, DEMO_MASK, &values).await;
        print_outcome(&mut events).await;

        if i + 1 < args.count {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    let status = controller.status().await;
    println!("done: {} sent, {} errors", status.sent_count, status.error_count);
    Ok(())
}

/// the outcome event of a send is queued before the send call returns
async fn print_outcome(events: &mut tokio::sync::broadcast::Receiver<LinkEvent>) {
    match events.recv().await {
        Ok(LinkEvent::MessageSent(sent)) => {
            println!(
                "[{}] sent message {}: {} fields, {} bytes",
                sent.timestamp, sent.message_id, sent.field_count, sent.byte_size,
            );
            println!("    {}", sent.hex_dump);
        }
        Ok(LinkEvent::ProtocolError(err)) => {
            println!("[{}] send failed: {}", err.timestamp, err.error);
        }
        other => println!("unexpected event: {:?}", other),
    }
}
