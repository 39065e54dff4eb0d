//! Print notes from the home timeline until Ctrl-C.
//!
//! ```sh
//! MISSKEY_HOST=misskey.example MISSKEY_TOKEN=... cargo run --example home_timeline
//! ```

use bromine::{ChannelName, HookError, LifecycleEvent, StreamClient, StreamConfig};
use serde_json::Value;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("MISSKEY_HOST")?;
    let mut config = StreamConfig::new(host).cool_down_jitter(0.2);
    if let Ok(token) = std::env::var("MISSKEY_TOKEN") {
        config = config.token(token);
    }
    let client = StreamClient::new(config)?;

    client.connect_channel(
        ChannelName::HomeTimeline,
        |body: Value| async move {
            if body["type"] == "note" {
                let note = &body["body"];
                println!(
                    "@{}: {}",
                    note["user"]["username"].as_str().unwrap_or("?"),
                    note["text"].as_str().unwrap_or("")
                );
            }
        },
        None,
        Value::Null,
    )?;

    client.add_comeback(
        || async {
            info!("Connection (re)established");
            Ok::<(), HookError>(())
        },
        false,
        Some("announce".to_string()),
    )?;

    client.set_overflow_handler(|frame: Value| async move {
        info!(%frame, "Unhandled event");
    });

    let mut lifecycle = client.lifecycle();
    tokio::spawn(async move {
        while let Ok(event) = lifecycle.recv().await {
            match event {
                LifecycleEvent::Connected { epoch, latency } => {
                    info!(epoch = epoch.0, latency_ms = latency.as_millis() as u64, "Connected");
                }
                LifecycleEvent::Disconnected { reason, retry_in, .. } => {
                    info!(%reason, ?retry_in, "Disconnected");
                }
            }
        }
    });

    let stopper = client.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.shutdown();
        }
    });

    client.run().await?;
    Ok(())
}
