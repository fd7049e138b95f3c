//! Minimal chat client against a socket.io v2 server.
//!
//! Connects, joins the namespace from the URL, prints every `message` event and sends one
//! message per line read from stdin.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,socketio_channel=debug cargo run --example chat -- http://localhost:3000/chat
//! ```

use std::time::Duration;

use serde_json::{Value, json};
use socketio_channel::{
    CONNECTION, Channel, Config, DISCONNECTION, Methods, WebsocketTransport, dial_with,
};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3000".to_owned());

    let methods = Methods::new();
    methods.on(CONNECTION, |channel: &Channel, _: &[Value]| {
        info!(sid = ?channel.id(), "Connected");
        Ok(None)
    });
    methods.on(DISCONNECTION, |_: &Channel, _: &[Value]| {
        info!("Disconnected");
        Ok(None)
    });
    methods.on("message", |_: &Channel, args: &[Value]| {
        info!(?args, "message");
        Ok(None)
    });
    methods.on("whoami", |channel: &Channel, _: &[Value]| {
        Ok(Some(json!({ "sid": channel.id() })))
    });

    let config = Config::builder()
        .heartbeat_interval(Duration::from_secs(10))
        .build();
    let client = dial_with(&url, WebsocketTransport::new(), config, methods).await?;
    client.send_open_sequence()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = client.closed() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.is_empty() {
                    continue;
                }
                match client
                    .emit_with_ack("message", vec![json!(line)], Duration::from_secs(5))
                    .await
                {
                    Ok(reply) => info!(?reply, "Delivered"),
                    Err(e) => warn!(error = %e, "Not acknowledged"),
                }
            }
        }
    }

    client.close().await;
    Ok(())
}
