use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use signing_bridge::{
    BridgeConfig, Host, NotificationQueue, Relay, RemoteAuthority, inject_on_load,
};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    #[clap(long, default_value = "127.0.0.1")]
    host: String,
    #[clap(long, default_value = "3000")]
    port: u16,
    /// JSON payload to sign.
    #[clap(long)]
    payload: String,
    /// Give up on the signature after this many milliseconds.
    #[clap(long, env = "BRIDGE_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
    /// How long the outcome notification stays up.
    #[clap(long, default_value = "1500")]
    notification_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let payload: Value = serde_json::from_str(&args.payload).context("parsing --payload as JSON")?;

    let mut config = BridgeConfig::default();
    if let Some(ms) = args.timeout_ms {
        config = config.with_request_timeout(Duration::from_millis(ms));
    }

    let stream = TcpStream::connect((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("connecting to authority at {}:{}", args.host, args.port))?;

    let host = Host::new(config);
    let _relay = Relay::attach(
        host.channel().clone(),
        Arc::new(RemoteAuthority::new(stream.compat())),
    );
    let notifications =
        NotificationQueue::attach(host.channel(), host.config().default_notification_duration);

    inject_on_load(&host, async {}).await;
    host.readiness().wait_until_ready().await;
    info!(version = %host.config().version, "Bridge ready");

    let outcome = host.sign_structured_data(payload).await;
    let text = match &outcome {
        Ok(signature) => format!("Signed: {signature}"),
        Err(e) => format!("Signing failed: {e}"),
    };

    let mut display = notifications.watch();
    host.channel().post(json!({
        "data": {"notification": true, "duration": args.notification_ms, "text": text}
    }));
    while display.changed().await.is_ok() {
        match display.borrow_and_update().as_ref() {
            Some(shown) => info!(text = %shown.data["text"], "Notification shown"),
            None => break,
        }
    }

    let signature = outcome?;
    println!("{signature}");
    Ok(())
}
