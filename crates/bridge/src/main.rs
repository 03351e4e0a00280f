use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use signing_bridge::{
    Authority, Eip191Encoder, EthereumSecp256k1Signer, JsonEncoder, PayloadEncoder,
    PayloadSigner, Secp256k1Signer, SignerAuthority, serve_authority,
};
use tokio::net::TcpListener;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, ValueEnum)]
enum SigningAlgorithm {
    Secp256k1,
    EthereumSecp256k1,
}

#[derive(Debug, Clone, ValueEnum)]
enum PayloadEncoding {
    Json,
    Eip191,
}

#[derive(Parser)]
struct Args {
    #[clap(long, default_value = "127.0.0.1")]
    host: String,
    #[clap(long, default_value = "3000")]
    port: u16,
    #[clap(long, env = "SIGNING_KEY_SEED")]
    signing_key_seed: String,
    #[clap(long, env = "SIGNING_ALGORITHM", default_value = "ethereum-secp256k1")]
    signing_algorithm: SigningAlgorithm,
    #[clap(long, env = "PAYLOAD_ENCODING", default_value = "eip191")]
    payload_encoding: PayloadEncoding,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let signer: Arc<dyn PayloadSigner> = match args.signing_algorithm {
        SigningAlgorithm::Secp256k1 => Arc::new(
            Secp256k1Signer::from_seed(&args.signing_key_seed)
                .context("creating secp256k1 signer")?,
        ),
        SigningAlgorithm::EthereumSecp256k1 => Arc::new(
            EthereumSecp256k1Signer::from_seed(&args.signing_key_seed)
                .context("creating ethereum secp256k1 signer")?,
        ),
    };

    let encoder: Arc<dyn PayloadEncoder> = match args.payload_encoding {
        PayloadEncoding::Json => Arc::new(JsonEncoder),
        PayloadEncoding::Eip191 => Arc::new(Eip191Encoder),
    };

    let authority = SignerAuthority::new(signer, encoder);
    info!(public_key = %authority.public_key_hex(), "Authority key loaded");
    let authority: Arc<dyn Authority> = Arc::new(authority);

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("binding {}:{}", args.host, args.port))?;
    info!(address = %listener.local_addr()?, "Authority listening");

    loop {
        let (stream, peer) = listener.accept().await.context("accepting relay")?;
        info!(%peer, "Relay connected");
        let authority = authority.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_authority(stream.compat(), authority.as_ref()).await {
                error!(%peer, error = %format!("{e:#}"), "Authority session failed");
            }
        });
    }
}
