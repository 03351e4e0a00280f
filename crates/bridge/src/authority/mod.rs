mod encoding;
mod ethereum_secp256k1;
mod remote;
mod secp256k1;
mod signer;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

pub use encoding::{Eip191Encoder, EncodedPayload, JsonEncoder, PayloadEncoder};
pub use ethereum_secp256k1::EthereumSecp256k1Signer;
pub use remote::{RemoteAuthority, serve_authority};
pub use secp256k1::Secp256k1Signer;
pub use signer::PayloadSigner;

/// The backend that holds signing capability.
///
/// The relay treats it as a black box: a request id and an opaque payload go
/// in, a signature string or an error comes out. An error's message is what
/// the page ends up seeing.
#[async_trait]
pub trait Authority: Send + Sync {
    async fn sign(&self, id: &str, payload: &Value) -> Result<String>;
}

/// Authority backed by an in-process key: encodes the payload, signs the
/// digest, and returns the signature as `0x`-prefixed hex.
pub struct SignerAuthority {
    signer: Arc<dyn PayloadSigner>,
    encoder: Arc<dyn PayloadEncoder>,
}

impl SignerAuthority {
    pub fn new(signer: Arc<dyn PayloadSigner>, encoder: Arc<dyn PayloadEncoder>) -> Self {
        Self { signer, encoder }
    }

    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer.public_key_bytes()))
    }
}

#[async_trait]
impl Authority for SignerAuthority {
    async fn sign(&self, id: &str, payload: &Value) -> Result<String> {
        let encoded = self
            .encoder
            .encode(payload)
            .context("encoding payload")?;
        let signature = self
            .signer
            .sign_digest(&encoded.digest)
            .context("signing payload digest")?;
        debug!(
            id,
            algorithm = self.signer.algorithm(),
            encoding = self.encoder.name(),
            "Payload signed"
        );
        Ok(format!("0x{}", hex::encode(signature)))
    }
}
